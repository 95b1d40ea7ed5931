//! Deferred command module.
//!
//! Graph-restructuring requests (adding or removing modifiers, announcing
//! an owner's destruction) are not applied where they are produced. Producers
//! append them to privately owned [`CommandBatch`]es and submit the batches
//! to a shared [`CommandQueue`]; the processor applies them later, at a single
//! synchronization point, with exclusive access to the graph.

use crate::error::AttributeError;
use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::{Modifier, ModifierHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// A deferred graph mutation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AttributeCommand<K> {
    /// Insert `modifier` into `target`'s stack.
    AddModifier {
        target: AttributeRef<K>,
        modifier: Modifier<K>,
    },
    /// Remove the modifier `handle` from `target`'s stack.
    RemoveModifier {
        target: AttributeRef<K>,
        handle: ModifierHandle,
    },
    /// Purge every modifier that reads any attribute of `owner`.
    NotifyDestruction { owner: OwnerId },
}

/// Creation order of a batch; batches are applied in ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchSequence(u64);

impl BatchSequence {
    /// The raw sequence number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch#{}", self.0)
    }
}

/// Lifecycle of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    /// Accepting commands; not applied yet.
    Pending,
    /// Applied exactly once. Terminal.
    Processed,
}

/// An ordered group of commands owned by one producer.
///
/// # Examples
///
/// ```rust
/// use zzattr::{AttributeChanger, AttributeKind, AttributeRef, CommandQueue, Modifier};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// enum Stat { Strength }
///
/// impl AttributeKind for Stat {
///     const ALL: &'static [Self] = &[Stat::Strength];
///     fn index(self) -> usize { self as usize }
/// }
///
/// let mut changer = AttributeChanger::<Stat>::new();
/// let owner = changer.create_owner();
/// let queue = CommandQueue::new();
///
/// let mut batch = queue.create_batch();
/// batch
///     .add_modifier(AttributeRef::new(owner, Stat::Strength), Modifier::AddFlat(3.0))
///     .unwrap();
/// queue.submit(batch);
///
/// changer.process_all(&queue).unwrap();
/// assert_eq!(changer.get_value(AttributeRef::new(owner, Stat::Strength)).unwrap(), 3.0);
/// ```
#[derive(Debug, Clone)]
pub struct CommandBatch<K> {
    sequence: BatchSequence,
    commands: Vec<AttributeCommand<K>>,
    state: BatchState,
}

impl<K: AttributeKind> CommandBatch<K> {
    fn new(sequence: BatchSequence) -> Self {
        Self {
            sequence,
            commands: Vec::new(),
            state: BatchState::Pending,
        }
    }

    /// Creation order of this batch.
    pub fn sequence(&self) -> BatchSequence {
        self.sequence
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Commands in append order.
    pub fn commands(&self) -> &[AttributeCommand<K>] {
        &self.commands
    }

    /// Number of commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the batch holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Append a command. Fails with `StaleBatch` once the batch was processed.
    pub fn append(&mut self, command: AttributeCommand<K>) -> Result<(), AttributeError<K>> {
        if self.state == BatchState::Processed {
            return Err(AttributeError::StaleBatch(self.sequence));
        }
        self.commands.push(command);
        Ok(())
    }

    /// Append an `AddModifier` command.
    pub fn add_modifier(
        &mut self,
        target: AttributeRef<K>,
        modifier: Modifier<K>,
    ) -> Result<(), AttributeError<K>> {
        self.append(AttributeCommand::AddModifier { target, modifier })
    }

    /// Append a `RemoveModifier` command.
    pub fn remove_modifier(
        &mut self,
        target: AttributeRef<K>,
        handle: ModifierHandle,
    ) -> Result<(), AttributeError<K>> {
        self.append(AttributeCommand::RemoveModifier { target, handle })
    }

    /// Append a `NotifyDestruction` command.
    pub fn notify_destruction(&mut self, owner: OwnerId) -> Result<(), AttributeError<K>> {
        self.append(AttributeCommand::NotifyDestruction { owner })
    }

    pub(crate) fn mark_processed(&mut self) {
        self.state = BatchState::Processed;
    }
}

/// Thread-safe sink for submitted batches.
///
/// Producers on any thread call [`create_batch`](Self::create_batch), fill
/// the batch without synchronization, and [`submit`](Self::submit) it. Only
/// submission takes the lock.
#[derive(Debug)]
pub struct CommandQueue<K> {
    next_sequence: AtomicU64,
    submitted: Mutex<Vec<CommandBatch<K>>>,
}

impl<K> Default for CommandQueue<K> {
    fn default() -> Self {
        Self {
            next_sequence: AtomicU64::new(0),
            submitted: Mutex::new(Vec::new()),
        }
    }
}

impl<K: AttributeKind> CommandQueue<K> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new pending batch, stamped with the next sequence number.
    pub fn create_batch(&self) -> CommandBatch<K> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        CommandBatch::new(BatchSequence(sequence))
    }

    /// Hand a batch over for processing. Processed batches are dropped.
    pub fn submit(&self, batch: CommandBatch<K>) {
        if batch.state == BatchState::Processed {
            tracing::warn!(batch = %batch.sequence, "dropping already processed batch");
            return;
        }
        self.lock().push(batch);
    }

    /// Number of batches waiting to be processed.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Take every submitted batch, ordered by sequence number.
    pub(crate) fn drain(&self) -> Vec<CommandBatch<K>> {
        let mut batches = std::mem::take(&mut *self.lock());
        batches.sort_by_key(|b| b.sequence);
        batches
    }

    /// Put unprocessed batches back, ahead of anything submitted since.
    pub(crate) fn requeue(&self, batches: Vec<CommandBatch<K>>) {
        if batches.is_empty() {
            return;
        }
        self.lock().extend(batches);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<CommandBatch<K>>> {
        self.submitted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Error types for the attribute engine.
//!
//! All errors that can occur while reading, mutating or restructuring the
//! attribute graph are represented by the `AttributeError` enum.

use crate::command::BatchSequence;
use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::ModifierHandle;
use thiserror::Error;

/// Errors that can occur in the attribute engine.
///
/// `UnknownReference`, `UnknownModifier` and `CycleRejected` are recoverable
/// and leave the graph unchanged. `PropagationDepthExceeded` signals a broken
/// internal invariant and aborts batch processing.
///
/// # Examples
///
/// ```rust
/// use zzattr::{AttributeChanger, AttributeError, AttributeKind, AttributeRef};
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
/// changer.destroy_owner(owner).unwrap();
///
/// let err = changer.get_value(AttributeRef::new(owner, Stat::Strength)).unwrap_err();
/// assert!(matches!(err, AttributeError::UnknownReference(_)));
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttributeError<K: AttributeKind> {
    /// The referenced owner does not exist (never created, or destroyed).
    #[error("Unknown attribute reference: {0}")]
    UnknownReference(AttributeRef<K>),

    /// The owner does not exist (never created, or already destroyed).
    #[error("Unknown owner: {0}")]
    UnknownOwner(OwnerId),

    /// No modifier with this handle exists in the target's stack.
    #[error("Unknown modifier {handle} on {target}")]
    UnknownModifier {
        target: AttributeRef<K>,
        handle: ModifierHandle,
    },

    /// Making `dependent` read `dependency` would close a dependency cycle.
    #[error("Cycle rejected: {dependent} cannot depend on {dependency}")]
    CycleRejected {
        dependency: AttributeRef<K>,
        dependent: AttributeRef<K>,
    },

    /// A command was appended to a batch that was already processed.
    #[error("Batch {0} was already processed")]
    StaleBatch(BatchSequence),

    /// A change cascade went deeper than the configured limit.
    ///
    /// Unreachable while cycle rejection holds; treated as fatal.
    #[error("Propagation depth {depth} exceeded while updating {at}")]
    PropagationDepthExceeded { at: AttributeRef<K>, depth: usize },

    /// A snapshot cannot be restored.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// The engine configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl<K: AttributeKind> AttributeError<K> {
    /// Whether the error indicates a broken internal invariant.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AttributeError::PropagationDepthExceeded { .. })
    }
}

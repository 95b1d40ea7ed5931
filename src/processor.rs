//! Command processor module.
//!
//! Drains submitted batches at the synchronization point and applies their
//! commands through the [`AttributeChanger`]. Batches are applied in
//! creation order, commands within a batch in append order, and every batch
//! exactly once.

use crate::changer::AttributeChanger;
use crate::command::{BatchSequence, BatchState, CommandBatch, CommandQueue};
use crate::error::AttributeError;
use crate::kind::{AttributeKind, AttributeRef, OwnerId};
use crate::modifier::ModifierHandle;
use thiserror::Error;

/// Result of one successfully applied command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandOutcome<K> {
    /// A modifier was inserted; `handle` addresses it for later removal.
    ModifierAdded {
        target: AttributeRef<K>,
        handle: ModifierHandle,
    },
    /// A modifier was removed.
    ModifierRemoved {
        target: AttributeRef<K>,
        handle: ModifierHandle,
    },
    /// Modifiers reading `owner` were purged.
    DestructionNotified { owner: OwnerId, removed: usize },
}

/// A command that failed and was skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure<K: AttributeKind> {
    /// The batch holding the command.
    pub batch: BatchSequence,
    /// Position of the command within its batch.
    pub index: usize,
    /// Why it failed.
    pub error: AttributeError<K>,
}

/// Summary of a processing pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport<K: AttributeKind> {
    /// Number of batches processed.
    pub batches: usize,
    /// Outcomes of applied commands, in application order.
    pub outcomes: Vec<CommandOutcome<K>>,
    /// Commands that failed and were skipped.
    pub failures: Vec<CommandFailure<K>>,
}

impl<K: AttributeKind> Default for ProcessReport<K> {
    fn default() -> Self {
        Self {
            batches: 0,
            outcomes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<K: AttributeKind> ProcessReport<K> {
    /// Number of commands applied successfully.
    pub fn applied(&self) -> usize {
        self.outcomes.len()
    }

    /// Handles of every modifier added during the pass, with their targets.
    pub fn added_handles(&self) -> impl Iterator<Item = (AttributeRef<K>, ModifierHandle)> + '_ {
        self.outcomes.iter().filter_map(|o| match o {
            CommandOutcome::ModifierAdded { target, handle } => Some((*target, *handle)),
            _ => None,
        })
    }

    fn merge(&mut self, other: ProcessReport<K>) {
        self.batches += other.batches;
        self.outcomes.extend(other.outcomes);
        self.failures.extend(other.failures);
    }
}

/// A fatal error that stopped batch processing, with everything that was
/// applied before it.
///
/// Commands applied before the failure stay in effect, so `report` still
/// carries their outcomes (including the handles of added modifiers).
#[derive(Debug, Clone, PartialEq, Error)]
#[error("command processing aborted: {error}")]
pub struct ProcessAborted<K: AttributeKind> {
    /// The fatal error.
    #[source]
    pub error: AttributeError<K>,
    /// Outcomes and failures of the commands applied before the abort.
    pub report: ProcessReport<K>,
}

impl<K: AttributeKind> From<ProcessAborted<K>> for AttributeError<K> {
    fn from(aborted: ProcessAborted<K>) -> Self {
        aborted.error
    }
}

impl<K: AttributeKind> AttributeChanger<K> {
    /// Apply every batch submitted to `queue`, in creation order.
    ///
    /// Must run after all producers of the current cycle have submitted and
    /// before anything reads the post-mutation graph. A failing command is
    /// skipped and reported; later commands still apply. A fatal error stops
    /// processing: the current batch counts as processed, the remaining
    /// batches go back to the queue, and the error is returned together
    /// with the report of everything applied so far.
    ///
    /// Calling it again with nothing newly submitted changes nothing.
    ///
    /// # Arguments
    ///
    /// * `queue` - The queue producers submitted their batches to
    ///
    /// # Returns
    ///
    /// * `Ok(report)` with every outcome and isolated failure, in order
    /// * `Err(ProcessAborted)` on a fatal error
    pub fn process_all(
        &mut self,
        queue: &CommandQueue<K>,
    ) -> Result<ProcessReport<K>, ProcessAborted<K>> {
        let mut batches = queue.drain().into_iter();
        let mut report = ProcessReport::default();

        while let Some(mut batch) = batches.next() {
            match self.process_batch(&mut batch) {
                Ok(batch_report) => report.merge(batch_report),
                Err(aborted) => {
                    report.merge(aborted.report);
                    queue.requeue(batches.collect());
                    return Err(ProcessAborted {
                        error: aborted.error,
                        report,
                    });
                }
            }
        }

        if report.batches > 0 {
            tracing::debug!(
                batches = report.batches,
                applied = report.applied(),
                failed = report.failures.len(),
                "command batches processed"
            );
        }
        Ok(report)
    }

    /// Apply one batch in place and mark it processed.
    ///
    /// An already processed batch is left untouched and yields an empty
    /// report.
    pub fn process_batch(
        &mut self,
        batch: &mut CommandBatch<K>,
    ) -> Result<ProcessReport<K>, ProcessAborted<K>> {
        let mut report = ProcessReport::default();
        if batch.state() == BatchState::Processed {
            return Ok(report);
        }

        let sequence = batch.sequence();
        let commands = batch.commands().to_vec();
        batch.mark_processed();
        report.batches = 1;

        for (index, command) in commands.into_iter().enumerate() {
            match self.apply_command(command) {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(error) if error.is_fatal() => {
                    tracing::error!(
                        batch = %sequence,
                        index,
                        applied = report.applied(),
                        %error,
                        "aborting batch processing"
                    );
                    return Err(ProcessAborted { error, report });
                }
                Err(error) => {
                    tracing::warn!(batch = %sequence, index, %error, "command skipped");
                    report.failures.push(CommandFailure {
                        batch: sequence,
                        index,
                        error,
                    });
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::test_kinds::Stat;
    use crate::modifier::Modifier;
    use crate::EngineConfig;

    fn setup() -> (AttributeChanger<Stat>, CommandQueue<Stat>, AttributeRef<Stat>, AttributeRef<Stat>) {
        let mut changer = AttributeChanger::new();
        let a = AttributeRef::new(changer.create_owner_with(|_| 10.0), Stat::Strength);
        let b = AttributeRef::new(changer.create_owner_with(|_| 10.0), Stat::Strength);
        (changer, CommandQueue::new(), a, b)
    }

    #[test]
    fn test_commands_apply_in_order() {
        let (mut changer, queue, a, _) = setup();
        let mut batch = queue.create_batch();
        batch.add_modifier(a, Modifier::AddFlat(5.0)).unwrap();
        batch.add_modifier(a, Modifier::Multiply(2.0)).unwrap();
        queue.submit(batch);

        let report = changer.process_all(&queue).unwrap();
        assert_eq!(report.batches, 1);
        assert_eq!(report.applied(), 2);
        assert_eq!(changer.get_value(a).unwrap(), 30.0);
    }

    #[test]
    fn test_failing_command_is_isolated() {
        let (mut changer, queue, a, b) = setup();
        let mut batch = queue.create_batch();
        batch.add_modifier(a, Modifier::from_attribute(b)).unwrap();
        batch.add_modifier(b, Modifier::from_attribute(a)).unwrap(); // cycle
        batch.add_modifier(b, Modifier::AddFlat(1.0)).unwrap();
        queue.submit(batch);

        let report = changer.process_all(&queue).unwrap();
        assert_eq!(report.applied(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(
            report.failures[0].error,
            AttributeError::CycleRejected { .. }
        ));
        assert_eq!(changer.get_value(b).unwrap(), 11.0);
        assert_eq!(changer.get_value(a).unwrap(), 21.0);
    }

    #[test]
    fn test_batches_apply_in_creation_order() {
        let (mut changer, queue, a, _) = setup();
        let mut first = queue.create_batch();
        let mut second = queue.create_batch();
        first.add_modifier(a, Modifier::AddFlat(5.0)).unwrap();
        second.add_modifier(a, Modifier::Multiply(2.0)).unwrap();

        queue.submit(second);
        queue.submit(first);
        changer.process_all(&queue).unwrap();

        // (10 + 5) * 2, not 10 * 2 + 5
        assert_eq!(changer.get_value(a).unwrap(), 30.0);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let (mut changer, queue, a, _) = setup();
        let mut batch = queue.create_batch();
        batch.add_modifier(a, Modifier::AddFlat(5.0)).unwrap();
        queue.submit(batch);

        changer.process_all(&queue).unwrap();
        let report = changer.process_all(&queue).unwrap();
        assert_eq!(report, ProcessReport::default());
        assert_eq!(changer.get_value(a).unwrap(), 15.0);
    }

    #[test]
    fn test_processed_batch_not_reapplied() {
        let (mut changer, queue, a, _) = setup();
        let mut batch = queue.create_batch();
        batch.add_modifier(a, Modifier::AddFlat(5.0)).unwrap();

        changer.process_batch(&mut batch).unwrap();
        changer.process_batch(&mut batch).unwrap();
        assert_eq!(changer.get_value(a).unwrap(), 15.0);
        assert_eq!(batch.state(), BatchState::Processed);
        assert!(matches!(
            batch.add_modifier(a, Modifier::AddFlat(1.0)),
            Err(AttributeError::StaleBatch(_))
        ));
    }

    #[test]
    fn test_report_exposes_added_handles() {
        let (mut changer, queue, a, _) = setup();
        let mut batch = queue.create_batch();
        batch.add_modifier(a, Modifier::AddFlat(5.0)).unwrap();
        queue.submit(batch);

        let report = changer.process_all(&queue).unwrap();
        let (target, handle) = report.added_handles().next().unwrap();
        assert_eq!(target, a);

        changer.remove_modifier(target, handle).unwrap();
        assert_eq!(changer.get_value(a).unwrap(), 10.0);
    }

    #[test]
    fn test_fatal_error_requeues_remaining_batches() {
        let config = EngineConfig {
            max_propagation_depth: 1,
            ..EngineConfig::default()
        };
        let mut changer = AttributeChanger::<Stat>::with_config(config).unwrap();
        let refs: Vec<_> = (0..3)
            .map(|_| AttributeRef::new(changer.create_owner(), Stat::Strength))
            .collect();
        changer.add_modifier(refs[1], Modifier::from_attribute(refs[0])).unwrap();

        let queue = CommandQueue::new();
        let mut first = queue.create_batch();
        // Closing the chain refs[0] <- refs[1] <- refs[2], then bumping refs[0]
        // by a flat modifier, cascades two levels deep.
        first.add_modifier(refs[2], Modifier::from_attribute(refs[1])).unwrap();
        first.add_modifier(refs[0], Modifier::AddFlat(1.0)).unwrap();
        let mut second = queue.create_batch();
        second.add_modifier(refs[2], Modifier::AddFlat(1.0)).unwrap();
        queue.submit(first);
        queue.submit(second);

        let aborted = changer.process_all(&queue).unwrap_err();
        assert!(aborted.error.is_fatal());
        assert_eq!(queue.pending(), 1);

        // The link added before the abort stays, and its handle is reported.
        assert_eq!(aborted.report.batches, 1);
        let (target, handle) = aborted.report.added_handles().next().unwrap();
        assert_eq!(target, refs[2]);
        changer.remove_modifier(target, handle).unwrap();
        assert!(changer.registry().observers_of(refs[1]).is_empty());
    }

    #[test]
    fn test_aborted_processing_converts_to_error() {
        fn run(
            changer: &mut AttributeChanger<Stat>,
            queue: &CommandQueue<Stat>,
        ) -> Result<usize, AttributeError<Stat>> {
            Ok(changer.process_all(queue)?.applied())
        }

        let (mut changer, queue, a, _) = setup();
        let mut batch = queue.create_batch();
        batch.add_modifier(a, Modifier::AddFlat(1.0)).unwrap();
        queue.submit(batch);
        assert_eq!(run(&mut changer, &queue), Ok(1));
    }
}

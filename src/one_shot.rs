//! Run-boundary barrier across several producers.
//!
//! When records from several independent producers are merged into one
//! stream, a run is only over once *every* producer has ended it. Begin and
//! end records of different producers may interleave arbitrarily; those of a
//! single producer may not.
//!
//! ```text
//!            first BEGIN (arms, caches run number)
//! Waiting ───────────────────────────────────────> InRun
//!    ^                                               │
//!    │ reset()                  N-th END             │
//!    └──────────── Complete <────────────────────────┘
//! ```
//!
//! While waiting for the first begin, everything else is out-of-run and
//! [`OneShotFilter`] drops it. That is how a pipeline tolerates producers
//! that were already running when it attached.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::{AppResult, TransitionError};
use crate::filter::{Filter, FilterOutput, FilterResult};
use crate::record::{Record, RecordBody, RecordKind};

/// Counts run transitions of each tracked kind across `N` sources.
#[derive(Debug, Clone)]
pub struct OneShotHandler {
    expected_sources: usize,
    begin_kind: RecordKind,
    end_kind: RecordKind,
    counts: HashMap<RecordKind, usize>,
    run_number: Option<u32>,
    complete: bool,
}

impl OneShotHandler {
    /// Track `begin_kind`, `end_kind` and `other_kinds` across
    /// `expected_sources` producers (at least one).
    pub fn new(
        expected_sources: usize,
        begin_kind: RecordKind,
        end_kind: RecordKind,
        other_kinds: impl IntoIterator<Item = RecordKind>,
    ) -> Self {
        let mut counts: HashMap<RecordKind, usize> = other_kinds.into_iter().map(|k| (k, 0)).collect();
        counts.insert(begin_kind, 0);
        counts.insert(end_kind, 0);
        Self {
            expected_sources: expected_sources.max(1),
            begin_kind,
            end_kind,
            counts,
            run_number: None,
            complete: false,
        }
    }

    /// Track begin/end/pause/resume across `expected_sources` producers.
    pub fn for_run_transitions(expected_sources: usize) -> Self {
        Self::new(
            expected_sources,
            RecordKind::BeginRun,
            RecordKind::EndRun,
            [RecordKind::PauseRun, RecordKind::ResumeRun],
        )
    }

    /// Account for one transition record.
    ///
    /// Kinds that are not tracked are ignored. Non-begin kinds are ignored
    /// while no begin has been seen.
    pub fn update(&mut self, kind: RecordKind, run_number: u32) -> Result<(), TransitionError> {
        if self.complete {
            return Err(TransitionError::ExtraTransition { kind, run_number });
        }
        if !self.counts.contains_key(&kind) {
            return Ok(());
        }

        if kind == self.begin_kind && self.waiting_for_begin() {
            self.run_number = Some(run_number);
            self.counts.values_mut().for_each(|n| *n = 0);
            self.bump(kind);
            debug!(run_number, "run armed by first begin");
        } else if !self.waiting_for_begin() {
            if let Some(expected) = self.run_number {
                if expected != run_number {
                    return Err(TransitionError::RunNumberMismatch {
                        kind,
                        expected,
                        found: run_number,
                    });
                }
            }
            if kind == self.begin_kind && self.count(kind) >= self.expected_sources {
                return Err(TransitionError::TooManyBegins {
                    expected: self.expected_sources,
                    run_number,
                });
            }
            self.bump(kind);
        }

        self.complete = self.count(self.end_kind) == self.expected_sources;
        if self.complete {
            info!(
                run_number,
                sources = self.expected_sources,
                "all sources ended the run"
            );
        }
        Ok(())
    }

    /// True until the first begin of a run has been seen.
    pub fn waiting_for_begin(&self) -> bool {
        self.count(self.begin_kind) == 0
    }

    /// True once every source has ended the run.
    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Observed count for `kind`; untracked kinds count as 0.
    pub fn count(&self, kind: RecordKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Run number cached from the arming begin, if any.
    pub fn run_number(&self) -> Option<u32> {
        self.run_number
    }

    /// Number of sources that must end the run.
    pub fn expected_sources(&self) -> usize {
        self.expected_sources
    }

    /// Forget the current run and wait for a new begin.
    pub fn reset(&mut self) {
        self.counts.values_mut().for_each(|n| *n = 0);
        self.run_number = None;
        self.complete = false;
    }

    fn bump(&mut self, kind: RecordKind) {
        if let Some(n) = self.counts.get_mut(&kind) {
            *n += 1;
        }
    }
}

/// Filter that passes exactly one run through and reports completion.
///
/// Records seen before the first begin are dropped. State changes feed the
/// handler; a bookkeeping violation stops the pipeline with
/// [`crate::PipelineError::UnexpectedTransition`].
#[derive(Debug, Clone)]
pub struct OneShotFilter {
    handler: OneShotHandler,
}

impl OneShotFilter {
    /// One-shot over begin/end/pause/resume for `expected_sources` producers.
    pub fn new(expected_sources: usize) -> Self {
        Self::with_handler(OneShotHandler::for_run_transitions(expected_sources))
    }

    /// Use a custom handler.
    pub fn with_handler(handler: OneShotHandler) -> Self {
        Self { handler }
    }

    /// The underlying handler.
    pub fn handler(&self) -> &OneShotHandler {
        &self.handler
    }
}

impl Filter for OneShotFilter {
    fn name(&self) -> &str {
        "one-shot"
    }

    fn initialize(&mut self) -> AppResult<()> {
        self.handler.reset();
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.handler.complete()
    }

    fn handle(&mut self, record: Record) -> FilterResult {
        if let RecordBody::StateChange(sc) = record.body() {
            self.handler.update(sc.kind, sc.run_number)?;
            if self.handler.complete() {
                debug!(
                    run_number = sc.run_number,
                    elapsed_s = sc.elapsed_seconds(),
                    "last end of run passed"
                );
            }
        }
        if self.handler.waiting_for_begin() {
            return Ok(FilterOutput::Drop);
        }
        Ok(FilterOutput::Emit(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FormatVersion;

    #[test]
    fn test_two_sources_complete_after_both_ends() {
        let mut handler = OneShotHandler::for_run_transitions(2);
        handler.update(RecordKind::BeginRun, 7).unwrap();
        handler.update(RecordKind::BeginRun, 7).unwrap();
        handler.update(RecordKind::EndRun, 7).unwrap();
        assert!(!handler.complete());
        handler.update(RecordKind::EndRun, 7).unwrap();
        assert!(handler.complete());

        assert_eq!(
            handler.update(RecordKind::BeginRun, 7),
            Err(TransitionError::ExtraTransition {
                kind: RecordKind::BeginRun,
                run_number: 7
            })
        );
    }

    #[test]
    fn test_run_number_mismatch_while_run_lingers() {
        let mut handler = OneShotHandler::for_run_transitions(2);
        handler.update(RecordKind::BeginRun, 7).unwrap();
        assert_eq!(
            handler.update(RecordKind::EndRun, 8),
            Err(TransitionError::RunNumberMismatch {
                kind: RecordKind::EndRun,
                expected: 7,
                found: 8
            })
        );
    }

    #[test]
    fn test_too_many_begins() {
        let mut handler = OneShotHandler::for_run_transitions(1);
        handler.update(RecordKind::BeginRun, 1).unwrap();
        assert!(matches!(
            handler.update(RecordKind::BeginRun, 1),
            Err(TransitionError::TooManyBegins { expected: 1, .. })
        ));
    }

    #[test]
    fn test_non_begin_ignored_while_waiting() {
        let mut handler = OneShotHandler::for_run_transitions(1);
        handler.update(RecordKind::EndRun, 3).unwrap();
        handler.update(RecordKind::PauseRun, 3).unwrap();
        assert!(handler.waiting_for_begin());
        assert_eq!(handler.count(RecordKind::EndRun), 0);
        assert_eq!(handler.run_number(), None);
    }

    #[test]
    fn test_untracked_kind_counts_zero() {
        let mut handler = OneShotHandler::new(1, RecordKind::BeginRun, RecordKind::EndRun, []);
        handler.update(RecordKind::BeginRun, 2).unwrap();
        handler.update(RecordKind::PauseRun, 2).unwrap();
        assert_eq!(handler.count(RecordKind::PauseRun), 0);
        assert_eq!(handler.count(RecordKind::PhysicsEvent), 0);
    }

    #[test]
    fn test_reset_rearms() {
        let mut handler = OneShotHandler::for_run_transitions(1);
        handler.update(RecordKind::BeginRun, 1).unwrap();
        handler.update(RecordKind::EndRun, 1).unwrap();
        assert!(handler.complete());
        handler.reset();
        assert!(handler.waiting_for_begin());
        handler.update(RecordKind::BeginRun, 2).unwrap();
        assert_eq!(handler.run_number(), Some(2));
    }

    #[test]
    fn test_filter_drops_out_of_run_records() {
        let v = FormatVersion::V11;
        let mut filter = OneShotFilter::new(1);
        filter.initialize().unwrap();

        let early = Record::physics_event(v, None, vec![1u8]);
        assert_eq!(filter.handle(early).unwrap(), FilterOutput::Drop);

        let begin = Record::state_change(v, RecordKind::BeginRun, 9).unwrap();
        assert!(matches!(filter.handle(begin).unwrap(), FilterOutput::Emit(_)));

        let event = Record::physics_event(v, None, vec![2u8]);
        assert!(matches!(filter.handle(event).unwrap(), FilterOutput::Emit(_)));
        assert!(!filter.is_complete());

        let end = Record::state_change(v, RecordKind::EndRun, 9).unwrap();
        assert!(matches!(filter.handle(end).unwrap(), FilterOutput::Emit(_)));
        assert!(filter.is_complete());
    }
}

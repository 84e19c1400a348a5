use super::{Predicate, Verdict};
use crate::record::RecordKind;

/// Skip the first `to_skip` records, then process `to_process` of them,
/// then abort.
///
/// Counting happens at `post_input_update`, so only records that were
/// actually read are counted. `to_process == 0` means "no limit".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCountPredicate {
    to_skip: u64,
    to_process: u64,
    skipped: u64,
    processed: u64,
}

impl ProcessCountPredicate {
    /// Create a predicate with the given window.
    pub fn new(to_skip: u64, to_process: u64) -> Self {
        Self {
            to_skip,
            to_process,
            skipped: 0,
            processed: 0,
        }
    }

    /// Records skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Records let through so far (not counted when unbounded).
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Configured skip count.
    pub fn to_skip(&self) -> u64 {
        self.to_skip
    }

    /// Configured process count.
    pub fn to_process(&self) -> u64 {
        self.to_process
    }
}

impl Predicate for ProcessCountPredicate {
    fn post_input_update(&mut self, _kind: RecordKind) -> Verdict {
        if self.to_skip != 0 && self.skipped < self.to_skip {
            self.skipped += 1;
            return Verdict::Skip;
        }
        if self.to_process == 0 {
            return Verdict::Continue;
        }
        if self.processed < self.to_process {
            self.processed += 1;
            Verdict::Continue
        } else {
            Verdict::Abort
        }
    }

    fn reset(&mut self) {
        self.skipped = 0;
        self.processed = 0;
    }
}

use std::collections::BTreeMap;

use tracing::info;

use super::{Filter, FilterOutput, FilterResult};
use crate::error::AppResult;
use crate::record::{Record, RecordKind};

/// Accumulates a (source id, kind) count matrix over one run.
///
/// Records without a body header are counted under source `None`. The
/// matrix is cleared by `initialize` and logged by `finalize`.
#[derive(Debug, Default, Clone)]
pub struct KindCountFilter {
    counts: BTreeMap<(Option<u32>, RecordKind), u64>,
}

impl KindCountFilter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count for one cell of the matrix.
    pub fn count(&self, source_id: Option<u32>, kind: RecordKind) -> u64 {
        self.counts.get(&(source_id, kind)).copied().unwrap_or(0)
    }

    /// Total records of `kind` over all sources.
    pub fn total(&self, kind: RecordKind) -> u64 {
        self.counts
            .iter()
            .filter(|((_, k), _)| *k == kind)
            .map(|(_, n)| n)
            .sum()
    }

    /// The whole matrix, ordered by source then kind.
    pub fn counts(&self) -> &BTreeMap<(Option<u32>, RecordKind), u64> {
        &self.counts
    }
}

impl Filter for KindCountFilter {
    fn name(&self) -> &str {
        "kind-count"
    }

    fn initialize(&mut self) -> AppResult<()> {
        self.counts.clear();
        Ok(())
    }

    fn finalize(&mut self) -> AppResult<()> {
        for ((source, kind), n) in &self.counts {
            match source {
                Some(id) => info!(source_id = id, kind = %kind, count = n, "record count"),
                None => info!(kind = %kind, count = n, "record count (no body header)"),
            }
        }
        Ok(())
    }

    fn handle(&mut self, record: Record) -> FilterResult {
        let source = record.body_header().map(|h| h.source_id);
        *self.counts.entry((source, record.kind())).or_insert(0) += 1;
        Ok(FilterOutput::Emit(record))
    }
}

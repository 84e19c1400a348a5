use tracing::error;

use super::{Filter, FilterOutput, FilterResult};
use crate::record::Record;

/// Turns an abnormal end-of-run record into a flush-then-stop request.
///
/// The record must reach every downstream consumer before the pipeline
/// exits, so the mediator writes it directly instead of running the output
/// predicates, then reports [`crate::PipelineError::AbnormalEnd`].
#[derive(Debug, Default, Clone, Copy)]
pub struct AbnormalEndFilter;

impl Filter for AbnormalEndFilter {
    fn name(&self) -> &str {
        "abnormal-end"
    }

    fn handle_abnormal_end(&mut self, record: Record) -> FilterResult {
        error!("abnormal end of run received; flushing and stopping");
        Ok(FilterOutput::FlushAndAbort(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FormatVersion, RecordKind};

    #[test]
    fn test_only_abnormal_end_is_flagged() {
        let mut filter = AbnormalEndFilter;
        let end = Record::abnormal_end(FormatVersion::V11).unwrap();
        assert_eq!(
            filter.handle(end.clone()).unwrap(),
            FilterOutput::FlushAndAbort(end)
        );

        let begin = Record::state_change(FormatVersion::V11, RecordKind::BeginRun, 1).unwrap();
        assert_eq!(
            filter.handle(begin.clone()).unwrap(),
            FilterOutput::Emit(begin)
        );
    }
}

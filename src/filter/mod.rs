//! Per-record transformations.
//!
//! A [`Filter`] receives one record at a time and decides what flows on:
//! a replacement record, the same record, nothing, or (for the abnormal-end
//! case) a record that must be flushed before the pipeline stops.
//!
//! Dispatch is strictly by [`RecordKind`]. Every per-kind handler defaults
//! to passing the record through, so a concrete filter overrides only the
//! kinds it cares about. Kinds this crate does not interpret reach
//! [`Filter::handle_unknown`] instead of failing.
//!
//! # Example
//!
//! ```
//! use ringfilter::filter::{Filter, FilterOutput, FilterResult};
//! use ringfilter::record::Record;
//!
//! /// Drops every scaler record.
//! struct NoScalers;
//!
//! impl Filter for NoScalers {
//!     fn handle_scaler(&mut self, _record: Record) -> FilterResult {
//!         Ok(FilterOutput::Drop)
//!     }
//! }
//! ```

mod abnormal_end;
mod composite;
mod counter;

pub use abnormal_end::AbnormalEndFilter;
pub use composite::CompositeFilter;
pub use counter::KindCountFilter;

use crate::error::{AppResult, PipelineError};
use crate::record::{Record, RecordKind};

/// What a filter decided for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutput {
    /// Forward this record (the input or a replacement).
    Emit(Record),
    /// Discard the record; the pipeline continues with the next one.
    Drop,
    /// Write this record immediately, then stop the pipeline with
    /// [`PipelineError::AbnormalEnd`]. Output predicates are bypassed.
    FlushAndAbort(Record),
}

impl FilterOutput {
    /// The record that would flow on, if any.
    pub fn record(&self) -> Option<&Record> {
        match self {
            FilterOutput::Emit(record) | FilterOutput::FlushAndAbort(record) => Some(record),
            FilterOutput::Drop => None,
        }
    }

    /// Convert to the plain "replacement or drop" form.
    pub fn into_record(self) -> Option<Record> {
        match self {
            FilterOutput::Emit(record) | FilterOutput::FlushAndAbort(record) => Some(record),
            FilterOutput::Drop => None,
        }
    }
}

impl From<Option<Record>> for FilterOutput {
    fn from(value: Option<Record>) -> Self {
        match value {
            Some(record) => FilterOutput::Emit(record),
            None => FilterOutput::Drop,
        }
    }
}

/// Result of a filter handler.
pub type FilterResult = Result<FilterOutput, PipelineError>;

/// A record transformation stage.
///
/// Filters may keep accumulator state across calls. `initialize` and
/// `finalize` bracket exactly one pipeline run.
pub trait Filter: Send {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once before the first record of a run.
    fn initialize(&mut self) -> AppResult<()> {
        Ok(())
    }

    /// Called once after the last record of a run, whatever ended it.
    fn finalize(&mut self) -> AppResult<()> {
        Ok(())
    }

    /// Whether this filter has seen everything it needs and the pipeline
    /// can stop after writing the current record.
    fn is_complete(&self) -> bool {
        false
    }

    /// Route `record` to the handler for its kind.
    fn handle(&mut self, record: Record) -> FilterResult {
        dispatch(self, record)
    }

    /// Begin, end, pause and resume records.
    fn handle_state_change(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Scaler records.
    fn handle_scaler(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Packet-type and monitored-variable text records.
    fn handle_text(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Physics events.
    fn handle_physics_event(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Physics event counts.
    fn handle_physics_event_count(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Event-builder fragments (including unknown-payload fragments).
    fn handle_fragment(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Composite records.
    fn handle_composite(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Glom parameter records.
    fn handle_glom_parameters(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Data-format records.
    fn handle_data_format(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Abnormal end-of-run records.
    fn handle_abnormal_end(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }

    /// Records of a kind this crate does not interpret.
    fn handle_unknown(&mut self, record: Record) -> FilterResult {
        Ok(FilterOutput::Emit(record))
    }
}

/// Per-kind dispatch used by the default [`Filter::handle`].
pub fn dispatch<F: Filter + ?Sized>(filter: &mut F, record: Record) -> FilterResult {
    match record.kind() {
        RecordKind::BeginRun | RecordKind::EndRun | RecordKind::PauseRun | RecordKind::ResumeRun => {
            filter.handle_state_change(record)
        }
        RecordKind::Scaler => filter.handle_scaler(record),
        RecordKind::PacketTypes | RecordKind::MonitoredVariables => filter.handle_text(record),
        RecordKind::PhysicsEvent => filter.handle_physics_event(record),
        RecordKind::PhysicsEventCount => filter.handle_physics_event_count(record),
        RecordKind::Fragment | RecordKind::UnknownPayloadFragment => filter.handle_fragment(record),
        RecordKind::Composite(_) => filter.handle_composite(record),
        RecordKind::GlomParameters => filter.handle_glom_parameters(record),
        RecordKind::DataFormat => filter.handle_data_format(record),
        RecordKind::AbnormalEnd => filter.handle_abnormal_end(record),
        RecordKind::Unknown(_) => filter.handle_unknown(record),
    }
}

/// Filter that forwards every record unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransparentFilter;

impl Filter for TransparentFilter {
    fn name(&self) -> &str {
        "transparent"
    }
}

impl<F: Filter + ?Sized> Filter for Box<F> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn initialize(&mut self) -> AppResult<()> {
        (**self).initialize()
    }

    fn finalize(&mut self) -> AppResult<()> {
        (**self).finalize()
    }

    fn is_complete(&self) -> bool {
        (**self).is_complete()
    }

    fn handle(&mut self, record: Record) -> FilterResult {
        (**self).handle(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FormatVersion, RecordBody};
    use bytes::Bytes;

    /// Counts physics events and drops scalers; everything else uses defaults.
    #[derive(Default)]
    struct Picky {
        physics: usize,
        unknown: usize,
    }

    impl Filter for Picky {
        fn handle_physics_event(&mut self, record: Record) -> FilterResult {
            self.physics += 1;
            Ok(FilterOutput::Emit(record))
        }

        fn handle_scaler(&mut self, _record: Record) -> FilterResult {
            Ok(FilterOutput::Drop)
        }

        fn handle_unknown(&mut self, record: Record) -> FilterResult {
            self.unknown += 1;
            Ok(FilterOutput::Emit(record))
        }
    }

    #[test]
    fn test_default_filter_is_identity() {
        let mut filter = TransparentFilter;
        let record = Record::state_change(FormatVersion::V11, RecordKind::PauseRun, 3).unwrap();
        assert_eq!(
            filter.handle(record.clone()).unwrap(),
            FilterOutput::Emit(record)
        );
    }

    #[test]
    fn test_dispatch_routes_by_kind() {
        let v = FormatVersion::V11;
        let mut filter = Picky::default();

        let event = Record::physics_event(v, None, vec![1u8]);
        assert!(matches!(filter.handle(event).unwrap(), FilterOutput::Emit(_)));

        let unknown = Record::new(
            v,
            None,
            RecordBody::Unknown {
                type_id: 40_000,
                body: Bytes::from_static(b"abc"),
            },
        )
        .unwrap();
        assert!(matches!(filter.handle(unknown).unwrap(), FilterOutput::Emit(_)));

        assert_eq!(filter.physics, 1);
        assert_eq!(filter.unknown, 1);
    }

    #[test]
    fn test_output_conversions() {
        let record = Record::physics_event(FormatVersion::V11, None, vec![1u8]);
        assert_eq!(FilterOutput::from(None), FilterOutput::Drop);
        assert_eq!(
            FilterOutput::from(Some(record.clone())).into_record(),
            Some(record)
        );
    }
}

//! Ordered chain of filters.

use tracing::trace;

use super::{Filter, FilterOutput, FilterResult};
use crate::error::AppResult;
use crate::record::Record;

/// Runs its member filters in registration order.
///
/// Each filter sees the previous filter's output. The chain stops at the
/// first filter that drops the record (or asks for a flush-and-abort);
/// later filters never see it. An empty chain is the identity transform.
#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl CompositeFilter {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `filter` to the end of the chain.
    pub fn register_filter(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    /// Append an already boxed filter.
    pub fn register_boxed(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Whether the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Names of the registered filters, in order.
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }
}

impl std::fmt::Debug for CompositeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeFilter")
            .field("filters", &self.names())
            .finish()
    }
}

impl Filter for CompositeFilter {
    fn name(&self) -> &str {
        "composite"
    }

    fn initialize(&mut self) -> AppResult<()> {
        for filter in &mut self.filters {
            filter.initialize()?;
        }
        Ok(())
    }

    /// Finalizes members in registration order, not reversed.
    fn finalize(&mut self) -> AppResult<()> {
        for filter in &mut self.filters {
            filter.finalize()?;
        }
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.filters.iter().any(|f| f.is_complete())
    }

    fn handle(&mut self, record: Record) -> FilterResult {
        let mut current = record;
        for filter in &mut self.filters {
            match filter.handle(current)? {
                FilterOutput::Emit(next) => current = next,
                FilterOutput::Drop => {
                    trace!(filter = filter.name(), "record dropped");
                    return Ok(FilterOutput::Drop);
                }
                FilterOutput::FlushAndAbort(record) => {
                    return Ok(FilterOutput::FlushAndAbort(record));
                }
            }
        }
        Ok(FilterOutput::Emit(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FormatVersion, RecordKind};
    use std::sync::{Arc, Mutex};

    /// Records the order in which hooks fire.
    struct Probe {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        drop_all: bool,
    }

    impl Probe {
        fn new(label: &'static str, log: &Arc<Mutex<Vec<String>>>, drop_all: bool) -> Self {
            Self {
                label,
                log: Arc::clone(log),
                drop_all,
            }
        }

        fn note(&self, what: &str) {
            self.log.lock().unwrap().push(format!("{}:{}", self.label, what));
        }
    }

    impl Filter for Probe {
        fn initialize(&mut self) -> AppResult<()> {
            self.note("init");
            Ok(())
        }

        fn finalize(&mut self) -> AppResult<()> {
            self.note("fini");
            Ok(())
        }

        fn handle(&mut self, record: Record) -> FilterResult {
            self.note("handle");
            if self.drop_all {
                Ok(FilterOutput::Drop)
            } else {
                Ok(FilterOutput::Emit(record))
            }
        }
    }

    /// Replaces every record with a physics event carrying one marker byte.
    struct Stamp(u8);

    impl Filter for Stamp {
        fn handle(&mut self, record: Record) -> FilterResult {
            let mut payload = match record.body() {
                crate::record::RecordBody::PhysicsEvent(p) => p.to_vec(),
                _ => Vec::new(),
            };
            payload.push(self.0);
            Ok(FilterOutput::Emit(Record::physics_event(
                record.version(),
                None,
                payload,
            )))
        }
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let mut chain = CompositeFilter::new();
        let record = Record::state_change(FormatVersion::V11, RecordKind::BeginRun, 1).unwrap();
        assert_eq!(
            chain.handle(record.clone()).unwrap(),
            FilterOutput::Emit(record)
        );
    }

    #[test]
    fn test_drop_short_circuits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = CompositeFilter::new();
        chain.register_filter(Probe::new("a", &log, true));
        chain.register_filter(Probe::new("b", &log, false));

        let record = Record::physics_event(FormatVersion::V11, None, vec![0u8]);
        assert_eq!(chain.handle(record).unwrap(), FilterOutput::Drop);
        assert_eq!(*log.lock().unwrap(), vec!["a:handle".to_string()]);
    }

    #[test]
    fn test_filters_see_previous_output() {
        let mut chain = CompositeFilter::new();
        chain.register_filter(Stamp(1));
        chain.register_filter(Stamp(2));

        let record = Record::physics_event(FormatVersion::V11, None, Vec::<u8>::new());
        let out = chain.handle(record).unwrap().into_record().unwrap();
        assert_eq!(
            out,
            Record::physics_event(FormatVersion::V11, None, vec![1u8, 2])
        );
    }

    #[test]
    fn test_lifecycle_broadcast_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = CompositeFilter::new();
        chain.register_filter(Probe::new("a", &log, false));
        chain.register_filter(Probe::new("b", &log, false));

        chain.initialize().unwrap();
        chain.finalize().unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:init", "b:init", "a:fini", "b:fini"]
        );
    }
}

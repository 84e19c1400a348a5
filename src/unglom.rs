//! Decompose records into flat event-builder fragments.
//!
//! Each input record becomes one or more output blocks of the form
//! `FragmentHeader ++ serialized record`:
//!
//! - glom-parameter records from an upstream event builder are consumed and
//!   produce no output;
//! - composite records yield one block per direct child (children of
//!   children are not expanded);
//! - everything else yields one block for the whole record.
//!
//! With [`UnglomConfig::split_built_events`] set, physics events carrying a
//! body header are treated as event-builder output: their inner fragments
//! are written back out verbatim.

use tracing::{debug, info, info_span, trace};

use crate::error::AppResult;
use crate::fragment::{self, BuiltEventIter, FragmentHeader};
use crate::record::{Record, RecordBody};
use crate::transport::{RecordSink, RecordSource};

/// Options for [`Unglom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnglomConfig {
    /// Source id for records that carry no body header.
    pub default_source_id: u32,
    /// Split event-built physics events into their fragments.
    pub split_built_events: bool,
}

/// Counters from one [`Unglom::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnglomSummary {
    /// Records read.
    pub records: u64,
    /// Fragments written.
    pub fragments: u64,
    /// Glom-parameter records consumed.
    pub consumed: u64,
}

/// Reads records and writes flat fragments.
#[derive(Debug)]
pub struct Unglom<S, K> {
    source: S,
    sink: K,
    config: UnglomConfig,
    summary: UnglomSummary,
}

impl<S: RecordSource, K: RecordSink> Unglom<S, K> {
    /// Create a decomposer.
    pub fn new(source: S, sink: K, config: UnglomConfig) -> Self {
        Self {
            source,
            sink,
            config,
            summary: UnglomSummary::default(),
        }
    }

    /// Counters so far.
    pub fn summary(&self) -> UnglomSummary {
        self.summary
    }

    /// The sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Take the source and sink back.
    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Handle one record. Returns `false` at end-of-stream.
    pub fn process_one(&mut self) -> AppResult<bool> {
        let record = match self.source.read_one()? {
            Some(record) => record,
            None => return Ok(false),
        };
        self.summary.records += 1;

        match record.body() {
            RecordBody::GlomParameters(params) => {
                debug!(
                    coincidence_ticks = params.coincidence_ticks,
                    is_building = params.is_building,
                    "consumed upstream glom parameters"
                );
                self.summary.consumed += 1;
            }
            RecordBody::Composite(composite) => {
                for child in &composite.children {
                    self.emit(child)?;
                }
            }
            RecordBody::PhysicsEvent(body)
                if self.config.split_built_events && record.body_header().is_some() =>
            {
                for item in BuiltEventIter::new(body)? {
                    let (header, payload) = item?;
                    self.emit_raw(&header, payload)?;
                }
            }
            _ => self.emit(&record)?,
        }
        Ok(true)
    }

    /// Process records until end-of-stream.
    pub fn run(&mut self) -> AppResult<UnglomSummary> {
        let span = info_span!("unglom", default_source_id = self.config.default_source_id);
        let _guard = span.enter();

        while self.process_one()? {}
        self.sink.flush()?;

        info!(
            records = self.summary.records,
            fragments = self.summary.fragments,
            consumed = self.summary.consumed,
            "unglom finished"
        );
        Ok(self.summary)
    }

    fn emit(&mut self, record: &Record) -> AppResult<()> {
        let (header, payload) = fragment::flatten(record, self.config.default_source_id);
        trace!(kind = %record.kind(), size = payload.len(), "emitting fragment");
        self.sink.put_vectored(&[&header, &payload])?;
        self.summary.fragments += 1;
        Ok(())
    }

    fn emit_raw(&mut self, header: &FragmentHeader, payload: &[u8]) -> AppResult<()> {
        self.sink.put_vectored(&[&header.encode(), payload])?;
        self.summary.fragments += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, RecordError};
    use crate::record::{
        BodyHeader, FormatVersion, GlomParameters, RecordKind, TimestampPolicy, BEGIN_RUN,
        NULL_TIMESTAMP,
    };
    use crate::transport::{MemorySink, MemorySource};

    const V: FormatVersion = FormatVersion::V12;

    fn run(records: Vec<Record>, config: UnglomConfig) -> (UnglomSummary, MemorySink) {
        let mut unglom = Unglom::new(MemorySource::new(records), MemorySink::new(), config);
        let summary = unglom.run().unwrap();
        (summary, unglom.into_parts().1)
    }

    #[test]
    fn test_composite_children_become_separate_blocks() {
        let c1 = Record::physics_event(V, Some(BodyHeader::new(10, 1, 0)), vec![1u8, 1]);
        let c2 = Record::physics_event(V, Some(BodyHeader::new(11, 2, 0)), vec![2u8]);
        let composite =
            Record::composite(V, 30, Some(BodyHeader::new(10, 9, 0)), vec![c1.clone(), c2.clone()])
                .unwrap();

        let (summary, sink) = run(vec![composite], UnglomConfig::default());
        assert_eq!(summary.fragments, 2);
        let writes = sink.writes();
        assert_eq!(writes.len(), 2);
        for (block, child) in writes.iter().zip([&c1, &c2]) {
            let header = FragmentHeader::decode(block).unwrap();
            assert_eq!(header.payload_size as usize, child.size());
            assert_eq!(&block[FragmentHeader::SIZE..], &child.encode()[..]);
        }
        assert_eq!(FragmentHeader::decode(&writes[1]).unwrap().source_id, 2);
    }

    #[test]
    fn test_begin_run_barrier_and_defaults() {
        let begin = Record::state_change(V, RecordKind::BeginRun, 4).unwrap();
        let config = UnglomConfig {
            default_source_id: 77,
            split_built_events: false,
        };
        let (_, sink) = run(vec![begin], config);
        let header = FragmentHeader::decode(&sink.writes()[0]).unwrap();
        assert_eq!(header.barrier_type, BEGIN_RUN);
        assert_eq!(header.timestamp, NULL_TIMESTAMP);
        assert_eq!(header.source_id, 77);
    }

    #[test]
    fn test_glom_parameters_are_consumed() {
        let glom = Record::new(
            V,
            None,
            RecordBody::GlomParameters(GlomParameters {
                coincidence_ticks: 100,
                is_building: true,
                timestamp_policy: TimestampPolicy::First,
            }),
        )
        .unwrap();
        let (summary, sink) = run(vec![glom], UnglomConfig::default());
        assert!(sink.writes().is_empty());
        assert_eq!(summary.consumed, 1);
    }

    #[test]
    fn test_split_built_events() {
        let a = Record::physics_event(V, Some(BodyHeader::new(5, 1, 0)), vec![0xaau8]);
        let b = Record::physics_event(V, Some(BodyHeader::new(6, 2, 0)), vec![0xbbu8]);
        let body = fragment::compose_built_event([&a, &b], 0);
        let built = Record::physics_event(V, Some(BodyHeader::new(5, 10, 0)), body);

        let config = UnglomConfig {
            default_source_id: 0,
            split_built_events: true,
        };
        let (_, sink) = run(vec![built.clone()], config);
        assert_eq!(sink.writes().len(), 2);
        assert_eq!(&sink.writes()[0][FragmentHeader::SIZE..], &a.encode()[..]);

        let (_, whole) = run(vec![built], UnglomConfig::default());
        assert_eq!(whole.writes().len(), 1);
    }

    #[test]
    fn test_truncated_built_event_is_malformed() {
        let built = Record::physics_event(V, Some(BodyHeader::new(5, 10, 0)), vec![40u8, 0, 0, 0]);
        let config = UnglomConfig {
            default_source_id: 0,
            split_built_events: true,
        };
        let mut unglom = Unglom::new(MemorySource::new([built]), MemorySink::new(), config);
        assert!(matches!(
            unglom.process_one(),
            Err(PipelineError::MalformedRecord(RecordError::Truncated { .. }))
        ));
    }
}

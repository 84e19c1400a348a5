//! The main read/filter/write loop.
//!
//! A [`Mediator`] owns one source, one sink, a [`CompositeFilter`] and a
//! [`CompositePredicate`]. Each cycle:
//!
//! 1. `pre_input_update`; abort stops the loop.
//! 2. Read one record; end-of-stream finishes the run cleanly.
//! 3. `post_input_update(kind)`; abort stops without forwarding, skip
//!    discards and starts the next cycle.
//! 4. Run the filter chain; a drop discards the record.
//! 5. `pre_output_update` and `post_output_update`. A pre-output abort stops
//!    without writing; a post-output abort writes, then stops. A skip at
//!    either point discards the record.
//! 6. Write the record.
//!
//! A filter asking for a flush-and-abort (the abnormal end-of-run case) gets
//! its record written at once, bypassing the output predicates, and the run
//! ends with [`PipelineError::AbnormalEnd`]. Filters reporting
//! [`Filter::is_complete`] end the run after the cycle's write.
//!
//! Filters are initialized once before the first cycle and finalized once on
//! every exit route, errors included.

use std::fmt;

use tracing::{debug, error, info, info_span, trace, warn};

use crate::error::{AppResult, PipelineError};
use crate::filter::{CompositeFilter, Filter, FilterOutput};
use crate::predicate::{CompositePredicate, Predicate, Verdict};
use crate::record::Record;
use crate::transport::{RecordSink, RecordSource};

/// Lifecycle of a [`Mediator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediatorState {
    /// Not yet run.
    Idle,
    /// Inside [`Mediator::run`].
    Running,
    /// Stopped by a predicate, a filter or an error.
    Aborted,
    /// Source exhausted or the filter chain reported completion.
    Finished,
}

impl fmt::Display for MediatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediatorState::Idle => "idle",
            MediatorState::Running => "running",
            MediatorState::Aborted => "aborted",
            MediatorState::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// What one [`Mediator::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Records pulled from the source.
    pub read: u64,
    /// Records written to the sink.
    pub written: u64,
    /// Records dropped by the filter chain.
    pub dropped: u64,
    /// Records discarded by a predicate skip.
    pub skipped: u64,
    /// Terminal state.
    pub state: MediatorState,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            read: 0,
            written: 0,
            dropped: 0,
            skipped: 0,
            state: MediatorState::Running,
        }
    }
}

/// How one cycle ended.
enum Cycle {
    Next,
    Stop(MediatorState),
}

/// Drives records from a source through filters into a sink.
pub struct Mediator<S, K> {
    source: S,
    sink: K,
    filters: CompositeFilter,
    predicate: CompositePredicate,
    state: MediatorState,
}

impl<S: RecordSource, K: RecordSink> Mediator<S, K> {
    /// Create an idle mediator with an empty filter chain and no predicates.
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            filters: CompositeFilter::new(),
            predicate: CompositePredicate::new(),
            state: MediatorState::Idle,
        }
    }

    /// Append a filter to the chain.
    pub fn register_filter(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.filters.register_filter(filter);
        self
    }

    /// Append a predicate to the aggregate.
    pub fn add_predicate(&mut self, predicate: impl Predicate + 'static) -> &mut Self {
        self.predicate.add_predicate(predicate);
        self
    }

    /// Current state.
    pub fn state(&self) -> MediatorState {
        self.state
    }

    /// The source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// The filter chain.
    pub fn filters(&self) -> &CompositeFilter {
        &self.filters
    }

    /// Take the source and sink back.
    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Run the loop until end-of-stream, a predicate abort, completion or an
    /// error.
    ///
    /// End-of-stream and predicate aborts are normal terminations and return
    /// `Ok`. The summary's `state` tells them apart.
    pub fn run(&mut self) -> AppResult<RunSummary> {
        let span = info_span!("mediator", filters = self.filters.len());
        let _guard = span.enter();

        self.state = MediatorState::Running;
        debug!(state = %self.state, "initializing filter chain");
        self.predicate.reset();
        if let Err(e) = self.filters.initialize() {
            error!(error = %e, "filter initialization failed");
            self.state = MediatorState::Aborted;
            return Err(e);
        }

        let mut summary = RunSummary::new();
        let outcome = loop {
            match self.cycle(&mut summary) {
                Ok(Cycle::Next) => continue,
                Ok(Cycle::Stop(state)) => break Ok(state),
                Err(e) => break Err(e),
            }
        };
        let finalized = self.finalize();

        match outcome {
            Ok(state) => {
                finalized?;
                self.state = state;
                summary.state = state;
                info!(
                    state = %state,
                    read = summary.read,
                    written = summary.written,
                    dropped = summary.dropped,
                    skipped = summary.skipped,
                    "pipeline stopped"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(fin) = finalized {
                    warn!(error = %fin, "finalize failed after pipeline error");
                }
                self.state = MediatorState::Aborted;
                error!(error = %e, read = summary.read, written = summary.written, "pipeline aborted");
                Err(e)
            }
        }
    }

    fn cycle(&mut self, summary: &mut RunSummary) -> AppResult<Cycle> {
        if self.predicate.pre_input_update() == Verdict::Abort {
            debug!("pre-input abort");
            return Ok(Cycle::Stop(MediatorState::Aborted));
        }

        let record = match self.source.read_one()? {
            Some(record) => record,
            None => {
                debug!("end of stream");
                return Ok(Cycle::Stop(MediatorState::Finished));
            }
        };
        summary.read += 1;
        let kind = record.kind();

        match self.predicate.post_input_update(kind) {
            Verdict::Abort => {
                debug!(%kind, "post-input abort");
                return Ok(Cycle::Stop(MediatorState::Aborted));
            }
            Verdict::Skip => {
                summary.skipped += 1;
                return Ok(Cycle::Next);
            }
            Verdict::Continue => {}
        }

        let record = match self.filters.handle(record)? {
            FilterOutput::Emit(record) => record,
            FilterOutput::Drop => {
                summary.dropped += 1;
                return Ok(self.after_write());
            }
            FilterOutput::FlushAndAbort(record) => {
                self.write(&record)?;
                summary.written += 1;
                return Err(PipelineError::AbnormalEnd);
            }
        };

        let kind = record.kind();
        let pre = self.predicate.pre_output_update(kind);
        if pre == Verdict::Abort {
            debug!(%kind, "pre-output abort");
            return Ok(Cycle::Stop(MediatorState::Aborted));
        }
        let post = self.predicate.post_output_update(kind);

        if pre == Verdict::Skip || post == Verdict::Skip {
            summary.skipped += 1;
        } else {
            self.write(&record)?;
            summary.written += 1;
        }

        if post == Verdict::Abort {
            debug!(%kind, "post-output abort");
            return Ok(Cycle::Stop(MediatorState::Aborted));
        }
        Ok(self.after_write())
    }

    fn after_write(&self) -> Cycle {
        if self.filters.is_complete() {
            debug!("filter chain complete");
            Cycle::Stop(MediatorState::Finished)
        } else {
            Cycle::Next
        }
    }

    fn write(&mut self, record: &Record) -> AppResult<()> {
        let bytes = record.encode();
        trace!(kind = %record.kind(), size = bytes.len(), "writing record");
        self.sink.put(&bytes)
    }

    fn finalize(&mut self) -> AppResult<()> {
        let filters = self.filters.finalize();
        let sink = self.sink.flush();
        filters.and(sink)
    }
}

impl<S, K> fmt::Debug for Mediator<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mediator")
            .field("filters", &self.filters)
            .field("predicate", &self.predicate)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

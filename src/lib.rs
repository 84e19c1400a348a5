//! # ringfilter
//!
//! Filtering and mediation of DAQ ring-item streams.
//!
//! Records (begin/end-of-run markers, scalers, physics events, event-builder
//! fragments and friends) are read one at a time from a source, passed
//! through an ordered chain of filters, gated by flow-control predicates and
//! written to a sink. A second pipeline, [`unglom`], decomposes records back
//! into flat event-builder fragments.
//!
//! ## Crate Structure
//!
//! - **`record`**: The record model and its three wire generations
//!   (v10, v11, v12), with bounds-checked decoding.
//! - **`fragment`**: The flat fragment header and event-built bodies.
//! - **`filter`**: The [`Filter`](filter::Filter) trait, per-kind dispatch,
//!   the composite chain and the built-in filters.
//! - **`predicate`**: Continue/skip/abort flow control and the record-count
//!   window.
//! - **`one_shot`**: Run-boundary bookkeeping across several producers.
//! - **`mediator`**: The main read/filter/write loop.
//! - **`unglom`**: Record to flat-fragment decomposition.
//! - **`transport`**: Record sources and byte sinks.
//! - **`config`**, **`logging`**, **`error`**: Ambient plumbing.
//!
//! ## Example
//!
//! ```
//! use ringfilter::filter::AbnormalEndFilter;
//! use ringfilter::mediator::{Mediator, MediatorState};
//! use ringfilter::predicate::ProcessCountPredicate;
//! use ringfilter::record::{FormatVersion, Record, RecordKind};
//! use ringfilter::transport::{MemorySink, MemorySource};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let v = FormatVersion::V11;
//! let records = vec![
//!     Record::state_change(v, RecordKind::BeginRun, 1)?,
//!     Record::physics_event(v, None, vec![1u8, 2, 3]),
//!     Record::state_change(v, RecordKind::EndRun, 1)?,
//! ];
//!
//! let mut mediator = Mediator::new(MemorySource::new(records), MemorySink::new());
//! mediator.register_filter(AbnormalEndFilter);
//! mediator.add_predicate(ProcessCountPredicate::new(1, 0));
//!
//! let summary = mediator.run()?;
//! assert_eq!(summary.state, MediatorState::Finished);
//! assert_eq!(summary.written, 2);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod fragment;
pub mod logging;
pub mod mediator;
pub mod one_shot;
pub mod predicate;
pub mod record;
pub mod transport;
pub mod unglom;

pub use error::{AppResult, PipelineError, RecordError, TransitionError};
pub use mediator::{Mediator, MediatorState, RunSummary};
pub use record::{FormatVersion, Record, RecordKind};

//! Custom error types for the pipeline.
//!
//! This module defines the primary error type, `PipelineError`, along with the
//! narrower errors it wraps. Using the `thiserror` crate, it provides a
//! centralized and consistent way to report everything that can stop a
//! pipeline run.
//!
//! ## Error Hierarchy
//!
//! - **`MalformedRecord`**: Wraps a [`RecordError`]. A record's declared size
//!   disagrees with the bytes that are actually available, or a fixed field
//!   does not fit. Fatal for the cycle; the main loop stops.
//! - **`UnexpectedTransition`**: Wraps a [`TransitionError`]. The run-boundary
//!   bookkeeping can no longer account for the run (extra begin, transition
//!   after completion, run number mismatch).
//! - **`Transport`**: Wraps `std::io::Error` from a source or sink.
//! - **`AbnormalEnd`**: An abnormal end-of-run record was observed and has
//!   already been flushed downstream.
//! - **`Configuration`**: Semantic errors in configuration values or URIs.
//! - **`Filter`**: A filter refused a record for a reason of its own.
//!
//! Per-cycle SKIP verdicts are not errors and never surface here.

use crate::record::{FormatVersion, RecordKind};
use thiserror::Error;

/// Convenience alias for results using the pipeline error type.
pub type AppResult<T> = std::result::Result<T, PipelineError>;

/// A record could not be decoded or built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The declared size cannot even hold the record header.
    #[error("Declared record size {0} is smaller than the 8-byte header")]
    TooSmall(u32),

    /// Fewer bytes are available than the record declares.
    #[error("Record declares {declared} bytes but only {available} are available")]
    Truncated {
        /// Size from the record's own size field.
        declared: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// The declared size exceeds what the reader is willing to buffer.
    #[error("Record declares {declared} bytes, above the {limit}-byte limit")]
    TooLarge {
        /// Size from the record's own size field.
        declared: usize,
        /// Configured limit.
        limit: usize,
    },

    /// A fixed-width field runs past the end of the record.
    #[error("Field '{field}' runs past the end of the record")]
    FieldOverrun {
        /// Name of the field being decoded.
        field: &'static str,
    },

    /// The payload ends before the declared size does.
    #[error("Record declares {declared} bytes but its payload ends after {decoded}")]
    TrailingBytes {
        /// Size from the record's own size field.
        declared: usize,
        /// Bytes the payload accounted for.
        decoded: usize,
    },

    /// Composite records are nested deeper than the decoder follows.
    #[error("Composite records nested more than {limit} levels deep")]
    NestingTooDeep {
        /// Deepest nesting accepted.
        limit: usize,
    },

    /// The body-header size word holds a value no generation produces.
    #[error("Invalid body header size {0}")]
    BadBodyHeader(u32),

    /// The kind cannot be represented in the requested wire generation.
    #[error("{kind} records are not supported by format {version}")]
    Unsupported {
        /// Kind that was requested.
        kind: RecordKind,
        /// Generation that lacks it.
        version: FormatVersion,
    },

    /// The payload variant cannot carry the requested kind.
    #[error("Payload cannot carry a {0} record")]
    KindMismatch(RecordKind),

    /// A composite child was built for a different generation than its parent.
    #[error("Composite child uses format {child}, parent uses {parent}")]
    MixedVersions {
        /// Generation of the parent.
        parent: FormatVersion,
        /// Generation of the offending child.
        child: FormatVersion,
    },
}

/// The run-boundary bookkeeping was violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// A state change arrived after every source had already ended the run.
    #[error("{kind} for run {run_number} received after the run completed")]
    ExtraTransition {
        /// Kind of the late record.
        kind: RecordKind,
        /// Run number it carried.
        run_number: u32,
    },

    /// More begin-of-run records than there are sources.
    #[error("Too many begin-run records: already saw {expected} for run {run_number}")]
    TooManyBegins {
        /// Expected source count.
        expected: usize,
        /// Run being tracked.
        run_number: u32,
    },

    /// A state change names a different run than the one being tracked.
    #[error("{kind} carries run {found} while run {expected} is in progress")]
    RunNumberMismatch {
        /// Kind of the offending record.
        kind: RecordKind,
        /// Run number cached from the first begin.
        expected: u32,
        /// Run number the record carried.
        found: u32,
    },
}

/// Primary error type for a pipeline run.
///
/// Every variant stops the main loop; the mediator reports it to the caller
/// after running `finalize()`. There is no automatic retry at this level.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A record's declared size is inconsistent with the available bytes.
    ///
    /// **Recovery Strategy**: None within the run. The stream is positioned
    /// somewhere unknown after a framing error.
    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] RecordError),

    /// Run-boundary bookkeeping failed.
    ///
    /// **Recovery Strategy**: Abort; the pipeline can no longer tell which
    /// producers have finished the run.
    #[error("Unexpected transition: {0}")]
    UnexpectedTransition(#[from] TransitionError),

    /// Source or sink I/O failed.
    ///
    /// Transient conditions (`WouldBlock`, `Interrupted`) are retried inside
    /// the transport and never reach this variant.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// An abnormal end-of-run record was seen and flushed to the sink.
    #[error("Abnormal end of run observed upstream; record flushed downstream")]
    AbnormalEnd,

    /// Configuration validation failed.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A filter rejected a record.
    #[error("Filter '{filter}' failed: {message}")]
    Filter {
        /// Name of the failing filter.
        filter: String,
        /// Human-readable reason.
        message: String,
    },
}

impl PipelineError {
    /// Build a [`PipelineError::Filter`].
    pub fn filter(filter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Filter {
            filter: filter.into(),
            message: message.into(),
        }
    }
}

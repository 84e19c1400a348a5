//! Flow control around the read and write steps of a pipeline cycle.
//!
//! A [`Predicate`] is consulted at four points of every cycle, always in
//! this order:
//!
//! 1. [`pre_input_update`](Predicate::pre_input_update) before a record is read,
//! 2. [`post_input_update`](Predicate::post_input_update) after it is read,
//! 3. [`pre_output_update`](Predicate::pre_output_update) before it is written,
//! 4. [`post_output_update`](Predicate::post_output_update) last.
//!
//! Each point yields a [`Verdict`]. Points 3 and 4 are only reached by
//! records that survived the filter chain.

mod composite;
mod process_count;
mod select;

pub use composite::CompositePredicate;
pub use process_count::ProcessCountPredicate;
pub use select::{ExcludeKindsPredicate, SamplePredicate};

use std::fmt;

use crate::record::RecordKind;

/// Control verdict of a predicate evaluation point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    /// Carry on with the cycle.
    Continue,
    /// Discard the current record and start the next cycle.
    Skip,
    /// Stop the pipeline.
    Abort,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Continue => write!(f, "CONTINUE"),
            Verdict::Skip => write!(f, "SKIP"),
            Verdict::Abort => write!(f, "ABORT"),
        }
    }
}

/// Pre/post hooks around read and write. Every hook defaults to
/// [`Verdict::Continue`].
pub trait Predicate: Send {
    /// Before a record is read.
    fn pre_input_update(&mut self) -> Verdict {
        Verdict::Continue
    }

    /// After a record of `kind` was read.
    fn post_input_update(&mut self, _kind: RecordKind) -> Verdict {
        Verdict::Continue
    }

    /// Before a record of `kind` is written.
    fn pre_output_update(&mut self, _kind: RecordKind) -> Verdict {
        Verdict::Continue
    }

    /// After the output decision for a record of `kind`.
    fn post_output_update(&mut self, _kind: RecordKind) -> Verdict {
        Verdict::Continue
    }

    /// Return to the initial counting state without changing configuration.
    fn reset(&mut self) {}
}

impl<P: Predicate + ?Sized> Predicate for Box<P> {
    fn pre_input_update(&mut self) -> Verdict {
        (**self).pre_input_update()
    }

    fn post_input_update(&mut self, kind: RecordKind) -> Verdict {
        (**self).post_input_update(kind)
    }

    fn pre_output_update(&mut self, kind: RecordKind) -> Verdict {
        (**self).pre_output_update(kind)
    }

    fn post_output_update(&mut self, kind: RecordKind) -> Verdict {
        (**self).post_output_update(kind)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

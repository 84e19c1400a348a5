//! Ordered aggregation of predicates.

use super::{Predicate, Verdict};
use crate::record::RecordKind;

/// Combines member predicates at each evaluation point.
///
/// Members are evaluated in registration order starting from
/// [`Verdict::Continue`]:
///
/// - `Abort` stops evaluation immediately and wins.
/// - `Skip` is remembered, but later members are still evaluated so their
///   counters keep advancing. A later `Continue` does not clear it.
///
/// With no members every point yields `Continue`.
#[derive(Default)]
pub struct CompositePredicate {
    predicates: Vec<Box<dyn Predicate>>,
}

impl CompositePredicate {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `predicate` to the evaluation order.
    pub fn add_predicate(&mut self, predicate: impl Predicate + 'static) {
        self.predicates.push(Box::new(predicate));
    }

    /// Append an already boxed predicate.
    pub fn add_boxed(&mut self, predicate: Box<dyn Predicate>) {
        self.predicates.push(predicate);
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether there are no members.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    fn aggregate(&mut self, mut eval: impl FnMut(&mut dyn Predicate) -> Verdict) -> Verdict {
        let mut result = Verdict::Continue;
        for predicate in &mut self.predicates {
            match eval(predicate.as_mut()) {
                Verdict::Abort => return Verdict::Abort,
                Verdict::Skip => result = Verdict::Skip,
                Verdict::Continue => {}
            }
        }
        result
    }
}

impl std::fmt::Debug for CompositePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositePredicate")
            .field("members", &self.predicates.len())
            .finish()
    }
}

impl Predicate for CompositePredicate {
    fn pre_input_update(&mut self) -> Verdict {
        self.aggregate(|p| p.pre_input_update())
    }

    fn post_input_update(&mut self, kind: RecordKind) -> Verdict {
        self.aggregate(|p| p.post_input_update(kind))
    }

    fn pre_output_update(&mut self, kind: RecordKind) -> Verdict {
        self.aggregate(|p| p.pre_output_update(kind))
    }

    fn post_output_update(&mut self, kind: RecordKind) -> Verdict {
        self.aggregate(|p| p.post_output_update(kind))
    }

    fn reset(&mut self) {
        for predicate in &mut self.predicates {
            predicate.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns a fixed verdict at post-input and counts how often it is asked.
    struct Fixed {
        verdict: Verdict,
        calls: Arc<AtomicUsize>,
    }

    impl Fixed {
        fn new(verdict: Verdict) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    verdict,
                    calls: Arc::clone(&calls),
                },
                calls,
            )
        }
    }

    impl Predicate for Fixed {
        fn post_input_update(&mut self, _kind: RecordKind) -> Verdict {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict
        }
    }

    #[test]
    fn test_empty_is_always_continue() {
        let mut composite = CompositePredicate::new();
        assert_eq!(composite.pre_input_update(), Verdict::Continue);
        assert_eq!(
            composite.post_input_update(RecordKind::PhysicsEvent),
            Verdict::Continue
        );
        assert_eq!(
            composite.pre_output_update(RecordKind::PhysicsEvent),
            Verdict::Continue
        );
        assert_eq!(
            composite.post_output_update(RecordKind::PhysicsEvent),
            Verdict::Continue
        );
    }

    #[test]
    fn test_skip_is_sticky_and_later_members_still_run() {
        let (skip, _) = Fixed::new(Verdict::Skip);
        let (cont, cont_calls) = Fixed::new(Verdict::Continue);
        let mut composite = CompositePredicate::new();
        composite.add_predicate(skip);
        composite.add_predicate(cont);

        assert_eq!(
            composite.post_input_update(RecordKind::PhysicsEvent),
            Verdict::Skip
        );
        assert_eq!(cont_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_abort_short_circuits() {
        let (skip, _) = Fixed::new(Verdict::Skip);
        let (abort, _) = Fixed::new(Verdict::Abort);
        let (after, after_calls) = Fixed::new(Verdict::Continue);
        let mut composite = CompositePredicate::new();
        composite.add_predicate(skip);
        composite.add_predicate(abort);
        composite.add_predicate(after);

        assert_eq!(
            composite.post_input_update(RecordKind::Scaler),
            Verdict::Abort
        );
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_counting_member_advances_behind_a_skip() {
        use crate::predicate::ProcessCountPredicate;

        let (skip, _) = Fixed::new(Verdict::Skip);
        let mut composite = CompositePredicate::new();
        composite.add_predicate(skip);
        composite.add_predicate(ProcessCountPredicate::new(0, 2));

        // The counter's budget of two is spent even though every record is skipped.
        assert_eq!(composite.post_input_update(RecordKind::PhysicsEvent), Verdict::Skip);
        assert_eq!(composite.post_input_update(RecordKind::PhysicsEvent), Verdict::Skip);
        assert_eq!(composite.post_input_update(RecordKind::PhysicsEvent), Verdict::Abort);
    }
}

//! Kind-based selection predicates.

use std::collections::{BTreeSet, HashMap};

use super::{Predicate, Verdict};
use crate::record::RecordKind;

/// Skips every record whose kind is in the exclusion set.
#[derive(Debug, Clone, Default)]
pub struct ExcludeKindsPredicate {
    excluded: BTreeSet<RecordKind>,
}

impl ExcludeKindsPredicate {
    /// Exclude the given kinds.
    pub fn new(kinds: impl IntoIterator<Item = RecordKind>) -> Self {
        Self {
            excluded: kinds.into_iter().collect(),
        }
    }

    /// Whether `kind` is excluded.
    pub fn excludes(&self, kind: RecordKind) -> bool {
        self.excluded.contains(&kind)
    }
}

impl Predicate for ExcludeKindsPredicate {
    fn post_input_update(&mut self, kind: RecordKind) -> Verdict {
        if self.excludes(kind) {
            Verdict::Skip
        } else {
            Verdict::Continue
        }
    }
}

/// Passes only every `every`-th record of the sampled kinds; other kinds
/// are not affected. The first record of each sampled kind passes.
#[derive(Debug, Clone)]
pub struct SamplePredicate {
    sampled: BTreeSet<RecordKind>,
    every: u64,
    seen: HashMap<RecordKind, u64>,
}

impl SamplePredicate {
    /// Sample `kinds`, keeping one record in `every`. An `every` of 0 or 1
    /// keeps everything.
    pub fn new(kinds: impl IntoIterator<Item = RecordKind>, every: u64) -> Self {
        Self {
            sampled: kinds.into_iter().collect(),
            every: every.max(1),
            seen: HashMap::new(),
        }
    }
}

impl Predicate for SamplePredicate {
    fn post_input_update(&mut self, kind: RecordKind) -> Verdict {
        if !self.sampled.contains(&kind) {
            return Verdict::Continue;
        }
        let seen = self.seen.entry(kind).or_insert(0);
        let verdict = if *seen % self.every == 0 {
            Verdict::Continue
        } else {
            Verdict::Skip
        };
        *seen += 1;
        verdict
    }

    fn reset(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclude() {
        let mut predicate = ExcludeKindsPredicate::new([RecordKind::Scaler, RecordKind::PacketTypes]);
        assert_eq!(predicate.post_input_update(RecordKind::Scaler), Verdict::Skip);
        assert_eq!(
            predicate.post_input_update(RecordKind::PhysicsEvent),
            Verdict::Continue
        );
    }

    #[test]
    fn test_sample_every_third() {
        let mut predicate = SamplePredicate::new([RecordKind::PhysicsEvent], 3);
        let got: Vec<_> = (0..6)
            .map(|_| predicate.post_input_update(RecordKind::PhysicsEvent))
            .collect();
        assert_eq!(
            got,
            vec![
                Verdict::Continue,
                Verdict::Skip,
                Verdict::Skip,
                Verdict::Continue,
                Verdict::Skip,
                Verdict::Skip
            ]
        );
        assert_eq!(predicate.post_input_update(RecordKind::EndRun), Verdict::Continue);

        predicate.reset();
        assert_eq!(
            predicate.post_input_update(RecordKind::PhysicsEvent),
            Verdict::Continue
        );
    }
}

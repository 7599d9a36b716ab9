//! The grouped output of one generation-oracle call.

use crate::witness::Witness;

/// Witnesses from a single generation call, grouped the way the search
/// consumes them: trusted counterexamples are admissible to the global
/// ledger, untrusted counterexamples fan out into alternate branches, and
/// predicate witnesses branch as positive/negative pairs.
#[derive(Debug, Clone, Default)]
pub struct WitnessBundle {
    pub trusted_counterexamples: Vec<Witness>,
    pub untrusted_counterexamples: Vec<Witness>,
    pub predicates: Vec<Witness>,
    /// Highest ordering index seen across all rendered witnesses; the next
    /// generation call must start strictly above it.
    pub max_index: u32,
}

impl WitnessBundle {
    pub fn is_empty(&self) -> bool {
        self.trusted_counterexamples.is_empty()
            && self.untrusted_counterexamples.is_empty()
            && self.predicates.is_empty()
    }

    /// Number of concrete witnesses across all groups, counting each branch
    /// container's variants rather than the container itself.
    pub fn witness_count(&self) -> usize {
        self.trusted_counterexamples
            .iter()
            .chain(&self.untrusted_counterexamples)
            .chain(&self.predicates)
            .map(Witness::concrete_count)
            .sum()
    }
}

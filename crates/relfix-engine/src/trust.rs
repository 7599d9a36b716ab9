//! Witness bookkeeping: the monotonic trust ledger and the optional
//! used-witness tracker.

use indexmap::IndexSet;

use relfix_ir::witness::{Witness, WitnessKey};

use crate::report::UsedWitnessCounts;

/// Witnesses trusted for the remainder of the run.
///
/// The ledger only grows; there is deliberately no removal operation, so
/// once a witness is admitted every later repair invocation sees it.
/// Admission deduplicates on witness identity.
#[derive(Debug, Default)]
pub struct TrustLedger {
    witnesses: IndexSet<Witness>,
}

impl TrustLedger {
    pub fn new() -> Self {
        TrustLedger::default()
    }

    /// Admits one witness; returns whether it was new.
    pub fn admit(&mut self, witness: Witness) -> bool {
        self.witnesses.insert(witness)
    }

    /// Admits a batch; returns whether any witness was new.
    pub fn admit_all(&mut self, witnesses: impl IntoIterator<Item = Witness>) -> bool {
        let mut any_new = false;
        for witness in witnesses {
            any_new |= self.witnesses.insert(witness);
        }
        any_new
    }

    pub fn contains(&self, witness: &Witness) -> bool {
        self.witnesses.contains(witness)
    }

    pub fn len(&self) -> usize {
        self.witnesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.witnesses.is_empty()
    }

    /// Iterates in admission order.
    pub fn iter(&self) -> impl Iterator<Item = &Witness> + Clone {
        self.witnesses.iter()
    }
}

/// Tracks which distinct witnesses were actually handed to the repair
/// oracle over the whole run. Disabled instances record nothing.
#[derive(Debug, Default)]
pub struct UsedWitnesses {
    enabled: bool,
    trusted: IndexSet<WitnessKey>,
    untrusted: IndexSet<WitnessKey>,
}

impl UsedWitnesses {
    pub fn new(enabled: bool) -> Self {
        UsedWitnesses {
            enabled,
            ..UsedWitnesses::default()
        }
    }

    pub fn record_trusted<'a>(&mut self, witnesses: impl IntoIterator<Item = &'a Witness>) {
        if !self.enabled {
            return;
        }
        self.trusted.extend(witnesses.into_iter().map(Witness::key));
    }

    pub fn record_untrusted<'a>(&mut self, witnesses: impl IntoIterator<Item = &'a Witness>) {
        if !self.enabled {
            return;
        }
        self.untrusted.extend(witnesses.into_iter().map(Witness::key));
    }

    pub fn counts(&self) -> Option<UsedWitnessCounts> {
        self.enabled.then(|| UsedWitnessCounts {
            trusted: self.trusted.len(),
            untrusted: self.untrusted.len(),
        })
    }
}

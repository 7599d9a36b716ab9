//! Repair candidates and the tree they form.
//!
//! Every candidate except the root has a parent link; the local witness sets
//! are cumulative along the parent chain, so "local" means local relative to
//! the parent, not to the root.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexSet;
use serde::Serialize;

use crate::witness::Witness;

/// Insertion-ordered witness set. Iteration order is the admission order,
/// which keeps repair-oracle inputs reproducible across runs.
pub type WitnessSet = IndexSet<Witness>;

/// Stable identifier assigned at candidate creation, in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CandidateId(u32);

impl CandidateId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Generator for creation-ordered candidate identifiers.
#[derive(Debug, Default)]
pub struct CandidateIds {
    next: u32,
}

impl CandidateIds {
    pub fn new() -> Self {
        CandidateIds::default()
    }

    pub fn next_id(&mut self) -> CandidateId {
        let id = CandidateId(self.next);
        self.next += 1;
        id
    }
}

/// Reference to the model under repair on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModelRef(PathBuf);

impl ModelRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ModelRef(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// One node of the candidate tree.
///
/// A candidate is immutable once pushed into the search space; the priority
/// hint is set with [`Candidate::with_repaired_properties`] before that.
#[derive(Debug, Clone)]
pub struct Candidate {
    id: CandidateId,
    model: ModelRef,
    depth: u32,
    trusted: WitnessSet,
    untrusted: WitnessSet,
    parent: Option<Arc<Candidate>>,
    repaired_properties: u32,
}

impl Candidate {
    /// The root candidate: the unmodified model with no local witnesses.
    pub fn initial(model: ModelRef, id: CandidateId) -> Self {
        Candidate {
            id,
            model,
            depth: 0,
            trusted: WitnessSet::default(),
            untrusted: WitnessSet::default(),
            parent: None,
            repaired_properties: 0,
        }
    }

    /// A child candidate one lap deeper than its parent.
    ///
    /// The witness sets passed in are the child's cumulative local sets, so
    /// callers extend copies of the parent's sets rather than passing deltas.
    pub fn descendant(
        model: ModelRef,
        untrusted: WitnessSet,
        trusted: WitnessSet,
        parent: Arc<Candidate>,
        id: CandidateId,
    ) -> Self {
        let depth = parent.depth + 1;
        Candidate {
            id,
            model,
            depth,
            trusted,
            untrusted,
            parent: Some(parent),
            repaired_properties: 0,
        }
    }

    /// Sets the priority hint. Only meaningful before the candidate is
    /// pushed into the search space.
    pub fn with_repaired_properties(mut self, repaired_properties: u32) -> Self {
        self.repaired_properties = repaired_properties;
        self
    }

    pub fn id(&self) -> CandidateId {
        self.id
    }

    pub fn model(&self) -> &ModelRef {
        &self.model
    }

    /// Laps of the search that produced this candidate.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn trusted(&self) -> &WitnessSet {
        &self.trusted
    }

    pub fn untrusted(&self) -> &WitnessSet {
        &self.untrusted
    }

    pub fn parent(&self) -> Option<&Arc<Candidate>> {
        self.parent.as_ref()
    }

    /// Properties the repair oracle reported fixed; candidates with more
    /// are preferred by the priority search-space variants.
    pub fn repaired_properties(&self) -> u32 {
        self.repaired_properties
    }

    /// True when this candidate contributes at least one witness its parent
    /// did not already carry. A candidate with no new local witnesses would
    /// re-run the oracle on inputs already tried along this branch.
    pub fn has_local_tests(&self) -> bool {
        match &self.parent {
            None => !self.trusted.is_empty() || !self.untrusted.is_empty(),
            Some(parent) => {
                self.untrusted
                    .iter()
                    .any(|w| !parent.untrusted.contains(w))
                    || self.trusted.iter().any(|w| !parent.trusted.contains(w))
            }
        }
    }

    pub fn local_witness_count(&self) -> usize {
        self.trusted.len() + self.untrusted.len()
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} depth {} ({} trusted, {} untrusted local witnesses)",
            self.id,
            self.depth,
            self.trusted.len(),
            self.untrusted.len()
        )
    }
}

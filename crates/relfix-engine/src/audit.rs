//! Audit graph of the search process.
//!
//! Every oracle interaction and branching decision is recorded as a node in
//! a DAG whose edge set is constrained by a fixed adjacency relation: a
//! repair call can only follow the original candidate or a witness
//! generation, fix verdicts can only follow a repair call, and so on.
//! Terminal kinds admit no children. The graph can be exported as Graphviz
//! DOT, once per output path.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use thiserror::Error;

use relfix_ir::candidate::{Candidate, CandidateId};
use relfix_ir::witness::Witness;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditNodeKind {
    /// The unmodified model the search started from.
    Original,
    /// One invocation of the repair phase for a candidate.
    RepairCall,
    /// A patch that later passed the full check.
    RealFix,
    /// A patch that failed the full check.
    SpuriousFix,
    /// A check failure on a candidate that was never patched.
    FauxSpuriousFix,
    /// The repair oracle gave up on a candidate.
    NoFix,
    /// A generation call produced nothing.
    NoWitnesses,
    /// A branch that hit the lap limit.
    MaxLap,
    /// One invocation of the witness-generation phase.
    WitnessGeneration,
    /// The run's time budget expired here.
    Timeout,
}

impl AuditNodeKind {
    fn prefix(&self) -> &'static str {
        match self {
            AuditNodeKind::Original => "OR",
            AuditNodeKind::RepairCall => "RC",
            AuditNodeKind::RealFix => "RF",
            AuditNodeKind::SpuriousFix => "SF",
            AuditNodeKind::FauxSpuriousFix => "FF",
            AuditNodeKind::NoFix => "NF",
            AuditNodeKind::NoWitnesses => "NW",
            AuditNodeKind::MaxLap => "ML",
            AuditNodeKind::WitnessGeneration => "WG",
            AuditNodeKind::Timeout => "TO",
        }
    }

    /// Node kinds that may appear as direct children of this kind.
    pub fn allowed_children(&self) -> &'static [AuditNodeKind] {
        match self {
            AuditNodeKind::Original => &[AuditNodeKind::RepairCall],
            AuditNodeKind::RepairCall => &[
                AuditNodeKind::SpuriousFix,
                AuditNodeKind::FauxSpuriousFix,
                AuditNodeKind::RealFix,
                AuditNodeKind::NoFix,
            ],
            AuditNodeKind::SpuriousFix | AuditNodeKind::FauxSpuriousFix => &[
                AuditNodeKind::WitnessGeneration,
                AuditNodeKind::MaxLap,
                AuditNodeKind::Timeout,
            ],
            AuditNodeKind::WitnessGeneration => {
                &[AuditNodeKind::RepairCall, AuditNodeKind::NoWitnesses]
            }
            AuditNodeKind::RealFix
            | AuditNodeKind::NoFix
            | AuditNodeKind::NoWitnesses
            | AuditNodeKind::MaxLap
            | AuditNodeKind::Timeout => &[],
        }
    }

    fn dot_style(&self) -> (&'static str, &'static str) {
        match self {
            AuditNodeKind::Original => ("egg", "cornflowerblue"),
            AuditNodeKind::RepairCall => ("diamond", "yellow"),
            AuditNodeKind::RealFix => ("house", "chartreuse4"),
            AuditNodeKind::SpuriousFix => ("polygon", "darkgoldenrod2"),
            AuditNodeKind::FauxSpuriousFix => ("polygon", "darkgoldenrod"),
            AuditNodeKind::NoFix => ("triangle", "indianred"),
            AuditNodeKind::NoWitnesses => ("triangle", "ivory4"),
            AuditNodeKind::MaxLap => ("triangle", "black"),
            AuditNodeKind::WitnessGeneration => ("diamond", "cyan"),
            AuditNodeKind::Timeout => ("triangle", "indigo"),
        }
    }
}

const KIND_ORDER: [AuditNodeKind; 10] = [
    AuditNodeKind::Original,
    AuditNodeKind::RepairCall,
    AuditNodeKind::RealFix,
    AuditNodeKind::SpuriousFix,
    AuditNodeKind::FauxSpuriousFix,
    AuditNodeKind::NoFix,
    AuditNodeKind::NoWitnesses,
    AuditNodeKind::MaxLap,
    AuditNodeKind::WitnessGeneration,
    AuditNodeKind::Timeout,
];

#[derive(Debug)]
pub struct AuditNode {
    id: String,
    kind: AuditNodeKind,
    candidate: Option<CandidateId>,
    label: String,
    extra_info: Option<String>,
    children: Vec<String>,
}

impl AuditNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> AuditNodeKind {
        self.kind
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit graph output already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("failed to write audit graph: {0}")]
    Io(#[from] io::Error),
}

/// The recorded process DAG. Node ids are unique: a candidate that is
/// evaluated again (after a search restart) gets a suffixed id, and anchor
/// lookups resolve to the most recent node for a candidate.
#[derive(Debug, Default)]
pub struct AuditGraph {
    nodes: IndexMap<String, AuditNode>,
    root: Option<String>,
    sequence: u32,
}

impl AuditGraph {
    pub fn new() -> Self {
        AuditGraph::default()
    }

    pub fn record_original(&mut self, candidate: &Candidate) {
        self.insert(
            AuditNodeKind::Original,
            Some(candidate.id()),
            candidate.id().to_string(),
            None,
            None,
        );
    }

    pub fn record_repair_call(&mut self, candidate: &Candidate, ledger_len: usize) {
        let from = candidate
            .parent()
            .map(|parent| parent.id())
            .unwrap_or_else(|| candidate.id());
        let anchor = self.anchor_for(
            &[AuditNodeKind::WitnessGeneration, AuditNodeKind::Original],
            from,
        );
        let extra = witness_pool_info(ledger_len, candidate);
        self.insert(
            AuditNodeKind::RepairCall,
            Some(candidate.id()),
            candidate.id().to_string(),
            Some(extra),
            anchor,
        );
    }

    pub fn record_real_fix(&mut self, candidate: &Candidate) {
        self.record_fix(AuditNodeKind::RealFix, candidate);
    }

    pub fn record_spurious_fix(&mut self, candidate: &Candidate) {
        self.record_fix(AuditNodeKind::SpuriousFix, candidate);
    }

    pub fn record_faux_spurious_fix(&mut self, candidate: &Candidate) {
        self.record_fix(AuditNodeKind::FauxSpuriousFix, candidate);
    }

    pub fn record_no_fix(&mut self, candidate: &Candidate) {
        self.record_fix(AuditNodeKind::NoFix, candidate);
    }

    fn record_fix(&mut self, kind: AuditNodeKind, candidate: &Candidate) {
        let anchor = self.anchor_for(&[AuditNodeKind::RepairCall], candidate.id());
        let extra = format!(
            "local witnesses: {}T|{}U",
            candidate.trusted().len(),
            candidate.untrusted().len()
        );
        self.insert(
            kind,
            Some(candidate.id()),
            candidate.id().to_string(),
            Some(extra),
            anchor,
        );
    }

    /// Records the generation phase of a candidate, splitting its output
    /// into witnesses admitted globally and witnesses kept branch-local.
    pub fn record_generated_witnesses(
        &mut self,
        candidate: &Candidate,
        global: &[&Witness],
        local: &[&Witness],
    ) {
        let anchor = self.anchor_for(
            &[AuditNodeKind::FauxSpuriousFix, AuditNodeKind::SpuriousFix],
            candidate.id(),
        );
        let positive = local
            .iter()
            .filter(|w| w.classification().is_positive())
            .count();
        let negative = local
            .iter()
            .filter(|w| w.classification().is_negative())
            .count();
        let extra = format!(
            "GW({}) LW({})[+{positive},-{negative}]",
            global.len(),
            local.len()
        );
        self.insert(
            AuditNodeKind::WitnessGeneration,
            Some(candidate.id()),
            candidate.id().to_string(),
            Some(extra),
            anchor,
        );
    }

    pub fn record_no_witnesses(&mut self, candidate: &Candidate) {
        let anchor = self.anchor_for(&[AuditNodeKind::WitnessGeneration], candidate.id());
        self.insert(
            AuditNodeKind::NoWitnesses,
            None,
            "NO WITNESSES".to_string(),
            None,
            anchor,
        );
    }

    pub fn record_max_lap(&mut self, candidate: &Candidate) {
        let anchor = self.anchor_for(
            &[AuditNodeKind::FauxSpuriousFix, AuditNodeKind::SpuriousFix],
            candidate.id(),
        );
        self.insert(AuditNodeKind::MaxLap, None, "MAX LAP".to_string(), None, anchor);
    }

    pub fn record_timeout(&mut self, candidate: &Candidate) {
        let anchor = self.anchor_for(
            &[AuditNodeKind::FauxSpuriousFix, AuditNodeKind::SpuriousFix],
            candidate.id(),
        );
        self.insert(AuditNodeKind::Timeout, None, "TIMEOUT".to_string(), None, anchor);
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &AuditNode> {
        self.nodes.values()
    }

    /// True when every recorded edge is permitted by the adjacency
    /// relation. Meant for assertions in tests rather than the hot loop.
    pub fn adjacency_respected(&self) -> bool {
        self.nodes.values().all(|node| {
            node.children.iter().all(|child_id| {
                self.nodes
                    .get(child_id)
                    .map(|child| node.kind.allowed_children().contains(&child.kind))
                    .unwrap_or(false)
            })
        })
    }

    /// Renders the graph as Graphviz DOT: node declarations grouped by
    /// kind, then edges in breadth-first order from the root.
    pub fn dot_string(&self) -> String {
        let mut out = String::new();
        out.push_str("digraph repair_search {\n");
        out.push_str("rankdir=TD;\n");
        out.push_str("ratio=\"auto\";\n");
        out.push_str("ranksep=\"1.5 equally\";\n");
        out.push_str("node [fontsize = 10 style=filled];\n");
        for kind in KIND_ORDER {
            for node in self.nodes.values().filter(|n| n.kind == kind) {
                let (shape, color) = kind.dot_style();
                match &node.extra_info {
                    Some(extra) => out.push_str(&format!(
                        "{} [shape = {shape} fillcolor = {color} label=<{}<BR/><FONT POINT-SIZE=\"10\">{extra}</FONT>>];\n",
                        node.id, node.label
                    )),
                    None => out.push_str(&format!(
                        "{} [shape = {shape} fillcolor = {color} label=\"{}\"];\n",
                        node.id, node.label
                    )),
                }
            }
        }
        if let Some(root) = &self.root {
            let mut queue = VecDeque::from([root.clone()]);
            let mut visited: HashSet<String> = HashSet::from([root.clone()]);
            while let Some(id) = queue.pop_front() {
                let Some(node) = self.nodes.get(&id) else {
                    continue;
                };
                for child in &node.children {
                    out.push_str(&format!("{id} -> {child};\n"));
                    if visited.insert(child.clone()) {
                        queue.push_back(child.clone());
                    }
                }
            }
        }
        out.push_str("}\n");
        out
    }

    /// Writes the DOT rendering to `path`. The output is write-once: an
    /// existing file is an error, never overwritten.
    pub fn write_dot(&self, path: &Path) -> Result<(), AuditError> {
        if path.exists() {
            return Err(AuditError::AlreadyExists(path.to_path_buf()));
        }
        fs::write(path, self.dot_string())?;
        Ok(())
    }

    fn anchor_for(&self, kinds: &[AuditNodeKind], candidate: CandidateId) -> Option<String> {
        for kind in kinds {
            let found = self
                .nodes
                .values()
                .rev()
                .find(|node| node.kind == *kind && node.candidate == Some(candidate));
            if let Some(node) = found {
                return Some(node.id.clone());
            }
        }
        None
    }

    fn insert(
        &mut self,
        kind: AuditNodeKind,
        candidate: Option<CandidateId>,
        label: String,
        extra_info: Option<String>,
        anchor: Option<String>,
    ) -> String {
        let base = match candidate {
            Some(id) => format!("{}{}", kind.prefix(), id),
            None => {
                self.sequence += 1;
                format!("{}n{}", kind.prefix(), self.sequence)
            }
        };
        let mut id = base.clone();
        let mut bump = 0u32;
        while self.nodes.contains_key(&id) {
            bump += 1;
            id = format!("{base}_r{bump}");
        }
        if let Some(anchor_id) = &anchor {
            debug_assert!(
                self.nodes
                    .get(anchor_id)
                    .map(|n| n.kind.allowed_children().contains(&kind))
                    .unwrap_or(false),
                "edge {anchor_id} -> {id} violates the adjacency relation"
            );
            if let Some(parent) = self.nodes.get_mut(anchor_id) {
                parent.children.push(id.clone());
            }
        }
        if self.root.is_none() {
            self.root = Some(id.clone());
        }
        self.nodes.insert(
            id.clone(),
            AuditNode {
                id: id.clone(),
                kind,
                candidate,
                label,
                extra_info,
                children: Vec::new(),
            },
        );
        id
    }
}

fn witness_pool_info(ledger_len: usize, candidate: &Candidate) -> String {
    let locals = candidate.trusted().iter().chain(candidate.untrusted().iter());
    let positive = locals
        .clone()
        .filter(|w| w.classification().is_positive())
        .count();
    let negative = locals.filter(|w| w.classification().is_negative()).count();
    format!(
        "GW({ledger_len}) LW({})[+{positive},-{negative}]",
        candidate.local_witness_count()
    )
}

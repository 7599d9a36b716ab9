//! The repair search: configuration, branch expansion, and the driver.

pub mod branching;
pub mod driver;

pub use driver::Driver;

/// Exploration order of the candidate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Depth-first: follow one branch of interpretations to the lap limit
    /// before trying its siblings.
    Dfs,
    /// Breadth-first: evaluate every candidate of a lap before descending.
    Bfs,
}

/// Where user-supplied witnesses go relative to accumulated ones when the
/// repair oracle's input is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialWitnessPlacement {
    Prepend,
    Append,
}

/// Immutable configuration for one search run.
///
/// Options are read at `run` time only; mutating them between runs is
/// fine, mid-run reconfiguration is not possible.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub strategy: SearchStrategy,
    /// Pop the candidate with the most repaired properties first.
    pub prioritize_repaired_properties: bool,
    /// Keep a secondary space for branches spawned while trusted
    /// counterexamples were also available; it is only drained when the
    /// primary space runs dry.
    pub secondary_space: bool,
    /// When generation yields no counterexamples, retry with the model's
    /// facts relaxed.
    pub allow_relaxation: bool,
    /// After a relaxed retry, run one more generation pass forced from the
    /// assertions.
    pub force_assertion_witnesses: bool,
    /// Admit generated trusted counterexamples to the global ledger instead
    /// of the spawning branch.
    pub global_trust: bool,
    /// Maximum candidate depth. Zero means run the repair oracle once and
    /// report what happened.
    pub lap_limit: u32,
    /// Wall-clock budget in minutes. Zero disables the budget.
    pub timeout_minutes: u64,
    /// Skip a candidate instead of aborting when the repair oracle dies
    /// with its known crash.
    pub tolerate_repair_crashes: bool,
    /// When the space drains, re-push the original candidate once so
    /// globally admitted witnesses get a second chance against it.
    pub restart_for_unseen_witnesses: bool,
    /// Record the audit graph of the run.
    pub audit_graph: bool,
    pub initial_placement: InitialWitnessPlacement,
    /// When the repair oracle finds nothing but only trusted witnesses are
    /// in play, check the unrepaired model anyway.
    pub keep_going_without_repair: bool,
    /// Count the distinct witnesses actually handed to the repair oracle.
    pub track_used_witnesses: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            strategy: SearchStrategy::Dfs,
            prioritize_repaired_properties: false,
            secondary_space: false,
            allow_relaxation: false,
            force_assertion_witnesses: false,
            global_trust: true,
            lap_limit: 4,
            timeout_minutes: 0,
            tolerate_repair_crashes: false,
            restart_for_unseen_witnesses: false,
            audit_graph: false,
            initial_placement: InitialWitnessPlacement::Prepend,
            keep_going_without_repair: false,
            track_used_witnesses: false,
        }
    }
}

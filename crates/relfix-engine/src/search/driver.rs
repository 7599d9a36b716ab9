//! The search loop alternating the repair and check oracles.
//!
//! One lap evaluates one candidate: assemble its witness pool, ask the
//! repair oracle for a patch, check the resulting model against the
//! property oracle, and on a failed check generate fresh witnesses and
//! branch the candidate tree. The loop ends with a repaired model, an
//! exhausted space, an expired time budget, or a fatal oracle error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use relfix_ir::bundle::WitnessBundle;
use relfix_ir::candidate::{Candidate, CandidateIds, ModelRef};
use relfix_ir::witness::Witness;

use relfix_oracles::{
    CheckOracle, CheckOutcome, GenerationOutcome, GenerationRequest, RepairOracle, RepairOutcome,
};

use crate::audit::AuditGraph;
use crate::report::{OracleStage, ReportSink, RunReport, SearchCounters, SearchTimings, Verdict};
use crate::search::branching::{self, BranchMode, BranchingDefect};
use crate::search::{InitialWitnessPlacement, SearchOptions, SearchStrategy};
use crate::space::{CandidateSpace, SpaceEmpty};
use crate::trust::{TrustLedger, UsedWitnesses};

enum LapOutcome {
    Continue,
    Finished(Verdict),
}

/// Mutable state of one run, separate from the driver so oracle calls and
/// state updates borrow independently.
struct RunState {
    primary: CandidateSpace,
    secondary: Option<CandidateSpace>,
    ledger: TrustLedger,
    ids: CandidateIds,
    root_model: ModelRef,
    initial: Vec<Witness>,
    counters: SearchCounters,
    repair_time: Duration,
    check_time: Duration,
    start: Instant,
    next_index: u32,
    max_lap: u32,
    search_restarted: bool,
    used: UsedWitnesses,
    audit: Option<AuditGraph>,
}

impl RunState {
    fn new(options: &SearchOptions, root_model: ModelRef, initial: Vec<Witness>) -> Self {
        let make_space = || match (options.strategy, options.prioritize_repaired_properties) {
            (SearchStrategy::Dfs, false) => CandidateSpace::stack(),
            (SearchStrategy::Bfs, false) => CandidateSpace::queue(),
            (SearchStrategy::Dfs, true) => CandidateSpace::priority_stack(),
            (SearchStrategy::Bfs, true) => CandidateSpace::priority_queue(),
        };
        let next_index = initial.iter().map(Witness::index).max().unwrap_or(0) + 1;
        RunState {
            primary: make_space(),
            secondary: options.secondary_space.then(make_space),
            ledger: TrustLedger::new(),
            ids: CandidateIds::new(),
            root_model,
            initial,
            counters: SearchCounters::default(),
            repair_time: Duration::ZERO,
            check_time: Duration::ZERO,
            start: Instant::now(),
            next_index,
            max_lap: 0,
            search_restarted: false,
            used: UsedWitnesses::new(options.track_used_witnesses),
            audit: options.audit_graph.then(AuditGraph::new),
        }
    }

    fn pop_candidate(&mut self) -> Option<Arc<Candidate>> {
        match self.primary.pop() {
            Ok(candidate) => Some(candidate),
            Err(SpaceEmpty) => {
                let secondary = self.secondary.as_mut()?;
                match secondary.pop() {
                    Ok(candidate) => {
                        info!(
                            "primary candidate space is empty but the secondary space is not, redirecting one candidate"
                        );
                        Some(candidate)
                    }
                    Err(SpaceEmpty) => None,
                }
            }
        }
    }

    fn timed_out(&self, options: &SearchOptions) -> bool {
        options.timeout_minutes > 0
            && self.start.elapsed() >= Duration::from_secs(options.timeout_minutes * 60)
    }
}

/// The search driver. Owns the two oracles, the run configuration, and the
/// sink that receives the finished report.
pub struct Driver<R, C, S> {
    repair: R,
    check: C,
    options: SearchOptions,
    sink: S,
    last_audit: Option<AuditGraph>,
}

impl<R, C, S> Driver<R, C, S>
where
    R: RepairOracle,
    C: CheckOracle,
    S: ReportSink,
{
    pub fn new(repair: R, check: C, options: SearchOptions, sink: S) -> Self {
        Driver {
            repair,
            check,
            options,
            sink,
            last_audit: None,
        }
    }

    /// Audit graph of the most recent run, when audit recording was on.
    pub fn audit_graph(&self) -> Option<&AuditGraph> {
        self.last_audit.as_ref()
    }

    /// Runs the search to completion and emits the report to the sink.
    pub fn run(&mut self, model: ModelRef, initial: Vec<Witness>) -> RunReport {
        info!(
            model = %model,
            lap_limit = self.options.lap_limit,
            initial_witnesses = initial.len(),
            "starting repair search"
        );
        let mut state = RunState::new(&self.options, model, initial);
        let original = Arc::new(Candidate::initial(
            state.root_model.clone(),
            state.ids.next_id(),
        ));
        if let Some(audit) = state.audit.as_mut() {
            audit.record_original(&original);
        }
        state.primary.push(Arc::clone(&original));

        let verdict = loop {
            let current = match state.pop_candidate() {
                Some(candidate) => candidate,
                None => break Verdict::Exhausted,
            };
            match self.evaluate(&mut state, &current) {
                LapOutcome::Finished(verdict) => break verdict,
                LapOutcome::Continue => {}
            }
            if self.options.restart_for_unseen_witnesses
                && state.primary.is_empty()
                && !state.search_restarted
            {
                info!("restarting the search so unseen witnesses can run against the original model");
                state.primary.push(Arc::clone(&original));
                state.search_restarted = true;
            }
        };
        if matches!(verdict, Verdict::Exhausted) {
            info!(max_lap = state.max_lap, "candidate space exhausted without a repair");
        }

        let report = RunReport {
            verdict,
            counters: state.counters,
            timings: SearchTimings {
                repair_oracle: state.repair_time,
                check_oracle: state.check_time,
                total: state.start.elapsed(),
            },
            max_lap: state.max_lap,
            used_witnesses: state.used.counts(),
        };
        self.sink.emit(&report);
        self.last_audit = state.audit.take();
        report
    }

    fn evaluate(&mut self, state: &mut RunState, current: &Arc<Candidate>) -> LapOutcome {
        state.counters.candidates_evaluated += 1;
        state.max_lap = state.max_lap.max(current.depth());
        info!(candidate = %current, "evaluating candidate");

        if let Some(audit) = state.audit.as_mut() {
            audit.record_repair_call(current, state.ledger.len());
        }

        let witnesses = self.assemble_repair_witnesses(state, current);
        let outcome = if witnesses.is_empty() {
            debug!("no witnesses available, skipping the repair oracle");
            RepairOutcome::NoTests
        } else {
            state.used.record_trusted(
                state
                    .ledger
                    .iter()
                    .chain(current.trusted().iter())
                    .chain(state.initial.iter()),
            );
            state.used.record_untrusted(current.untrusted().iter());
            state.counters.repair_calls += 1;
            let started = Instant::now();
            let result = self.repair.repair(current.model(), &witnesses);
            state.repair_time += started.elapsed();
            match result {
                Ok(outcome) => outcome,
                Err(e) => RepairOutcome::Failed {
                    message: e.to_string(),
                    null_pointer: false,
                },
            }
        };

        if let RepairOutcome::Failed {
            message,
            null_pointer,
        } = &outcome
        {
            if *null_pointer && self.options.tolerate_repair_crashes {
                warn!("repair oracle hit its known crash, skipping candidate: {message}");
                return LapOutcome::Continue;
            }
            error!("repair oracle failed: {message}");
            return LapOutcome::Finished(Verdict::Error {
                stage: OracleStage::Repair,
                message: message.clone(),
            });
        }

        let fixed_model = match &outcome {
            RepairOutcome::Fixed(model) => Some(model.clone()),
            _ => None,
        };
        let repair_found = fixed_model.is_some();
        let no_tests = matches!(outcome, RepairOutcome::NoTests);
        let no_repair = if let RepairOutcome::NoRepair(message) = &outcome {
            debug!("repair oracle declined: {message}");
            true
        } else {
            false
        };

        // A dead end may still be worth checking when only trusted
        // witnesses constrained the oracle and nothing else is queued.
        let keep_going = no_repair
            && self.options.keep_going_without_repair
            && state.primary.is_empty()
            && !state.ledger.is_empty()
            && current.untrusted().is_empty();

        if !(repair_found || no_tests || keep_going) {
            info!(candidate = %current, "no repair for candidate");
            state.counters.candidates_without_repair += 1;
            if let Some(audit) = state.audit.as_mut() {
                audit.record_no_fix(current);
            }
            if self.options.lap_limit == 0 {
                return LapOutcome::Finished(Verdict::RanOnceNoFix);
            }
            return LapOutcome::Continue;
        }
        if keep_going {
            info!("no repair, continuing with the unrepaired model since only trusted witnesses are in play");
        }

        let check_model = fixed_model
            .clone()
            .unwrap_or_else(|| current.model().clone());
        state.counters.check_calls += 1;
        let started = Instant::now();
        let check_result = self.check.check(&check_model);
        state.check_time += started.elapsed();
        let check_outcome = match check_result {
            Ok(outcome) => outcome,
            Err(e) => CheckOutcome::Failed(e.to_string()),
        };

        let repaired_properties = match check_outcome {
            CheckOutcome::Failed(message) => {
                error!("check oracle failed: {message}");
                return LapOutcome::Finished(Verdict::Error {
                    stage: OracleStage::Check,
                    message,
                });
            }
            CheckOutcome::Valid => {
                info!(model = %check_model, "repair found");
                if let Some(audit) = state.audit.as_mut() {
                    audit.record_real_fix(current);
                }
                return LapOutcome::Finished(Verdict::Found {
                    model: check_model,
                    candidate: current.id(),
                    depth: current.depth(),
                });
            }
            CheckOutcome::Invalid { passing, total } => {
                info!(?passing, ?total, "candidate fails its property check");
                state.counters.candidates_leading_to_spurious += 1;
                if let Some(audit) = state.audit.as_mut() {
                    if repair_found {
                        audit.record_spurious_fix(current);
                    } else {
                        audit.record_faux_spurious_fix(current);
                    }
                }
                passing.unwrap_or(0)
            }
        };

        if current.depth() < self.options.lap_limit {
            if state.timed_out(&self.options) {
                warn!(
                    minutes = self.options.timeout_minutes,
                    "search time budget exceeded"
                );
                if let Some(audit) = state.audit.as_mut() {
                    audit.record_timeout(current);
                }
                return LapOutcome::Finished(Verdict::Timeout {
                    after_minutes: self.options.timeout_minutes,
                });
            }
            if let Err(finished) =
                self.generate_and_branch(state, current, &check_model, repaired_properties)
            {
                return finished;
            }
        } else if self.options.lap_limit != 0 {
            info!("lap limit reached for this branch, skipping witness generation");
            if let Some(audit) = state.audit.as_mut() {
                audit.record_max_lap(current);
            }
        }

        if self.options.lap_limit == 0 {
            return LapOutcome::Finished(if repair_found {
                Verdict::RanOnceSpurious
            } else {
                Verdict::RanOnceNoFix
            });
        }
        LapOutcome::Continue
    }

    /// Generation phase of one lap: pull witnesses from the check oracle
    /// (optionally relaxed and assertion-forced), admit trusted
    /// counterexamples, and branch ambiguous ones.
    fn generate_and_branch(
        &mut self,
        state: &mut RunState,
        current: &Arc<Candidate>,
        check_model: &ModelRef,
        repaired_properties: u32,
    ) -> Result<(), LapOutcome> {
        let bundle = self
            .generate_witnesses(state, check_model, false, false)
            .map_err(fatal_generation)?;

        let mut relaxed_predicates: Vec<Witness> = Vec::new();
        let mut forced_witnesses: Vec<Witness> = Vec::new();
        let mut relaxation_ran = false;

        let no_counterexamples = bundle.trusted_counterexamples.is_empty()
            && bundle.untrusted_counterexamples.is_empty();
        if self.options.allow_relaxation
            && (no_counterexamples || self.options.secondary_space)
            && bundle.predicates.is_empty()
        {
            if no_counterexamples {
                info!("generation produced no counterexamples, relaxing facts to widen the witness pool");
            } else {
                info!("secondary space enabled, relaxing facts for additional witnesses");
            }
            relaxation_ran = true;
            let relaxed = self
                .generate_witnesses(state, check_model, true, false)
                .map_err(fatal_generation)?;
            relaxed_predicates = relaxed.predicates;
            if self.options.force_assertion_witnesses {
                let forced = self
                    .generate_witnesses(state, check_model, false, true)
                    .map_err(fatal_generation)?;
                forced_witnesses = forced.predicates;
                forced_witnesses.extend(forced.untrusted_counterexamples);
            }
        }

        let cex = &bundle.trusted_counterexamples;
        let untrusted_cex = &bundle.untrusted_counterexamples;
        let predicates = &bundle.predicates;

        // Trusted counterexamples go to the global ledger, or stay local to
        // this branch when global trust is off and the branch already has
        // context of its own.
        let trusted_as_global = self.options.global_trust
            || (current.untrusted().is_empty() && current.trusted().is_empty());
        let (global_added, add_local_trusted) = if trusted_as_global {
            (state.ledger.admit_all(cex.iter().cloned()), false)
        } else {
            (false, !cex.is_empty())
        };

        if let Some(audit) = state.audit.as_mut() {
            let (global, mut local): (Vec<&Witness>, Vec<&Witness>) = if trusted_as_global {
                (
                    cex.iter().collect(),
                    untrusted_cex.iter().chain(predicates.iter()).collect(),
                )
            } else {
                (
                    Vec::new(),
                    cex.iter()
                        .chain(untrusted_cex.iter())
                        .chain(predicates.iter())
                        .collect(),
                )
            };
            local.extend(relaxed_predicates.iter());
            local.extend(forced_witnesses.iter());
            audit.record_generated_witnesses(current, &global, &local);
        }

        let mut branches = 0usize;

        if !cex.is_empty() {
            let mut local_trusted = current.trusted().clone();
            if add_local_trusted {
                local_trusted.extend(cex.iter().cloned());
            }
            let candidate = Candidate::descendant(
                state.root_model.clone(),
                current.untrusted().clone(),
                local_trusted,
                Arc::clone(current),
                state.ids.next_id(),
            )
            .with_repaired_properties(repaired_properties);
            if candidate.has_local_tests() || global_added {
                state.primary.push(Arc::new(candidate));
                branches += 1;
            } else {
                warn!(candidate = %candidate, "candidate is invalid (no new witnesses could be added)");
            }
        }

        if (cex.is_empty() || self.options.secondary_space) && !untrusted_cex.is_empty() {
            let to_secondary = !cex.is_empty();
            if to_secondary {
                info!("adding untrusted counterexample candidates into the secondary space");
            }
            branches += self
                .branch_into(
                    state,
                    current,
                    untrusted_cex,
                    BranchMode::Alternate,
                    repaired_properties,
                    to_secondary,
                )
                .map_err(fatal_branching)?;
        }

        let no_cex = cex.is_empty() && untrusted_cex.is_empty();
        for pair_source in [predicates, &relaxed_predicates, &forced_witnesses] {
            if (no_cex || self.options.secondary_space) && !pair_source.is_empty() {
                branches += self
                    .branch_into(
                        state,
                        current,
                        pair_source,
                        BranchMode::PositiveNegative,
                        repaired_properties,
                        !no_cex,
                    )
                    .map_err(fatal_branching)?;
            }
        }

        let witnesses_generated =
            !bundle.is_empty() || !relaxed_predicates.is_empty() || !forced_witnesses.is_empty();
        if !witnesses_generated {
            info!("no witnesses were generated for this candidate");
            if let Some(audit) = state.audit.as_mut() {
                audit.record_no_witnesses(current);
            }
        }
        debug!(branches, "lap finished");
        Ok(())
    }

    /// One generation call. Advances the ordering-index floor past
    /// everything the call produced and folds the witness count into the
    /// run counters.
    fn generate_witnesses(
        &mut self,
        state: &mut RunState,
        model: &ModelRef,
        relaxed_facts: bool,
        force_assertions: bool,
    ) -> Result<WitnessBundle, String> {
        state.counters.generation_calls += 1;
        let request = GenerationRequest {
            relaxed_facts,
            force_assertions,
            starting_index: state.next_index,
        };
        let started = Instant::now();
        let result = self.check.generate(model, &request);
        state.check_time += started.elapsed();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => return Err(e.to_string()),
        };
        match outcome {
            GenerationOutcome::Failed(message) => Err(message),
            GenerationOutcome::Witnesses(bundle) => {
                state.next_index = state.next_index.max(bundle.max_index) + 1;
                state.counters.witnesses_generated += bundle.witness_count() as u64;
                debug!(
                    witnesses = bundle.witness_count(),
                    next_index = state.next_index,
                    "generation call finished"
                );
                Ok(bundle)
            }
        }
    }

    fn branch_into(
        &self,
        state: &mut RunState,
        current: &Arc<Candidate>,
        witnesses: &[Witness],
        mode: BranchMode,
        repaired_properties: u32,
        to_secondary: bool,
    ) -> Result<usize, BranchingDefect> {
        let RunState {
            primary,
            secondary,
            ids,
            root_model,
            ..
        } = state;
        let target = match (to_secondary, secondary.as_mut()) {
            (true, Some(space)) => space,
            _ => primary,
        };
        branching::create_branches(
            ids,
            root_model,
            current,
            witnesses,
            mode,
            repaired_properties,
            target,
        )
    }

    /// The repair oracle's input: the global ledger, then this candidate's
    /// untrusted and trusted witnesses, with user-supplied witnesses
    /// prepended or appended per the options. Empty means the oracle has
    /// nothing to work against.
    fn assemble_repair_witnesses(&self, state: &RunState, current: &Candidate) -> Vec<Witness> {
        let mut witnesses: Vec<Witness> = Vec::new();
        witnesses.extend(state.ledger.iter().cloned());
        witnesses.extend(current.untrusted().iter().cloned());
        witnesses.extend(current.trusted().iter().cloned());
        if witnesses.is_empty() && state.initial.is_empty() {
            return witnesses;
        }
        match self.options.initial_placement {
            InitialWitnessPlacement::Prepend => {
                let mut all = state.initial.clone();
                all.extend(witnesses);
                all
            }
            InitialWitnessPlacement::Append => {
                witnesses.extend(state.initial.iter().cloned());
                witnesses
            }
        }
    }
}

fn fatal_generation(message: String) -> LapOutcome {
    error!("generation oracle failed: {message}");
    LapOutcome::Finished(Verdict::Error {
        stage: OracleStage::Generation,
        message,
    })
}

fn fatal_branching(defect: BranchingDefect) -> LapOutcome {
    error!("{defect}");
    LapOutcome::Finished(Verdict::Error {
        stage: OracleStage::Branching,
        message: defect.to_string(),
    })
}

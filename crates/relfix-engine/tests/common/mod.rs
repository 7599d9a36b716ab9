#![allow(dead_code)]
//! Scripted oracles and witness builders shared by the integration tests.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use relfix_engine::report::{ReportSink, RunReport};
use relfix_ir::bundle::WitnessBundle;
use relfix_ir::candidate::ModelRef;
use relfix_ir::witness::{Classification, Witness};
use relfix_oracles::{
    CheckOracle, CheckOutcome, GenerationOutcome, GenerationRequest, RepairOracle, RepairOutcome,
};

pub fn witness(classification: Classification, name: &str, index: u32, body: &str) -> Witness {
    let artifact = format!(
        "--TEST START\npred {name}_{index} {{\n{body}\n}}\n--TEST FINISH\nrun {name}_{index} expect 0\n"
    );
    Witness::from_artifact(&artifact, classification).expect("test artifact should parse")
}

pub fn cex(name: &str, index: u32, body: &str) -> Witness {
    witness(Classification::Counterexample, name, index, body)
}

pub fn seed(name: &str, index: u32, body: &str) -> Witness {
    witness(Classification::Initial, name, index, body)
}

/// An alternate-branch container over one body per variant.
pub fn fanout(name: &str, index: u32, bodies: &[&str]) -> Witness {
    let variants = bodies.iter().map(|b| cex(name, index, b)).collect();
    Witness::with_alternates(variants).expect("fanout should build")
}

/// A positive/negative pair container.
pub fn pair(name: &str, index: u32, positive_body: &str, negative_body: &str) -> Witness {
    Witness::paired(
        witness(Classification::UntrustedPositive, name, index, positive_body),
        witness(Classification::UntrustedNegative, name, index, negative_body),
    )
}

pub fn model(path: &str) -> ModelRef {
    ModelRef::new(path)
}

pub fn fixed(path: &str) -> RepairOutcome {
    RepairOutcome::Fixed(ModelRef::new(path))
}

pub fn no_repair() -> RepairOutcome {
    RepairOutcome::NoRepair(String::from("no patch produced"))
}

pub fn invalid() -> CheckOutcome {
    CheckOutcome::Invalid {
        passing: None,
        total: None,
    }
}

pub fn bundle_of(
    trusted: Vec<Witness>,
    untrusted: Vec<Witness>,
    predicates: Vec<Witness>,
) -> GenerationOutcome {
    let max_index = trusted
        .iter()
        .chain(&untrusted)
        .chain(&predicates)
        .map(Witness::index)
        .max()
        .unwrap_or(0);
    GenerationOutcome::Witnesses(WitnessBundle {
        trusted_counterexamples: trusted,
        untrusted_counterexamples: untrusted,
        predicates,
        max_index,
    })
}

pub fn trusted_bundle(witnesses: Vec<Witness>) -> GenerationOutcome {
    bundle_of(witnesses, Vec::new(), Vec::new())
}

pub fn untrusted_bundle(witnesses: Vec<Witness>) -> GenerationOutcome {
    bundle_of(Vec::new(), witnesses, Vec::new())
}

pub fn predicate_bundle(witnesses: Vec<Witness>) -> GenerationOutcome {
    bundle_of(Vec::new(), Vec::new(), witnesses)
}

pub fn empty_bundle() -> GenerationOutcome {
    GenerationOutcome::Witnesses(WitnessBundle::default())
}

/// Predicate text of every witness handed to the repair oracle, per call.
pub type CallLog = Arc<Mutex<Vec<Vec<String>>>>;

/// Repair oracle that replays a fixed script and logs what it received.
/// Running past the script is a test bug and panics.
pub struct ScriptedRepair {
    script: VecDeque<RepairOutcome>,
    calls: CallLog,
}

impl ScriptedRepair {
    pub fn new(script: Vec<RepairOutcome>) -> (Self, CallLog) {
        let calls: CallLog = Arc::default();
        (
            ScriptedRepair {
                script: script.into(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl RepairOracle for ScriptedRepair {
    type Error = Infallible;

    fn repair(
        &mut self,
        _model: &ModelRef,
        witnesses: &[Witness],
    ) -> Result<RepairOutcome, Self::Error> {
        assert!(!witnesses.is_empty(), "driver must not invoke repair without witnesses");
        self.calls
            .lock()
            .expect("call log lock")
            .push(witnesses.iter().map(|w| w.predicate().to_string()).collect());
        Ok(self.script.pop_front().expect("repair script exhausted"))
    }
}

pub type RequestLog = Arc<Mutex<Vec<GenerationRequest>>>;
pub type ModelLog = Arc<Mutex<Vec<String>>>;

/// Check oracle replaying fixed check and generation scripts.
pub struct ScriptedCheck {
    checks: VecDeque<CheckOutcome>,
    generations: VecDeque<GenerationOutcome>,
    requests: RequestLog,
    checked_models: ModelLog,
}

impl ScriptedCheck {
    pub fn new(
        checks: Vec<CheckOutcome>,
        generations: Vec<GenerationOutcome>,
    ) -> (Self, RequestLog, ModelLog) {
        let requests: RequestLog = Arc::default();
        let checked_models: ModelLog = Arc::default();
        (
            ScriptedCheck {
                checks: checks.into(),
                generations: generations.into(),
                requests: Arc::clone(&requests),
                checked_models: Arc::clone(&checked_models),
            },
            requests,
            checked_models,
        )
    }
}

impl CheckOracle for ScriptedCheck {
    type Error = Infallible;

    fn check(&mut self, model: &ModelRef) -> Result<CheckOutcome, Self::Error> {
        self.checked_models
            .lock()
            .expect("model log lock")
            .push(model.to_string());
        Ok(self.checks.pop_front().expect("check script exhausted"))
    }

    fn generate(
        &mut self,
        _model: &ModelRef,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, Self::Error> {
        self.requests
            .lock()
            .expect("request log lock")
            .push(*request);
        Ok(self
            .generations
            .pop_front()
            .expect("generation script exhausted"))
    }
}

/// Sink recording the verdict class of every emitted report.
pub struct CollectSink {
    verdicts: Arc<Mutex<Vec<String>>>,
}

impl CollectSink {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let verdicts: Arc<Mutex<Vec<String>>> = Arc::default();
        (
            CollectSink {
                verdicts: Arc::clone(&verdicts),
            },
            verdicts,
        )
    }
}

impl ReportSink for CollectSink {
    fn emit(&mut self, report: &RunReport) {
        self.verdicts
            .lock()
            .expect("verdict log lock")
            .push(report.verdict.verdict_class().to_string());
    }
}

pub struct NullSink;

impl ReportSink for NullSink {
    fn emit(&mut self, _report: &RunReport) {}
}

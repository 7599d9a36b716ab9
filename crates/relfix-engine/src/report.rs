//! Outcome of a search run and where it gets delivered.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use relfix_ir::candidate::{CandidateId, ModelRef};

/// Which part of the pipeline a fatal error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OracleStage {
    Repair,
    Check,
    Generation,
    Branching,
}

impl fmt::Display for OracleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OracleStage::Repair => "repair",
            OracleStage::Check => "check",
            OracleStage::Generation => "generation",
            OracleStage::Branching => "branching",
        };
        f.write_str(name)
    }
}

/// Final verdict of one search run.
#[derive(Debug, Clone, Serialize)]
pub enum Verdict {
    /// A candidate model passed the full property check.
    Found {
        model: ModelRef,
        candidate: CandidateId,
        depth: u32,
    },
    /// Single-lap mode: the repair oracle produced nothing usable.
    RanOnceNoFix,
    /// Single-lap mode: the repair oracle produced a patch that failed
    /// the property check.
    RanOnceSpurious,
    /// Every candidate was evaluated without finding a repair.
    Exhausted,
    /// The configured time budget ran out.
    Timeout { after_minutes: u64 },
    /// An oracle or the branching step failed fatally.
    Error { stage: OracleStage, message: String },
}

impl Verdict {
    pub fn verdict_class(&self) -> &'static str {
        match self {
            Verdict::Found { .. } => "FOUND",
            Verdict::RanOnceNoFix => "NO_FIX",
            Verdict::RanOnceSpurious => "SPURIOUS",
            Verdict::Exhausted => "EXHAUSTED",
            Verdict::Timeout { .. } => "TIMEOUT",
            Verdict::Error { .. } => "ERROR",
        }
    }

    /// True when the run ended with a repaired model.
    pub fn is_repair(&self) -> bool {
        matches!(self, Verdict::Found { .. })
    }
}

/// Candidate and oracle-call counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SearchCounters {
    pub candidates_evaluated: u64,
    pub candidates_without_repair: u64,
    pub candidates_leading_to_spurious: u64,
    pub repair_calls: u64,
    pub check_calls: u64,
    pub generation_calls: u64,
    pub witnesses_generated: u64,
}

/// Wall-clock time spent inside each oracle and overall.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SearchTimings {
    pub repair_oracle: Duration,
    pub check_oracle: Duration,
    pub total: Duration,
}

/// Distinct witnesses handed to the repair oracle, by trust.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UsedWitnessCounts {
    pub trusted: usize,
    pub untrusted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub verdict: Verdict,
    pub counters: SearchCounters,
    pub timings: SearchTimings,
    /// Deepest lap any evaluated candidate reached.
    pub max_lap: u32,
    pub used_witnesses: Option<UsedWitnessCounts>,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RESULT: {}", self.verdict.verdict_class())?;
        match &self.verdict {
            Verdict::Found {
                model,
                candidate,
                depth,
            } => writeln!(f, "repaired model: {model} (candidate {candidate}, depth {depth})")?,
            Verdict::Timeout { after_minutes } => {
                writeln!(f, "time budget of {after_minutes} minutes exceeded")?
            }
            Verdict::Error { stage, message } => {
                writeln!(f, "{stage} stage failed: {message}")?
            }
            _ => {}
        }
        writeln!(
            f,
            "candidates: {} evaluated, {} without repair, {} leading to spurious fixes",
            self.counters.candidates_evaluated,
            self.counters.candidates_without_repair,
            self.counters.candidates_leading_to_spurious
        )?;
        writeln!(
            f,
            "oracle calls: {} repair, {} check, {} generation",
            self.counters.repair_calls, self.counters.check_calls, self.counters.generation_calls
        )?;
        writeln!(
            f,
            "witnesses generated: {}",
            self.counters.witnesses_generated
        )?;
        writeln!(f, "max lap reached: {}", self.max_lap)?;
        if let Some(used) = &self.used_witnesses {
            writeln!(
                f,
                "witnesses used: {} trusted, {} untrusted",
                used.trusted, used.untrusted
            )?;
        }
        write!(
            f,
            "time: {:.1?} repair oracle, {:.1?} check oracle, {:.1?} total",
            self.timings.repair_oracle, self.timings.check_oracle, self.timings.total
        )
    }
}

/// Where finished reports are delivered.
pub trait ReportSink {
    fn emit(&mut self, report: &RunReport);
}

/// Sink that logs the report line by line.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn emit(&mut self, report: &RunReport) {
        for line in report.to_string().lines() {
            info!("{line}");
        }
    }
}

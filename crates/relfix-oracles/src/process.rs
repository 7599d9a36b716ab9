//! Process adapters that drive the external repair and check tools.
//!
//! Both adapters speak a filesystem protocol. The repair tool receives the
//! model plus a staged `<stem>_tests.als` witness artifact and is expected
//! to leave a patched `<stem>_fixed.als` next to the model when it finds a
//! repair. The check tool receives the model merged with its property
//! oracle (`<stem>_withOracle.als`) and writes its results into a dedicated
//! output directory: `check.verification` for check runs and five
//! per-classification `.tests` files for generation runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use thiserror::Error;
use tracing::debug;

use relfix_ir::candidate::ModelRef;
use relfix_ir::witness::{render_artifact, Classification, Witness, WitnessError};

use crate::oracle::{
    CheckOracle, CheckOutcome, GenerationOutcome, GenerationRequest, RepairOracle, RepairOutcome,
};
use crate::parse::{assemble_bundle, parse_check_text, parse_witness_file, RawWitnesses};

const VERIFICATION_FILE: &str = "check.verification";
const COUNTEREXAMPLE_FILE: &str = "counterexample.tests";
const UNTRUSTED_POSITIVE_FILE: &str = "untrusted_positive.tests";
const UNTRUSTED_NEGATIVE_FILE: &str = "untrusted_negative.tests";
const TRUSTED_POSITIVE_FILE: &str = "trusted_positive.tests";
const TRUSTED_NEGATIVE_FILE: &str = "trusted_negative.tests";

#[derive(Debug, Error)]
pub enum ProcessOracleError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("oracle executable not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Witness(#[from] WitnessError),
}

/// Repair tool driven as a child process.
pub struct CommandRepairOracle {
    command: String,
    args: Vec<String>,
}

impl CommandRepairOracle {
    pub fn new(command: impl Into<String>) -> Self {
        CommandRepairOracle {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(command: impl Into<String>, args: Vec<String>) -> Self {
        CommandRepairOracle {
            command: command.into(),
            args,
        }
    }
}

impl RepairOracle for CommandRepairOracle {
    type Error = ProcessOracleError;

    fn repair(
        &mut self,
        model: &ModelRef,
        witnesses: &[Witness],
    ) -> Result<RepairOutcome, Self::Error> {
        let witness_path = sibling_with_suffix(model.path(), "_tests.als");
        fs::write(&witness_path, render_artifact(witnesses)?)?;

        // A fix file left over from an earlier lap must not count as a
        // repair for this one.
        let fixed_path = sibling_with_suffix(model.path(), "_fixed.als");
        remove_stale(&fixed_path)?;

        debug!(
            command = %self.command,
            model = %model,
            witnesses = witnesses.len(),
            "invoking repair oracle"
        );
        let output = run_tool(&self.command, &self.args, &[model.path(), &witness_path])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let null_pointer = stderr.contains("NullPointerException")
                || stdout.contains("NullPointerException");
            return Ok(RepairOutcome::Failed {
                message: output_tail(&stderr, &stdout),
                null_pointer,
            });
        }
        if fixed_path.exists() {
            Ok(RepairOutcome::Fixed(ModelRef::new(fixed_path)))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            Ok(RepairOutcome::NoRepair(output_tail(&stderr, &stdout)))
        }
    }
}

/// Check/generation tool driven as a child process.
pub struct CommandCheckOracle {
    command: String,
    args: Vec<String>,
    oracle: PathBuf,
    output_dir: PathBuf,
}

impl CommandCheckOracle {
    /// `oracle` is the property-oracle file merged into every model before
    /// it is handed to the tool; `output_dir` receives the tool's results
    /// and is wiped before each run.
    pub fn new(
        command: impl Into<String>,
        oracle: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        CommandCheckOracle {
            command: command.into(),
            args: Vec::new(),
            oracle: oracle.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn with_args(
        command: impl Into<String>,
        args: Vec<String>,
        oracle: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        CommandCheckOracle {
            command: command.into(),
            args,
            oracle: oracle.into(),
            output_dir: output_dir.into(),
        }
    }

    fn stage_merged_model(&self, model: &ModelRef) -> Result<PathBuf, ProcessOracleError> {
        clean_dir(&self.output_dir)?;
        let merged = sibling_with_suffix(model.path(), "_withOracle.als");
        remove_stale(&merged)?;
        merge_models(model.path(), &self.oracle, &merged)?;
        Ok(merged)
    }

    fn read_witness_file(
        &self,
        name: &str,
        classification: Classification,
    ) -> Result<Vec<Witness>, ProcessOracleError> {
        let path = self.output_dir.join(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(parse_witness_file(&text, classification)?)
    }
}

impl CheckOracle for CommandCheckOracle {
    type Error = ProcessOracleError;

    fn check(&mut self, model: &ModelRef) -> Result<CheckOutcome, Self::Error> {
        let merged = self.stage_merged_model(model)?;
        debug!(command = %self.command, model = %model, "invoking check oracle");
        let output = run_tool(
            &self.command,
            &self.args,
            &[
                Path::new("--mode"),
                Path::new("check"),
                Path::new("--out"),
                &self.output_dir,
                &merged,
            ],
        )?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Ok(CheckOutcome::Failed(output_tail(&stderr, &stdout)));
        }
        let verification = self.output_dir.join(VERIFICATION_FILE);
        let text = match fs::read_to_string(&verification) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(CheckOutcome::Failed(format!(
                    "check run produced no verification file at {}",
                    verification.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(parse_check_text(&text))
    }

    fn generate(
        &mut self,
        model: &ModelRef,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, Self::Error> {
        let merged = self.stage_merged_model(model)?;
        let starting_index = request.starting_index.to_string();
        let mut args: Vec<&Path> = vec![Path::new("--mode"), Path::new("tests")];
        if request.relaxed_facts {
            args.push(Path::new("--relaxed-facts"));
        }
        if request.force_assertions {
            args.push(Path::new("--force-assertions"));
        }
        args.push(Path::new("--starting-index"));
        args.push(Path::new(&starting_index));
        args.push(Path::new("--out"));
        args.push(&self.output_dir);
        args.push(&merged);

        debug!(
            command = %self.command,
            model = %model,
            relaxed_facts = request.relaxed_facts,
            force_assertions = request.force_assertions,
            starting_index = request.starting_index,
            "invoking generation oracle"
        );
        let output = run_tool(&self.command, &self.args, &args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            return Ok(GenerationOutcome::Failed(output_tail(&stderr, &stdout)));
        }
        let raw = RawWitnesses {
            counterexamples: self
                .read_witness_file(COUNTEREXAMPLE_FILE, Classification::Counterexample)?,
            untrusted_positive: self
                .read_witness_file(UNTRUSTED_POSITIVE_FILE, Classification::UntrustedPositive)?,
            untrusted_negative: self
                .read_witness_file(UNTRUSTED_NEGATIVE_FILE, Classification::UntrustedNegative)?,
            trusted_positive: self
                .read_witness_file(TRUSTED_POSITIVE_FILE, Classification::TrustedPositive)?,
            trusted_negative: self
                .read_witness_file(TRUSTED_NEGATIVE_FILE, Classification::TrustedNegative)?,
        };
        Ok(GenerationOutcome::Witnesses(assemble_bundle(raw)?))
    }
}

fn run_tool(command: &str, args: &[String], extra: &[&Path]) -> Result<Output, ProcessOracleError> {
    let mut invocation = Command::new(command);
    invocation.args(args);
    for arg in extra {
        invocation.arg(arg);
    }
    invocation
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProcessOracleError::NotFound(command.to_string())
            } else {
                ProcessOracleError::Io(e)
            }
        })
}

/// Last few lines of tool output, preferring stderr when it has content.
fn output_tail(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.trim().lines().collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}

/// Writes `dest` as `model` followed by a blank line and the oracle text.
pub fn merge_models(model: &Path, oracle: &Path, dest: &Path) -> io::Result<()> {
    let model_text = fs::read_to_string(model)?;
    let oracle_text = fs::read_to_string(oracle)?;
    let mut merged = String::with_capacity(model_text.len() + oracle_text.len() + 2);
    merged.push_str(model_text.trim_end());
    merged.push_str("\n\n");
    merged.push_str(&oracle_text);
    fs::write(dest, merged)
}

/// Creates `dir` if missing and removes everything inside it.
pub fn clean_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("model");
    path.with_file_name(format!("{stem}{suffix}"))
}

fn remove_stale(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

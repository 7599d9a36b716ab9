//! Witness artifacts: classification, branch algebra, and identity.
//!
//! A witness is one test artifact emitted by the check/generation oracle: a
//! predicate, the run command that exercises it, and a trust/polarity
//! classification. Witness identity is content-addressed so that the same
//! semantic test produced by different generation calls (with different
//! indices or surface formatting) deduplicates to a single entry.

use std::fmt;
use std::hash::{Hash, Hasher};

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Marker opening the predicate section of a raw generation-oracle block.
pub const PREDICATE_START_MARKER: &str = "--TEST START";
/// Marker closing the predicate section of a raw generation-oracle block.
pub const PREDICATE_END_MARKER: &str = "--TEST FINISH";

/// Trust/polarity classification of a witness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// A trusted counterexample: the oracle asserts the behavior is wrong.
    Counterexample,
    /// A positive obligation whose expected verdict is not certain.
    UntrustedPositive,
    /// A negative obligation whose expected verdict is not certain.
    UntrustedNegative,
    /// A positive obligation the oracle vouches for.
    TrustedPositive,
    /// A negative obligation the oracle vouches for.
    TrustedNegative,
    /// A user-supplied witness loaded before the search starts.
    Initial,
}

impl Classification {
    /// Marker-line name used in the witness artifact text format.
    pub fn name(&self) -> &'static str {
        match self {
            Classification::Counterexample => "COUNTEREXAMPLE",
            Classification::UntrustedPositive => "UNTRUSTED_POSITIVE",
            Classification::UntrustedNegative => "UNTRUSTED_NEGATIVE",
            Classification::TrustedPositive => "TRUSTED_POSITIVE",
            Classification::TrustedNegative => "TRUSTED_NEGATIVE",
            Classification::Initial => "INITIAL",
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Classification::UntrustedPositive | Classification::TrustedPositive
        )
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            Classification::UntrustedNegative | Classification::TrustedNegative
        )
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum WitnessError {
    #[error("empty witness artifact")]
    EmptyArtifact,
    #[error("predicate not found in witness artifact")]
    MissingPredicate,
    #[error("run command not found in witness artifact")]
    MissingCommand,
    #[error("run command was expected to have 4 words, got {got}: {command:?}")]
    MalformedCommand { command: String, got: usize },
    #[error("run command has no expectation clause: {0:?}")]
    MissingExpectation(String),
    #[error("no index digits in command predicate name: {0:?}")]
    MissingIndex(String),
    #[error("predicate has no body (missing opening brace): {0:?}")]
    MissingBody(String),
    #[error("alternate-branch witness needs at least one variant")]
    NoAlternates,
}

/// Content-addressed witness identity.
///
/// The raw SHA-256 digest over (classification name, expectation clause,
/// normalized predicate body) is used directly as the deduplication key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WitnessKey([u8; 32]);

impl WitnessKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for WitnessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum BranchShape {
    Concrete,
    Alternates(Vec<Witness>),
    Pair {
        positive: Box<Witness>,
        negative: Box<Witness>,
    },
}

/// One test artifact, possibly acting as a branch container.
///
/// A plain witness is a concrete obligation. A witness may instead package
/// several mutually exclusive interpretations of one ambiguous counterexample
/// (an alternate-branch fan-out) or a positive/negative pair of complementary
/// obligations derived from one under-specified predicate; either side of a
/// pair may itself be an alternate-branch fan-out.
#[derive(Debug, Clone)]
pub struct Witness {
    classification: Classification,
    predicate: String,
    command: String,
    index: u32,
    expect_at: usize,
    key: WitnessKey,
    shape: BranchShape,
}

impl Witness {
    /// Builds a concrete witness, validating the command and predicate shape.
    ///
    /// The command must have exactly 4 whitespace-separated words, carry an
    /// `expect` clause, and embed the ordering index as digits in its
    /// predicate-name word. The predicate must have a braced body.
    pub fn new(
        classification: Classification,
        predicate: impl Into<String>,
        command: impl Into<String>,
    ) -> Result<Self, WitnessError> {
        let predicate = predicate.into();
        let command = command.into();
        let words: Vec<&str> = command.split_whitespace().collect();
        if words.len() != 4 {
            return Err(WitnessError::MalformedCommand {
                got: words.len(),
                command,
            });
        }
        let expect_at = command
            .find("expect")
            .ok_or_else(|| WitnessError::MissingExpectation(command.clone()))?;
        let digits: String = words[1].chars().filter(|c| c.is_ascii_digit()).collect();
        let index = digits
            .parse::<u32>()
            .map_err(|_| WitnessError::MissingIndex(command.clone()))?;
        let body = normalized_body(&predicate)?;
        let key = identity_key(classification, &command[expect_at..], &body);
        Ok(Witness {
            classification,
            predicate,
            command,
            index,
            expect_at,
            key,
            shape: BranchShape::Concrete,
        })
    }

    /// Parses one raw artifact block as emitted by the generation oracle.
    ///
    /// The predicate is the text between the start and finish marker lines;
    /// the command is the first line starting with `run`.
    pub fn from_artifact(
        artifact: &str,
        classification: Classification,
    ) -> Result<Self, WitnessError> {
        if artifact.trim().is_empty() {
            return Err(WitnessError::EmptyArtifact);
        }
        let predicate = between_markers(artifact, PREDICATE_START_MARKER, PREDICATE_END_MARKER)
            .ok_or(WitnessError::MissingPredicate)?;
        if predicate.trim().is_empty() {
            return Err(WitnessError::MissingPredicate);
        }
        let command = artifact
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("run ") || *line == "run")
            .ok_or(WitnessError::MissingCommand)?;
        Witness::new(classification, predicate, command)
    }

    /// Wraps mutually exclusive interpretations of one ambiguous witness.
    ///
    /// A single variant is returned as-is; two or more become an
    /// alternate-branch container carrying the first variant's artifact.
    pub fn with_alternates(mut variants: Vec<Witness>) -> Result<Self, WitnessError> {
        match variants.len() {
            0 => Err(WitnessError::NoAlternates),
            1 => variants.pop().ok_or(WitnessError::NoAlternates),
            _ => {
                let mut container = variants[0].clone();
                container.shape = BranchShape::Alternates(variants);
                Ok(container)
            }
        }
    }

    /// Pairs a positive and a negative obligation derived from one predicate.
    pub fn paired(positive: Witness, negative: Witness) -> Self {
        let mut container = positive.clone();
        container.shape = BranchShape::Pair {
            positive: Box::new(positive),
            negative: Box::new(negative),
        };
        container
    }

    pub fn classification(&self) -> Classification {
        self.classification
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Ordering index embedded in the command's predicate-name word.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The `expect ...` suffix of the run command.
    pub fn expectation(&self) -> &str {
        &self.command[self.expect_at..]
    }

    pub fn key(&self) -> WitnessKey {
        self.key
    }

    /// True when this witness packages several mutually exclusive
    /// interpretations of one ambiguous counterexample.
    pub fn is_multiple_branch(&self) -> bool {
        matches!(self.shape, BranchShape::Alternates(_))
    }

    /// The alternate interpretations, when this is a fan-out container.
    pub fn alternate_branches(&self) -> Option<&[Witness]> {
        match &self.shape {
            BranchShape::Alternates(variants) => Some(variants),
            _ => None,
        }
    }

    /// True when this witness must resolve into one positive and one
    /// negative obligation.
    pub fn is_positive_negative_branch(&self) -> bool {
        matches!(self.shape, BranchShape::Pair { .. })
    }

    /// The (positive, negative) obligation pair, when this is a pair
    /// container. Either side may itself be an alternate-branch fan-out.
    pub fn positive_negative_branches(&self) -> Option<(&Witness, &Witness)> {
        match &self.shape {
            BranchShape::Pair { positive, negative } => Some((positive, negative)),
            _ => None,
        }
    }

    /// Number of concrete (non-container) witnesses reachable from this one.
    pub fn concrete_count(&self) -> usize {
        match &self.shape {
            BranchShape::Concrete => 1,
            BranchShape::Alternates(variants) => variants.iter().map(Witness::concrete_count).sum(),
            BranchShape::Pair { positive, negative } => {
                positive.concrete_count() + negative.concrete_count()
            }
        }
    }

    /// Renders this witness in the artifact text format: a classification
    /// marker line, the predicate, then the run command.
    pub fn artifact_block(&self) -> String {
        format!(
            "--{}\n{}\n{}\n",
            self.classification.name(),
            self.predicate,
            self.command
        )
    }
}

impl PartialEq for Witness {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Witness {}

impl Hash for Witness {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(self.key.as_bytes());
    }
}

impl fmt::Display for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.classification.name(),
            self.key,
            self.command
        )
    }
}

/// Renders a witness list in the artifact text format consumed by the
/// repair oracle, blocks separated by blank lines. An empty list is
/// rejected rather than silently rendered as an empty artifact.
pub fn render_artifact(witnesses: &[Witness]) -> Result<String, WitnessError> {
    if witnesses.is_empty() {
        return Err(WitnessError::EmptyArtifact);
    }
    let mut out = String::new();
    for witness in witnesses {
        out.push_str(&witness.artifact_block());
        out.push('\n');
    }
    Ok(out)
}

fn between_markers<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let start_at = text.find(start)? + start.len();
    let rest = &text[start_at..];
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end_at = rest.find(end)?;
    Some(&rest[..end_at])
}

fn normalized_body(predicate: &str) -> Result<String, WitnessError> {
    let start = predicate
        .find('{')
        .ok_or_else(|| WitnessError::MissingBody(predicate.to_string()))?;
    Ok(predicate[start..]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" "))
}

fn identity_key(classification: Classification, expectation: &str, body: &str) -> WitnessKey {
    let mut hasher = Sha256::new();
    hasher.update(classification.name().as_bytes());
    hasher.update(expectation.as_bytes());
    hasher.update(body.as_bytes());
    WitnessKey(hasher.finalize().into())
}

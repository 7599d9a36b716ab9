//! Parsers for the text artifacts exchanged with the external tools.
//!
//! Everything here is pure text-to-value; the process adapters own the
//! filesystem side. Generation output arrives as five per-classification
//! files plus a verification file, and [`assemble_bundle`] turns the raw
//! per-classification lists into the branch-aware groups the search
//! consumes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use thiserror::Error;

use relfix_ir::bundle::WitnessBundle;
use relfix_ir::witness::{Classification, Witness, WitnessError};

use crate::oracle::CheckOutcome;

/// Separator line between witness blocks in generated `.tests` files.
pub const WITNESS_SEPARATOR: &str = "===TEST===";

/// Splits a `.tests` file into witness blocks and parses each one.
/// Blank segments between separators are skipped.
pub fn parse_witness_file(
    text: &str,
    classification: Classification,
) -> Result<Vec<Witness>, WitnessError> {
    let mut witnesses = Vec::new();
    for segment in text.split(WITNESS_SEPARATOR) {
        if segment.trim().is_empty() {
            continue;
        }
        witnesses.push(Witness::from_artifact(segment, classification)?);
    }
    Ok(witnesses)
}

/// Parses the verification file written by a check run.
///
/// Never fails: output that matches no known verdict becomes
/// [`CheckOutcome::Failed`], which the search treats as a fatal oracle
/// error.
pub fn parse_check_text(text: &str) -> CheckOutcome {
    let mut lines = text.lines();
    let first = match lines.next().map(str::trim) {
        Some(line) if !line.is_empty() => line,
        _ => return CheckOutcome::Failed("empty verification output".to_string()),
    };
    if first.starts_with("VALID") {
        return CheckOutcome::Valid;
    }
    if let Some(rest) = first.strip_prefix("INVALID") {
        let counts = parse_pass_counts(rest);
        return CheckOutcome::Invalid {
            passing: counts.map(|(p, _)| p),
            total: counts.map(|(_, t)| t),
        };
    }
    if first.starts_with("EXCEPTION") {
        let message = lines.collect::<Vec<_>>().join("\n");
        let message = if message.trim().is_empty() {
            "oracle reported an exception with no detail".to_string()
        } else {
            message
        };
        return CheckOutcome::Failed(message);
    }
    CheckOutcome::Failed(format!("unrecognized verification output: {first:?}"))
}

/// Parses an optional `(passing/total)` suffix after an INVALID verdict.
fn parse_pass_counts(rest: &str) -> Option<(u32, u32)> {
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    let inner = &rest[open + 1..close];
    let (passing, total) = inner.split_once('/')?;
    Some((passing.trim().parse().ok()?, total.trim().parse().ok()?))
}

/// Per-classification witness lists as read straight from the five
/// generation output files, before any branch grouping.
#[derive(Debug, Clone, Default)]
pub struct RawWitnesses {
    pub counterexamples: Vec<Witness>,
    pub untrusted_positive: Vec<Witness>,
    pub untrusted_negative: Vec<Witness>,
    pub trusted_positive: Vec<Witness>,
    pub trusted_negative: Vec<Witness>,
}

/// Groups raw generation output into the branch-aware bundle the search
/// consumes.
///
/// Counterexamples sharing an ordering index are mutually exclusive
/// interpretations of one ambiguous instance and collapse into an
/// alternate-branch container; a lone counterexample per index is trusted.
/// Untrusted positive/negative witnesses pair up by index into
/// positive/negative containers, with a many-per-index side collapsing into
/// an alternate fan-out first; an unpaired side passes through as-is.
/// Trusted positive/negative witnesses join the trusted group directly.
pub fn assemble_bundle(raw: RawWitnesses) -> Result<WitnessBundle, WitnessError> {
    let max_index = raw
        .counterexamples
        .iter()
        .chain(&raw.untrusted_positive)
        .chain(&raw.untrusted_negative)
        .chain(&raw.trusted_positive)
        .chain(&raw.trusted_negative)
        .map(Witness::index)
        .max()
        .unwrap_or(0);

    let mut bundle = WitnessBundle {
        max_index,
        ..WitnessBundle::default()
    };

    for (_, group) in group_by_index(raw.counterexamples) {
        if group.len() == 1 {
            bundle.trusted_counterexamples.extend(group);
        } else {
            bundle
                .untrusted_counterexamples
                .push(Witness::with_alternates(group)?);
        }
    }

    bundle
        .trusted_counterexamples
        .extend(raw.trusted_positive.into_iter().chain(raw.trusted_negative));

    let mut positives = group_by_index(raw.untrusted_positive);
    let mut negatives = group_by_index(raw.untrusted_negative);
    let indexes: BTreeSet<u32> = positives.keys().chain(negatives.keys()).copied().collect();
    for index in indexes {
        let witness = match (positives.remove(&index), negatives.remove(&index)) {
            (Some(pos), Some(neg)) => Witness::paired(
                Witness::with_alternates(pos)?,
                Witness::with_alternates(neg)?,
            ),
            (Some(side), None) | (None, Some(side)) => Witness::with_alternates(side)?,
            (None, None) => continue,
        };
        bundle.predicates.push(witness);
    }

    Ok(bundle)
}

fn group_by_index(witnesses: Vec<Witness>) -> BTreeMap<u32, Vec<Witness>> {
    let mut groups: BTreeMap<u32, Vec<Witness>> = BTreeMap::new();
    for witness in witnesses {
        groups.entry(witness.index()).or_default().push(witness);
    }
    groups
}

#[derive(Debug, Error)]
pub enum InitialWitnessError {
    #[error("initial witness file must have a .tests extension: {0}")]
    BadExtension(PathBuf),
    #[error("failed to read initial witness file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Witness(#[from] WitnessError),
}

/// Loads user-supplied witnesses from a `.tests` file.
pub fn load_initial_witnesses(path: &Path) -> Result<Vec<Witness>, InitialWitnessError> {
    if path.extension().and_then(|e| e.to_str()) != Some("tests") {
        return Err(InitialWitnessError::BadExtension(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(parse_witness_file(&text, Classification::Initial)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(name: &str, index: u32, body: &str, expect: u32) -> String {
        format!(
            "--TEST START\npred {name}_{index} {{\n{body}\n}}\n--TEST FINISH\nrun {name}_{index} expect {expect}\n"
        )
    }

    fn witness(classification: Classification, name: &str, index: u32, body: &str) -> Witness {
        Witness::from_artifact(&block(name, index, body, 0), classification)
            .expect("artifact should parse")
    }

    #[test]
    fn splits_witness_file_on_separator() {
        let text = format!(
            "{}\n===TEST===\n{}\n===TEST===\n   \n",
            block("cex", 1, "some A", 0),
            block("cex", 2, "no B", 0)
        );
        let parsed = parse_witness_file(&text, Classification::Counterexample)
            .expect("file should parse");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].index(), 1);
        assert_eq!(parsed[1].index(), 2);
    }

    #[test]
    fn check_text_verdicts() {
        assert!(matches!(parse_check_text("VALID\n"), CheckOutcome::Valid));
        assert!(matches!(
            parse_check_text("INVALID\n"),
            CheckOutcome::Invalid {
                passing: None,
                total: None
            }
        ));
        assert!(matches!(
            parse_check_text("INVALID (3/5)\n"),
            CheckOutcome::Invalid {
                passing: Some(3),
                total: Some(5)
            }
        ));
        match parse_check_text("EXCEPTION\nsolver exploded\n") {
            CheckOutcome::Failed(message) => assert!(message.contains("solver exploded")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(matches!(parse_check_text(""), CheckOutcome::Failed(_)));
        assert!(matches!(parse_check_text("MAYBE\n"), CheckOutcome::Failed(_)));
    }

    #[test]
    fn repeated_counterexample_index_becomes_alternate_fanout() {
        let raw = RawWitnesses {
            counterexamples: vec![
                witness(Classification::Counterexample, "cex", 1, "x = A"),
                witness(Classification::Counterexample, "cex", 1, "x = B"),
                witness(Classification::Counterexample, "cex", 2, "some C"),
            ],
            ..RawWitnesses::default()
        };
        let bundle = assemble_bundle(raw).expect("bundle should assemble");
        assert_eq!(bundle.trusted_counterexamples.len(), 1);
        assert_eq!(bundle.trusted_counterexamples[0].index(), 2);
        assert_eq!(bundle.untrusted_counterexamples.len(), 1);
        assert!(bundle.untrusted_counterexamples[0].is_multiple_branch());
        assert_eq!(bundle.max_index, 2);
    }

    #[test]
    fn untrusted_predicates_pair_by_index() {
        let raw = RawWitnesses {
            untrusted_positive: vec![
                witness(Classification::UntrustedPositive, "p", 3, "some A"),
                witness(Classification::UntrustedPositive, "q", 4, "some B"),
            ],
            untrusted_negative: vec![witness(Classification::UntrustedNegative, "p", 3, "no A")],
            ..RawWitnesses::default()
        };
        let bundle = assemble_bundle(raw).expect("bundle should assemble");
        assert_eq!(bundle.predicates.len(), 2);
        assert!(bundle.predicates[0].is_positive_negative_branch());
        // The unpaired positive passes through without a container.
        assert!(!bundle.predicates[1].is_positive_negative_branch());
        assert!(!bundle.predicates[1].is_multiple_branch());
    }

    #[test]
    fn trusted_predicates_join_the_trusted_group() {
        let raw = RawWitnesses {
            trusted_positive: vec![witness(Classification::TrustedPositive, "tp", 5, "some A")],
            trusted_negative: vec![witness(Classification::TrustedNegative, "tn", 6, "no A")],
            ..RawWitnesses::default()
        };
        let bundle = assemble_bundle(raw).expect("bundle should assemble");
        assert_eq!(bundle.trusted_counterexamples.len(), 2);
        assert!(bundle.untrusted_counterexamples.is_empty());
        assert!(bundle.predicates.is_empty());
        assert_eq!(bundle.max_index, 6);
    }

    #[test]
    fn initial_witness_files_must_end_in_tests() {
        let err = load_initial_witnesses(Path::new("suite.als"));
        assert!(matches!(err, Err(InitialWitnessError::BadExtension(_))));
    }
}

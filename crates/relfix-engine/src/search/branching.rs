//! Expansion of ambiguous witnesses into child candidates.
//!
//! Each ambiguous witness contributes a set of choices; the cross product
//! of choices over all witnesses gives the branch combinations, and each
//! non-empty combination becomes one child candidate.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use relfix_ir::candidate::{Candidate, CandidateIds, ModelRef};
use relfix_ir::witness::Witness;

use crate::space::CandidateSpace;

/// How the witnesses being branched are expected to be shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchMode {
    /// Alternate-branch containers: each variant is one choice.
    Alternate,
    /// Positive/negative pairs: each side is one choice, and a side that is
    /// itself an alternate fan-out contributes one choice per variant.
    PositiveNegative,
}

/// Branch expansion produced no combinations at all. This cannot happen
/// with the witness shapes currently constructible; the search aborts if
/// it ever does.
#[derive(Debug, Error)]
#[error("branch expansion produced no combinations")]
pub struct BranchingDefect;

/// The choices a single witness contributes under `mode`.
///
/// A witness whose shape does not match the mode is an anomaly, usually a
/// repeated branch that deduplicated into a concrete witness; it degrades
/// to a single choice so one branch still carries it.
fn branch_choices(witness: &Witness, mode: BranchMode) -> Vec<Witness> {
    match mode {
        BranchMode::Alternate => match witness.alternate_branches() {
            Some(variants) => variants.to_vec(),
            None => {
                warn!(
                    witness = %witness,
                    "witness is not an alternate fan-out, possibly a repeated branch; generating a single branch for it"
                );
                vec![witness.clone()]
            }
        },
        BranchMode::PositiveNegative => match witness.positive_negative_branches() {
            Some((positive, negative)) => {
                let mut choices = flatten(positive);
                choices.extend(flatten(negative));
                choices
            }
            None => {
                warn!(
                    witness = %witness,
                    "witness is not a positive/negative pair, possibly a repeated branch; generating a single branch for it"
                );
                vec![witness.clone()]
            }
        },
    }
}

fn flatten(witness: &Witness) -> Vec<Witness> {
    match witness.alternate_branches() {
        Some(variants) => variants.to_vec(),
        None => vec![witness.clone()],
    }
}

/// Cross product of per-witness choices. An empty witness list yields one
/// empty combination, which callers skip.
pub fn combinations(witnesses: &[Witness], mode: BranchMode) -> Vec<Vec<Witness>> {
    let mut combos: Vec<Vec<Witness>> = vec![Vec::new()];
    for witness in witnesses {
        let choices = branch_choices(witness, mode);
        let mut next = Vec::with_capacity(combos.len() * choices.len());
        for combo in &combos {
            for choice in &choices {
                let mut extended = combo.clone();
                extended.push(choice.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

/// Pushes one child candidate per non-empty combination into `target` and
/// returns how many were created.
///
/// Children restart from the root model: the combination's witnesses join
/// the parent's untrusted set and the next lap re-repairs from scratch
/// under the enlarged witness pool. A child whose cumulative sets add
/// nothing over its parent is dropped with a warning.
pub fn create_branches(
    ids: &mut CandidateIds,
    root_model: &ModelRef,
    parent: &Arc<Candidate>,
    witnesses: &[Witness],
    mode: BranchMode,
    repaired_properties: u32,
    target: &mut CandidateSpace,
) -> Result<usize, BranchingDefect> {
    let combos = combinations(witnesses, mode);
    if combos.is_empty() {
        return Err(BranchingDefect);
    }
    let mut created = 0;
    for combination in combos {
        if combination.is_empty() {
            continue;
        }
        let mut untrusted = parent.untrusted().clone();
        untrusted.extend(combination);
        let candidate = Candidate::descendant(
            root_model.clone(),
            untrusted,
            parent.trusted().clone(),
            Arc::clone(parent),
            ids.next_id(),
        )
        .with_repaired_properties(repaired_properties);
        if candidate.has_local_tests() {
            target.push(Arc::new(candidate));
            created += 1;
        } else {
            warn!(candidate = %candidate, "candidate is invalid (no new witnesses could be added)");
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relfix_ir::witness::Classification;

    fn witness(classification: Classification, name: &str, index: u32, body: &str) -> Witness {
        let artifact = format!(
            "--TEST START\npred {name}_{index} {{\n{body}\n}}\n--TEST FINISH\nrun {name}_{index} expect 0\n"
        );
        Witness::from_artifact(&artifact, classification).expect("artifact should parse")
    }

    fn cex(name: &str, index: u32, body: &str) -> Witness {
        witness(Classification::Counterexample, name, index, body)
    }

    fn fanout(bodies: &[&str], index: u32) -> Witness {
        let variants = bodies.iter().map(|b| cex("cex", index, b)).collect();
        Witness::with_alternates(variants).expect("fanout should build")
    }

    #[test]
    fn alternate_combinations_are_the_cross_product() {
        let first = fanout(&["x = A", "x = B"], 1);
        let second = fanout(&["y = C", "y = D", "y = E"], 2);
        let combos = combinations(&[first, second], BranchMode::Alternate);
        assert_eq!(combos.len(), 6);
        for combo in &combos {
            assert_eq!(combo.len(), 2);
        }
    }

    #[test]
    fn pair_combinations_take_one_side_each() {
        let pair = Witness::paired(
            witness(Classification::UntrustedPositive, "p", 1, "some A"),
            witness(Classification::UntrustedNegative, "p", 1, "no A"),
        );
        let combos = combinations(std::slice::from_ref(&pair), BranchMode::PositiveNegative);
        assert_eq!(combos.len(), 2);
        assert!(combos[0][0].classification().is_positive());
        assert!(combos[1][0].classification().is_negative());
    }

    #[test]
    fn fanout_sides_of_a_pair_flatten_into_choices() {
        let positive_side = Witness::with_alternates(vec![
            witness(Classification::UntrustedPositive, "p", 1, "some A"),
            witness(Classification::UntrustedPositive, "p", 1, "some B"),
        ])
        .expect("fanout should build");
        let pair = Witness::paired(
            positive_side,
            witness(Classification::UntrustedNegative, "p", 1, "no A"),
        );
        let combos = combinations(std::slice::from_ref(&pair), BranchMode::PositiveNegative);
        assert_eq!(combos.len(), 3);
    }

    #[test]
    fn shape_anomalies_degrade_to_a_single_branch() {
        let lone = cex("cex", 1, "some A");
        let combos = combinations(std::slice::from_ref(&lone), BranchMode::Alternate);
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].len(), 1);
        assert_eq!(combos[0][0], lone);
    }

    #[test]
    fn empty_input_yields_one_empty_combination() {
        let combos = combinations(&[], BranchMode::Alternate);
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
    }

    #[test]
    fn branches_join_the_target_space_with_parent_context() {
        use relfix_ir::candidate::WitnessSet;

        let mut ids = CandidateIds::new();
        let model = ModelRef::new("m.als");
        let mut parent_untrusted = WitnessSet::default();
        parent_untrusted.insert(cex("old", 9, "no Z"));
        let parent = Arc::new(Candidate::descendant(
            model.clone(),
            parent_untrusted,
            WitnessSet::default(),
            Arc::new(Candidate::initial(model.clone(), ids.next_id())),
            ids.next_id(),
        ));

        let mut space = CandidateSpace::stack();
        let created = create_branches(
            &mut ids,
            &model,
            &parent,
            &[fanout(&["x = A", "x = B"], 1)],
            BranchMode::Alternate,
            2,
            &mut space,
        )
        .expect("branching succeeds");
        assert_eq!(created, 2);
        assert_eq!(space.len(), 2);

        let child = space.pop().expect("pop");
        assert_eq!(child.depth(), parent.depth() + 1);
        assert_eq!(child.untrusted().len(), 2);
        assert_eq!(child.repaired_properties(), 2);
        assert!(child.has_local_tests());
    }

    #[test]
    fn stale_branches_are_dropped() {
        use relfix_ir::candidate::WitnessSet;

        let mut ids = CandidateIds::new();
        let model = ModelRef::new("m.als");
        let seen = cex("cex", 1, "x = A");
        let mut parent_untrusted = WitnessSet::default();
        parent_untrusted.insert(seen.clone());
        let parent = Arc::new(Candidate::descendant(
            model.clone(),
            parent_untrusted,
            WitnessSet::default(),
            Arc::new(Candidate::initial(model.clone(), ids.next_id())),
            ids.next_id(),
        ));

        let mut space = CandidateSpace::stack();
        // The only choice is a witness the parent already carries.
        let created = create_branches(
            &mut ids,
            &model,
            &parent,
            std::slice::from_ref(&seen),
            BranchMode::Alternate,
            0,
            &mut space,
        )
        .expect("branching succeeds");
        assert_eq!(created, 0);
        assert!(space.is_empty());
    }
}

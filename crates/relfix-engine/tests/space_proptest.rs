//! Randomized checks of the candidate space pop orders.
//!
//! The unit tests in `space` pin the orders on small hand-built inputs;
//! these generate arbitrary priority sequences and compare every pop
//! against a straightforward model of the selection rule.

use std::sync::Arc;

use proptest::collection::vec;
use proptest::prelude::*;

use relfix_engine::space::CandidateSpace;
use relfix_ir::candidate::{Candidate, CandidateIds, ModelRef};

fn candidate(ids: &mut CandidateIds, priority: u32) -> Arc<Candidate> {
    Arc::new(
        Candidate::initial(ModelRef::new("m.als"), ids.next_id())
            .with_repaired_properties(priority),
    )
}

/// Index the selection rule picks from `remaining`, where each entry is
/// (priority, push sequence): the highest priority wins, ties going to the
/// latest push for a stack and the earliest for a queue.
fn expected_pop(remaining: &[(u32, u32)], latest_wins_ties: bool) -> usize {
    let mut best = 0;
    for (index, entry) in remaining.iter().enumerate() {
        let better = entry.0 > remaining[best].0
            || (latest_wins_ties && entry.0 == remaining[best].0 && entry.1 > remaining[best].1);
        if better {
            best = index;
        }
    }
    best
}

proptest! {
    #[test]
    fn plain_spaces_pop_in_push_order(count in 1usize..24) {
        let constructors: [(fn() -> CandidateSpace, bool); 2] =
            [(CandidateSpace::stack, true), (CandidateSpace::queue, false)];
        for (make, reversed) in constructors {
            let mut ids = CandidateIds::new();
            let mut space = make();
            for _ in 0..count {
                space.push(candidate(&mut ids, 0));
            }
            prop_assert_eq!(space.len(), count);

            let popped: Vec<u32> = std::iter::from_fn(|| space.pop().ok())
                .map(|c| c.id().as_u32())
                .collect();
            let mut expected: Vec<u32> = (0..count as u32).collect();
            if reversed {
                expected.reverse();
            }
            prop_assert_eq!(popped, expected);
            prop_assert!(space.is_empty());
        }
    }

    #[test]
    fn prioritized_spaces_follow_the_selection_rule(priorities in vec(0u32..4, 1..24)) {
        let constructors: [(fn() -> CandidateSpace, bool); 2] = [
            (CandidateSpace::priority_stack, true),
            (CandidateSpace::priority_queue, false),
        ];
        for (make, latest_wins_ties) in constructors {
            let mut ids = CandidateIds::new();
            let mut space = make();
            let mut remaining: Vec<(u32, u32)> = Vec::new();
            for (sequence, priority) in priorities.iter().enumerate() {
                space.push(candidate(&mut ids, *priority));
                remaining.push((*priority, sequence as u32));
            }

            while let Ok(popped) = space.pop() {
                let pick = expected_pop(&remaining, latest_wins_ties);
                let (priority, sequence) = remaining.remove(pick);
                prop_assert_eq!(popped.repaired_properties(), priority);
                prop_assert_eq!(popped.id().as_u32(), sequence);
                prop_assert_eq!(space.len(), remaining.len());
            }
            prop_assert!(remaining.is_empty());
        }
    }
}

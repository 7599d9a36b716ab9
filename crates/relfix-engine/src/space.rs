//! The frontier of candidates awaiting evaluation.
//!
//! Four variants share one container: plain stack and queue for
//! depth-first and breadth-first exploration, and a prioritized form of
//! each that pops the candidate with the most repaired properties first,
//! breaking ties the way the underlying order would.

use std::sync::Arc;

use thiserror::Error;

use relfix_ir::candidate::Candidate;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("candidate space is empty")]
pub struct SpaceEmpty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Lifo,
    Fifo,
}

#[derive(Debug)]
pub struct CandidateSpace {
    order: Order,
    prioritized: bool,
    entries: Vec<Arc<Candidate>>,
}

impl CandidateSpace {
    /// Depth-first frontier.
    pub fn stack() -> Self {
        CandidateSpace {
            order: Order::Lifo,
            prioritized: false,
            entries: Vec::new(),
        }
    }

    /// Breadth-first frontier.
    pub fn queue() -> Self {
        CandidateSpace {
            order: Order::Fifo,
            prioritized: false,
            entries: Vec::new(),
        }
    }

    /// Depth-first frontier preferring candidates with more repaired
    /// properties; ties go to the most recently pushed.
    pub fn priority_stack() -> Self {
        CandidateSpace {
            order: Order::Lifo,
            prioritized: true,
            entries: Vec::new(),
        }
    }

    /// Breadth-first frontier preferring candidates with more repaired
    /// properties; ties go to the earliest pushed.
    pub fn priority_queue() -> Self {
        CandidateSpace {
            order: Order::Fifo,
            prioritized: true,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, candidate: Arc<Candidate>) {
        self.entries.push(candidate);
    }

    /// Removes and returns the next candidate to evaluate.
    pub fn pop(&mut self) -> Result<Arc<Candidate>, SpaceEmpty> {
        if self.entries.is_empty() {
            return Err(SpaceEmpty);
        }
        let index = if self.prioritized {
            match self.order {
                // Scanning back to front with a strict comparison keeps the
                // most recently pushed among equal priorities.
                Order::Lifo => {
                    let mut best = self.entries.len() - 1;
                    for i in (0..self.entries.len()).rev() {
                        if self.entries[i].repaired_properties()
                            > self.entries[best].repaired_properties()
                        {
                            best = i;
                        }
                    }
                    best
                }
                // Front to back keeps the earliest among equal priorities.
                Order::Fifo => {
                    let mut best = 0;
                    for i in 0..self.entries.len() {
                        if self.entries[i].repaired_properties()
                            > self.entries[best].repaired_properties()
                        {
                            best = i;
                        }
                    }
                    best
                }
            }
        } else {
            match self.order {
                Order::Lifo => self.entries.len() - 1,
                Order::Fifo => 0,
            }
        };
        Ok(self.entries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

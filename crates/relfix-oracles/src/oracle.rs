//! Oracle traits the search engine is written against.

use relfix_ir::bundle::WitnessBundle;
use relfix_ir::candidate::ModelRef;
use relfix_ir::witness::Witness;

/// Outcome of one repair-oracle invocation.
#[derive(Debug, Clone)]
pub enum RepairOutcome {
    /// The search had no witnesses to hand the oracle, so it was never
    /// invoked. Synthesized by the search loop; adapters never produce it.
    NoTests,
    /// The oracle ran to completion without finding a patch; the message is
    /// the tool's own account of the attempt.
    NoRepair(String),
    /// The oracle produced a patched model.
    Fixed(ModelRef),
    /// The oracle itself failed.
    Failed {
        message: String,
        /// The failure looks like the known crash the search can be
        /// configured to tolerate.
        null_pointer: bool,
    },
}

/// Outcome of checking a model against its property oracle.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// Every property holds; the candidate is a real fix.
    Valid,
    /// At least one property fails. The pass counts are reported when the
    /// oracle provides them.
    Invalid {
        passing: Option<u32>,
        total: Option<u32>,
    },
    /// The oracle could not complete the check.
    Failed(String),
}

/// Outcome of a witness-generation call.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    Witnesses(WitnessBundle),
    Failed(String),
}

/// Flags steering a single witness-generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest {
    /// Relax the model's facts so counterexamples can escape them.
    pub relaxed_facts: bool,
    /// Force witness generation from the assertions even when instance
    /// generation already failed.
    pub force_assertions: bool,
    /// First ordering index the oracle may assign; must stay strictly above
    /// every index handed out by earlier calls.
    pub starting_index: u32,
}

/// Produces candidate patches for a model that violates its properties.
pub trait RepairOracle {
    type Error: std::error::Error;

    /// Runs the oracle on `model` constrained by `witnesses`.
    ///
    /// The witness slice is never empty; the caller short-circuits the
    /// no-witness case without invoking the oracle.
    fn repair(
        &mut self,
        model: &ModelRef,
        witnesses: &[Witness],
    ) -> Result<RepairOutcome, Self::Error>;
}

/// Checks candidate models against the property oracle and generates new
/// witnesses from failed checks.
pub trait CheckOracle {
    type Error: std::error::Error;

    fn check(&mut self, model: &ModelRef) -> Result<CheckOutcome, Self::Error>;

    fn generate(
        &mut self,
        model: &ModelRef,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, Self::Error>;
}

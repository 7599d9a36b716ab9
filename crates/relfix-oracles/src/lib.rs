#![doc = include_str!("../README.md")]
//! The search engine only ever talks to the two oracle traits defined in
//! [`oracle`]; the process adapters in [`process`] are one implementation,
//! test suites supply scripted ones.

pub mod oracle;
pub mod parse;
pub mod process;

pub use oracle::{
    CheckOracle, CheckOutcome, GenerationOutcome, GenerationRequest, RepairOracle, RepairOutcome,
};

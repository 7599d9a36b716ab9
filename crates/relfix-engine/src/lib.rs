#![doc = include_str!("../README.md")]
//! The entry point is [`search::Driver`]: feed it a repair oracle, a check
//! oracle, [`search::SearchOptions`], and a [`report::ReportSink`], then
//! call [`search::Driver::run`] with the model under repair.

pub mod audit;
pub mod report;
pub mod search;
pub mod space;
pub mod trust;

pub use report::{ReportSink, RunReport, Verdict};
pub use search::{Driver, SearchOptions};

#![doc = include_str!("../README.md")]

//! Core data model for the repair search.
//!
//! This crate defines witness artifacts and their branch algebra, the
//! search-tree candidate model, and the classified bundles produced by one
//! generation-oracle call.

pub mod bundle;
pub mod candidate;
pub mod witness;

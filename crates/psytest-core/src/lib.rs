//! psytest-core: scoring engine, answer keys, and report assembly.
//!
//! This crate defines the data model, the three test scorers, the
//! text-generation seam, and the retry policy that the rest of psytest
//! builds on.

pub mod answer_key;
pub mod engine;
pub mod error;
pub mod model;
pub mod ordering;
pub mod parser;
pub mod personality;
pub mod productivity;
pub mod raven;
pub mod report;
pub mod retry;
pub mod traits;

//! Data layer for the billing audit.
//!
//! Discovers and reads the staged input relations, implements the join,
//! aggregation, ranking, discount, variance and growth stages, and runs them
//! as one pipeline.

pub mod aggregator;
pub mod analysis;
pub mod audit;
pub mod discount;
pub mod growth;
pub mod joiner;
pub mod ranker;
pub mod reader;

pub use audit_core as core;

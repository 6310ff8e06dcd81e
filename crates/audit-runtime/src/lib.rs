//! Runtime layer for the billing audit.
//!
//! Runs the two pipelines concurrently over one staged snapshot and writes
//! the versioned output snapshot.

pub mod runner;
pub mod snapshot;

pub use audit_core as core;
pub use audit_data as data;

//! Shared types for the billing audit.
//!
//! Holds the relation model, null-propagating arithmetic, the contractual
//! discount schedule, month helpers, formatting, settings and the error type
//! used by every other crate in the workspace.

pub mod error;
pub mod formatting;
pub mod models;
pub mod nullable;
pub mod pricing;
pub mod settings;
pub mod time_utils;

pub use error::{AuditError, Result};

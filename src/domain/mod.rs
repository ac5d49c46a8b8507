//! Domain layer for the gatekeep quality gate
//!
//! This module contains core business types and the port traits that
//! adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, TransformError};

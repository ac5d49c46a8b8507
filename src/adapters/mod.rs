//! Infrastructure adapters for external systems.

pub mod command;
pub mod fs_pipeline;
pub mod notify;
pub mod sqlite;

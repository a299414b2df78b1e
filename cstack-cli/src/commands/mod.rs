//! CLI command implementations

pub mod batch;
pub mod config;

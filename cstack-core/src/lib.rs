//! cstack Core Library
//!
//! Stack registry resolution and concurrent command dispatch for the cstack
//! compose stack manager.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod registry;
pub mod report;

// Re-export commonly used items
pub use config::Config;
pub use dispatch::{BatchOptions, Dispatcher, Operation, OperationRequest};
pub use error::{CstackError, Result};
pub use registry::{Selection, StackDefinition, StackRegistry, Target, TargetList};
pub use report::{AggregateReport, ExecutionOutcome, OutcomeStatus};

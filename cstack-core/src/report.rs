//! Per-stack outcomes and the aggregated batch report.
//!
//! Workers complete in arbitrary order; the aggregate report restores the
//! original target order so that repeated runs over an unchanged
//! configuration produce byte-identical report ordering.

use std::collections::HashMap;
use std::time::Duration;

/// Process exit code when every target succeeded (or nothing was selected).
pub const EXIT_OK: i32 = 0;
/// Process exit code when any execution failed, timed out, or was cancelled.
pub const EXIT_EXECUTION: i32 = 1;
/// Process exit code when the worst defect is an invalid target configuration.
pub const EXIT_CONFIG: i32 = 2;

/// Terminal status of one stack's invocation within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The engine ran and exited zero.
    Success,
    /// The engine ran and reported a non-zero exit code.
    NonZeroExit(i32),
    /// The engine process could not be started.
    SpawnFailure,
    /// The invocation exceeded the per-stack timeout and was terminated.
    Timeout,
    /// The invocation was cancelled by fail-fast before completing.
    Cancelled,
    /// The target's compose file was missing; nothing was started for it.
    ConfigInvalid,
}

impl OutcomeStatus {
    /// Whether this outcome counts as a success.
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeStatus::Success)
    }

    /// Severity rank, highest is worst.
    ///
    /// Cancelled and Timeout outrank plain failures: they mean the batch did
    /// not complete as intended, which is operationally worse than a single
    /// stack cleanly reporting a non-zero application exit.
    pub fn severity(&self) -> u8 {
        match self {
            OutcomeStatus::Success => 0,
            OutcomeStatus::ConfigInvalid => 1,
            OutcomeStatus::NonZeroExit(_) => 2,
            OutcomeStatus::SpawnFailure => 3,
            OutcomeStatus::Timeout => 4,
            OutcomeStatus::Cancelled => 5,
        }
    }

    /// The engine's exit code, where one exists.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            OutcomeStatus::Success => Some(0),
            OutcomeStatus::NonZeroExit(code) => Some(*code),
            _ => None,
        }
    }

    /// String representation for reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::NonZeroExit(_) => "failed",
            OutcomeStatus::SpawnFailure => "spawn-failure",
            OutcomeStatus::Timeout => "timeout",
            OutcomeStatus::Cancelled => "cancelled",
            OutcomeStatus::ConfigInvalid => "config-invalid",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The terminal result of one stack's invocation.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Stack name.
    pub name: String,
    /// Terminal status.
    pub status: OutcomeStatus,
    /// Captured standard output (may be partial for killed processes).
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Wall-clock duration of the invocation.
    pub duration: Duration,
}

/// The final artifact of a batch: outcomes in target order plus derived
/// overall status and process exit code.
#[derive(Debug, Clone)]
pub struct AggregateReport {
    outcomes: Vec<ExecutionOutcome>,
    overall: OutcomeStatus,
}

impl AggregateReport {
    /// Reassemble the report from unordered completion results.
    ///
    /// `order` is the target list's name sequence. Every dispatched stack
    /// produces exactly one outcome; if a worker vanished without reporting
    /// one (a panic), a failure row is synthesized so the report still
    /// carries every target.
    pub fn assemble(order: &[String], mut outcomes: HashMap<String, ExecutionOutcome>) -> Self {
        let outcomes: Vec<ExecutionOutcome> = order
            .iter()
            .map(|name| {
                outcomes.remove(name).unwrap_or_else(|| ExecutionOutcome {
                    name: name.clone(),
                    status: OutcomeStatus::SpawnFailure,
                    stdout: String::new(),
                    stderr: "worker finished without reporting an outcome".to_string(),
                    duration: Duration::ZERO,
                })
            })
            .collect();
        let overall = outcomes
            .iter()
            .map(|o| o.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(OutcomeStatus::Success);
        Self { outcomes, overall }
    }

    /// Report for an empty target list: overall Success, exit 0.
    pub fn empty() -> Self {
        Self { outcomes: Vec::new(), overall: OutcomeStatus::Success }
    }

    /// Outcomes in target order.
    pub fn outcomes(&self) -> &[ExecutionOutcome] {
        &self.outcomes
    }

    /// Worst severity observed across the batch.
    pub fn overall(&self) -> OutcomeStatus {
        self.overall
    }

    /// Whether nothing was dispatched.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Map the overall status to the process exit code.
    ///
    /// These values are a stable external contract: 0 for success,
    /// [`EXIT_CONFIG`] when the worst defect is a configuration one,
    /// [`EXIT_EXECUTION`] for any execution-class failure.
    pub fn process_exit_code(&self) -> i32 {
        match self.overall {
            OutcomeStatus::Success => EXIT_OK,
            OutcomeStatus::ConfigInvalid => EXIT_CONFIG,
            OutcomeStatus::NonZeroExit(_)
            | OutcomeStatus::SpawnFailure
            | OutcomeStatus::Timeout
            | OutcomeStatus::Cancelled => EXIT_EXECUTION,
        }
    }

    /// Machine-readable report shape.
    pub fn to_json(&self) -> serde_json::Value {
        let stacks: Vec<serde_json::Value> = self
            .outcomes
            .iter()
            .map(|o| {
                serde_json::json!({
                    "name": o.name,
                    "status": o.status.as_str(),
                    "exitCode": o.status.exit_code(),
                    "durationMs": o.duration.as_millis() as u64,
                    "stdout": o.stdout,
                    "stderr": o.stderr,
                })
            })
            .collect();
        serde_json::json!({
            "stacks": stacks,
            "overallStatus": self.overall.as_str(),
            "processExitCode": self.process_exit_code(),
        })
    }
}

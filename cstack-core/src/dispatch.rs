//! Concurrent command dispatch.
//!
//! Executes one compose-engine invocation per selected stack under a bounded
//! worker pool. One stack's failure never aborts another stack's in-flight
//! invocation unless fail-fast is set; every per-stack condition becomes an
//! [`ExecutionOutcome`] rather than a halting fault.

use crate::registry::{Target, TargetList};
use crate::report::{AggregateReport, ExecutionOutcome, OutcomeStatus};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Grace period between SIGTERM and SIGKILL when terminating an invocation.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// How long to keep draining output pipes after a kill. Grandchildren of a
/// killed engine can hold the pipes open indefinitely.
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// Compose lifecycle verb, mapped 1:1 to the underlying engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Up,
    Down,
    Ps,
    Pull,
    Logs,
    Restart,
}

impl Operation {
    /// Engine arguments for this verb.
    ///
    /// `up` detaches and `logs` disables color: batch output is captured in
    /// full, not streamed, so interactive behavior is never wanted here.
    pub fn engine_args(&self) -> &'static [&'static str] {
        match self {
            Operation::Up => &["up", "-d"],
            Operation::Down => &["down"],
            Operation::Ps => &["ps"],
            Operation::Pull => &["pull"],
            Operation::Logs => &["logs", "--no-color"],
            Operation::Restart => &["restart"],
        }
    }

    /// The verb as typed on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Up => "up",
            Operation::Down => "down",
            Operation::Ps => "ps",
            Operation::Pull => "pull",
            Operation::Logs => "logs",
            Operation::Restart => "restart",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully-parsed operation request: the verb plus pass-through arguments.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub operation: Operation,
    /// Extra arguments appended verbatim after the verb.
    pub extra_args: Vec<String>,
}

impl OperationRequest {
    pub fn new(operation: Operation) -> Self {
        Self { operation, extra_args: Vec::new() }
    }

    pub fn with_args(operation: Operation, extra_args: Vec<String>) -> Self {
        Self { operation, extra_args }
    }
}

/// Batch execution knobs.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker pool size, minimum 1.
    pub parallel: usize,
    /// Cancel the remainder of the batch on the first non-success outcome.
    pub fail_fast: bool,
    /// Per-stack invocation ceiling; `None` means no timeout.
    pub timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { parallel: default_parallelism(), fail_fast: false, timeout: None }
    }
}

impl BatchOptions {
    /// Clamp the pool size to at least one worker.
    pub fn with_parallel(mut self, parallel: Option<usize>) -> Self {
        if let Some(n) = parallel {
            self.parallel = n.max(1);
        }
        self
    }
}

/// Default worker pool size: available processing units.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Why an invocation reached its end.
enum TerminalEvent {
    Exited(std::process::ExitStatus),
    WaitFailed(String),
    TimedOut,
    CancelRequested,
}

/// Shared per-batch state, read-only after construction apart from the
/// cancellation flag.
struct BatchContext {
    engine: Vec<String>,
    args: Vec<String>,
    timeout: Option<Duration>,
    fail_fast: bool,
    cancel: watch::Sender<bool>,
}

/// Dispatches one batch of invocations over a target list.
pub struct Dispatcher {
    engine: Vec<String>,
    options: BatchOptions,
}

impl Dispatcher {
    /// Create a dispatcher for a compose engine argv prefix,
    /// e.g. `["docker", "compose"]`.
    pub fn new(engine: Vec<String>, options: BatchOptions) -> Self {
        Self { engine, options }
    }

    /// Run one operation across all targets and aggregate the outcomes.
    ///
    /// Completion order is unconstrained; the report restores target order.
    /// This method always terminates: every worker resolves to a terminal
    /// outcome, modulo external processes that survive SIGKILL.
    pub async fn dispatch(&self, targets: TargetList, request: &OperationRequest) -> AggregateReport {
        if targets.is_empty() {
            return AggregateReport::empty();
        }

        let order: Vec<String> = targets.iter().map(|t| t.stack.name.clone()).collect();
        let (cancel_tx, _cancel_rx) = watch::channel(false);

        let mut args: Vec<String> =
            request.operation.engine_args().iter().map(|s| s.to_string()).collect();
        args.extend(request.extra_args.iter().cloned());

        let ctx = Arc::new(BatchContext {
            engine: self.engine.clone(),
            args,
            timeout: self.options.timeout,
            fail_fast: self.options.fail_fast,
            cancel: cancel_tx,
        });
        let semaphore = Arc::new(Semaphore::new(self.options.parallel.max(1)));

        debug!(
            targets = targets.len(),
            parallel = self.options.parallel,
            fail_fast = self.options.fail_fast,
            operation = %request.operation,
            "dispatching batch"
        );

        let mut workers = JoinSet::new();
        for target in targets {
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(run_target(target, ctx, semaphore));
        }

        let mut outcomes = std::collections::HashMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    outcomes.insert(outcome.name.clone(), outcome);
                }
                Err(e) => warn!("dispatch worker panicked: {}", e),
            }
        }

        AggregateReport::assemble(&order, outcomes)
    }
}

/// Run one target to its terminal outcome. Never returns an error: every
/// failure mode maps to an outcome status.
async fn run_target(
    target: Target,
    ctx: Arc<BatchContext>,
    semaphore: Arc<Semaphore>,
) -> ExecutionOutcome {
    let name = target.stack.name.clone();
    let mut cancel_rx = ctx.cancel.subscribe();

    // Pool admission. Under fail-fast a queued worker records Cancelled
    // without ever spawning.
    let _permit = tokio::select! {
        permit = Arc::clone(&semaphore).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return outcome(&name, OutcomeStatus::Cancelled, "", "", Duration::ZERO),
        },
        _ = cancelled(&mut cancel_rx, ctx.fail_fast) => {
            debug!(stack = %name, "cancelled before start");
            return outcome(&name, OutcomeStatus::Cancelled, "", "", Duration::ZERO);
        }
    };

    if ctx.fail_fast && *cancel_rx.borrow() {
        return outcome(&name, OutcomeStatus::Cancelled, "", "", Duration::ZERO);
    }

    // Targets that failed the compose-file check at resolution time are
    // reported without spawning anything.
    if let Some(reason) = &target.config_error {
        let result = outcome(&name, OutcomeStatus::ConfigInvalid, "", reason, Duration::ZERO);
        finish(&ctx, &result);
        return result;
    }

    let started = Instant::now();
    let mut child = match spawn_engine(&ctx, &target) {
        Ok(child) => child,
        Err(e) => {
            warn!(stack = %name, "failed to spawn engine: {}", e);
            let result = outcome(
                &name,
                OutcomeStatus::SpawnFailure,
                "",
                &e.to_string(),
                started.elapsed(),
            );
            finish(&ctx, &result);
            return result;
        }
    };

    let stdout = drain_pipe(child.stdout.take());
    let stderr = drain_pipe(child.stderr.take());

    let event = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => TerminalEvent::Exited(status),
            Err(e) => TerminalEvent::WaitFailed(e.to_string()),
        },
        _ = expiry(ctx.timeout) => TerminalEvent::TimedOut,
        _ = cancelled(&mut cancel_rx, ctx.fail_fast) => TerminalEvent::CancelRequested,
    };

    let mut wait_error = None;
    let status = match event {
        TerminalEvent::WaitFailed(reason) => {
            warn!(stack = %name, "wait failed: {}", reason);
            wait_error = Some(reason);
            terminate(&mut child).await;
            OutcomeStatus::SpawnFailure
        }
        TerminalEvent::Exited(status) => {
            if status.success() {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::NonZeroExit(status.code().unwrap_or(-1))
            }
        }
        TerminalEvent::TimedOut => {
            debug!(stack = %name, "invocation exceeded timeout, terminating");
            terminate(&mut child).await;
            // Timeout regardless of how the process ends up exiting; the
            // partial output stays attached for diagnostics.
            OutcomeStatus::Timeout
        }
        TerminalEvent::CancelRequested => {
            debug!(stack = %name, "cancellation requested, terminating");
            // The process races termination: if it finished cleanly before
            // the signal took effect its success is kept.
            match terminate(&mut child).await {
                Some(status) if status.success() => OutcomeStatus::Success,
                _ => OutcomeStatus::Cancelled,
            }
        }
    };
    let duration = started.elapsed();

    let graceful = matches!(status, OutcomeStatus::Success | OutcomeStatus::NonZeroExit(_));
    let stdout = collect_pipe(stdout, graceful).await;
    let mut stderr = collect_pipe(stderr, graceful).await;
    if let Some(reason) = wait_error {
        append_reason(&mut stderr, &reason);
    }

    let result = ExecutionOutcome { name, status, stdout, stderr, duration };
    finish(&ctx, &result);
    result
}

/// Build and spawn the engine invocation for one stack.
///
/// The compose file path and its parent directory are bound into the
/// invocation; the engine owns all lifecycle semantics beyond that.
fn spawn_engine(ctx: &BatchContext, target: &Target) -> std::io::Result<Child> {
    let (program, prefix_args) = ctx.engine.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "engine command is empty")
    })?;
    let stack = &target.stack;
    let mut cmd = Command::new(program);
    cmd.args(prefix_args)
        .arg("-f")
        .arg(&stack.path)
        .args(&ctx.args)
        .current_dir(stack.path.parent().unwrap_or(Path::new(".")))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    debug!(stack = %stack.name, engine = %ctx.engine.join(" "), "spawning engine");
    cmd.spawn()
}

/// Flip the shared cancellation flag on the first non-success outcome.
fn finish(ctx: &BatchContext, result: &ExecutionOutcome) {
    if ctx.fail_fast && !result.status.is_success() {
        debug!(stack = %result.name, status = %result.status, "fail-fast triggered");
        ctx.cancel.send_replace(true);
    }
}

/// Resolves when cancellation is signalled; pends forever otherwise.
async fn cancelled(cancel_rx: &mut watch::Receiver<bool>, fail_fast: bool) {
    if !fail_fast {
        std::future::pending::<()>().await;
    }
    // The sender lives in BatchContext for the whole batch, so a closed
    // channel means the batch is over and pending is fine.
    if cancel_rx.wait_for(|&c| c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Resolves when the per-stack timeout expires; pends forever without one.
async fn expiry(timeout: Option<Duration>) {
    match timeout {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending::<()>().await,
    }
}

/// Shorthand for synthesized outcomes that never spawned a process.
fn outcome(
    name: &str,
    status: OutcomeStatus,
    stdout: &str,
    stderr: &str,
    duration: Duration,
) -> ExecutionOutcome {
    ExecutionOutcome {
        name: name.to_string(),
        status,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration,
    }
}

/// Attach a synthesized failure reason to the captured stderr without
/// discarding anything the engine already wrote.
fn append_reason(stderr: &mut String, reason: &str) {
    if !stderr.is_empty() && !stderr.ends_with('\n') {
        stderr.push('\n');
    }
    stderr.push_str(reason);
}

/// Graceful stop: SIGTERM, bounded grace period, then SIGKILL.
///
/// Returns the exit status where one could be collected.
async fn terminate(child: &mut Child) -> Option<std::process::ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid comes from a child we own and have not reaped yet.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }
    match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        _ => {
            let _ = child.kill().await;
            child.try_wait().ok().flatten()
        }
    }
}

type PipeBuffer = Arc<Mutex<Vec<u8>>>;

/// Incrementally drain a child pipe into a shared buffer so that partial
/// output survives a kill.
fn drain_pipe<R>(pipe: Option<R>) -> (PipeBuffer, tokio::task::JoinHandle<()>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let buffer: PipeBuffer = Arc::new(Mutex::new(Vec::new()));
    let writer = Arc::clone(&buffer);
    let handle = tokio::spawn(async move {
        if let Some(mut pipe) = pipe {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => writer.lock().unwrap().extend_from_slice(&chunk[..n]),
                }
            }
        }
    });
    (buffer, handle)
}

/// Collect drained output. After a graceful exit the pipes are read to the
/// end; after a kill the drain is bounded, since orphaned grandchildren can
/// keep the write end open.
async fn collect_pipe(
    (buffer, handle): (PipeBuffer, tokio::task::JoinHandle<()>),
    graceful: bool,
) -> String {
    if graceful {
        let _ = handle.await;
    } else {
        // Partial output is kept either way; on expiry the reader task is
        // dropped and detaches.
        let _ = tokio::time::timeout(OUTPUT_DRAIN, handle).await;
    }
    let bytes = buffer.lock().unwrap().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_args_mapping() {
        assert_eq!(Operation::Up.engine_args(), &["up", "-d"][..]);
        assert_eq!(Operation::Down.engine_args(), &["down"][..]);
        assert_eq!(Operation::Ps.engine_args(), &["ps"][..]);
        assert_eq!(Operation::Pull.engine_args(), &["pull"][..]);
        assert_eq!(Operation::Logs.engine_args(), &["logs", "--no-color"][..]);
        assert_eq!(Operation::Restart.engine_args(), &["restart"][..]);
    }

    #[test]
    fn test_default_parallelism_at_least_one() {
        assert!(default_parallelism() >= 1);
        assert!(BatchOptions::default().parallel >= 1);
    }

    #[test]
    fn test_parallel_clamped_to_one() {
        let options = BatchOptions::default().with_parallel(Some(0));
        assert_eq!(options.parallel, 1);
        let options = BatchOptions::default().with_parallel(Some(8));
        assert_eq!(options.parallel, 8);
    }

    #[test]
    fn test_append_reason_keeps_captured_stderr() {
        let mut stderr = String::from("engine: daemon went away");
        append_reason(&mut stderr, "wait failed: broken pipe");
        assert_eq!(stderr, "engine: daemon went away\nwait failed: broken pipe");

        let mut empty = String::new();
        append_reason(&mut empty, "wait failed: broken pipe");
        assert_eq!(empty, "wait failed: broken pipe");
    }

    #[tokio::test]
    async fn test_empty_target_list_is_nothing_to_do() {
        let dispatcher =
            Dispatcher::new(vec!["true".to_string()], BatchOptions::default());
        let report = dispatcher
            .dispatch(Vec::new(), &OperationRequest::new(Operation::Ps))
            .await;
        assert!(report.is_empty());
        assert!(report.overall().is_success());
        assert_eq!(report.process_exit_code(), 0);
    }
}

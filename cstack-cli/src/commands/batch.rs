//! Batch lifecycle commands: resolve a selection, dispatch the operation
//! concurrently, render the aggregated report.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use cstack_core::report::EXIT_OK;
use cstack_core::{
    AggregateReport, BatchOptions, Config, Dispatcher, Operation, OperationRequest, OutcomeStatus,
    Selection,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

/// Arguments shared by every lifecycle verb.
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Stack names to target (explicit selection overrides `ignored`)
    #[arg(value_name = "STACK", required_unless_present = "all", conflicts_with = "all")]
    pub stacks: Vec<String>,

    /// Target all non-ignored stacks
    #[arg(long)]
    pub all: bool,

    /// Widen --all to include ignored stacks
    #[arg(long, requires = "all")]
    pub include_ignored: bool,

    /// Worker pool size (default: available processing units)
    #[arg(long, value_name = "N")]
    pub parallel: Option<usize>,

    /// Cancel the remainder of the batch on the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Per-stack timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Report output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Extra arguments passed through to the engine verb (after --)
    #[arg(last = true, value_name = "ENGINE_ARGS")]
    pub engine_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Run one lifecycle verb across the selected stacks.
///
/// Returns the process exit code derived from the aggregated report.
pub async fn run(config_path: &Path, operation: Operation, args: BatchArgs) -> Result<i32> {
    let config = Config::load(config_path)?;
    let registry = config.registry()?;

    let selection = if args.all {
        Selection::All { include_ignored: args.include_ignored }
    } else {
        Selection::Names(args.stacks.clone())
    };
    let targets = registry.resolve(&selection)?;
    debug!(operation = %operation, targets = targets.len(), "selection resolved");

    if targets.is_empty() {
        println!("{}", "nothing to do".dimmed());
        return Ok(EXIT_OK);
    }

    let options = BatchOptions {
        fail_fast: args.fail_fast,
        timeout: args.timeout.map(Duration::from_secs),
        ..BatchOptions::default()
    }
    .with_parallel(args.parallel);

    let request = OperationRequest::with_args(operation, args.engine_args.clone());
    let dispatcher = Dispatcher::new(config.engine.clone(), options);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(format!("Running `{}` across {} stack(s)...", operation, targets.len()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let report = dispatcher.dispatch(targets, &request).await;

    spinner.finish_and_clear();

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report.to_json())?),
        OutputFormat::Table => render_report(&report),
    }

    Ok(report.process_exit_code())
}

/// Render the aggregated report as a table plus failure details.
fn render_report(report: &AggregateReport) {
    #[derive(Tabled)]
    struct OutcomeRow {
        #[tabled(rename = "STACK")]
        name: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "EXIT")]
        exit: String,
        #[tabled(rename = "TIME")]
        time: String,
    }

    let rows: Vec<OutcomeRow> = report
        .outcomes()
        .iter()
        .map(|o| OutcomeRow {
            name: o.name.clone(),
            status: colorize_status(o.status),
            exit: o.status.exit_code().map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            time: format_duration(o.duration),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);

    // Captured output of failed stacks, after the table so the summary stays
    // scannable.
    for outcome in report.outcomes().iter().filter(|o| !o.status.is_success()) {
        println!();
        println!("{} {} ({})", "✗".red().bold(), outcome.name.bold(), outcome.status);
        for line in outcome.stdout.lines() {
            println!("  {}", line.dimmed());
        }
        for line in outcome.stderr.lines() {
            println!("  {}", line.red().dimmed());
        }
    }

    println!();
    if report.overall().is_success() {
        println!(
            "{} {} stack(s) succeeded",
            "✓".green().bold(),
            report.outcomes().len()
        );
    } else {
        let failed =
            report.outcomes().iter().filter(|o| !o.status.is_success()).count();
        println!(
            "{} {}/{} stack(s) did not succeed (overall: {})",
            "✗".red().bold(),
            failed,
            report.outcomes().len(),
            colorize_status(report.overall())
        );
    }
}

/// Colorize an outcome status for table display.
fn colorize_status(status: OutcomeStatus) -> String {
    match status {
        OutcomeStatus::Success => status.as_str().green().to_string(),
        OutcomeStatus::NonZeroExit(_) => status.as_str().red().to_string(),
        OutcomeStatus::SpawnFailure => status.as_str().red().bold().to_string(),
        OutcomeStatus::Timeout => status.as_str().yellow().to_string(),
        OutcomeStatus::Cancelled => status.as_str().yellow().to_string(),
        OutcomeStatus::ConfigInvalid => status.as_str().red().to_string(),
    }
}

/// Format a duration as a short human-readable string.
fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}m{}s", millis / 60_000, (millis % 60_000) / 1000)
    }
}

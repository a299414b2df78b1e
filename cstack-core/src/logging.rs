//! Logging initialization.
//!
//! Diagnostics go to stderr through `tracing` so the report table on stdout
//! stays machine-consumable. `RUST_LOG` overrides the verbosity flags.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// The `-v` count maps to warn/info/debug/trace; the default only shows
/// errors. Must be called once at startup.
pub fn init(verbosity: u8) {
    let level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cstack_core={level},cstack_cli={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

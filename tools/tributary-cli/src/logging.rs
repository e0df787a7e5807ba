//! Logging bootstrap.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialise logging for the main process. `-v` occurrences raise the
/// default level; `RUST_LOG` overrides when set.
pub fn init(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();
}

/// Initialise logging for a component worker. Workers log to stderr, which
/// the parent forwards into its own log, so the format stays minimal.
pub fn init_worker() {
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .without_time()
                .with_target(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
}

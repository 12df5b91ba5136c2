//! # Structured Logging
//!
//! `tracing` subscriber for the `mwa` binary. Everything goes to stderr:
//! stdout is reserved for the association URL and the dapp's JSON report,
//! so scripts can pipe one end into the other.
//!
//! `RUST_LOG` overrides the built-in filter, e.g.
//!
//! ```text
//! RUST_LOG=mwa=debug,mwa_protocol=trace mwa dapp
//! ```

use anyhow::{anyhow, Result};
use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Colored, multi-field lines for a terminal.
    Pretty,
    /// One JSON object per line, session spans included.
    Json,
}

/// `RUST_LOG` if set and valid, otherwise `fallback`.
fn session_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(fallback_filter: &str, format: LogFormat) -> Result<()> {
    let registry = tracing_subscriber::registry().with(session_filter(fallback_filter));
    let installed = match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .try_init(),
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {}", e))?;

    tracing::debug!(?format, "logging ready");
    Ok(())
}

//! Logging and observability setup
//!
//! Library crates only emit `tracing` events; the binary calls
//! [`init_tracing`] once at startup. `RUST_LOG` always wins over the
//! built-in filter.

use std::io::IsTerminal;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "execwarden=info,warn";

/// Filter used with `--verbose`.
pub const VERBOSE_FILTER: &str = "execwarden=debug,info";

/// Colored output only when stderr is a terminal and `NO_COLOR` is unset.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Build the effective filter for the given verbosity.
fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Logs go to stderr so that captured child output written to stdout stays
/// machine-readable. Verbose mode adds targets and span-close timings.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(use_color())
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false);

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter(true))
            .with(
                layer
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter(false))
            .with(layer.with_target(false).compact())
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one process invocation.
#[must_use]
pub fn invocation_span(program: &str) -> tracing::Span {
    span!(Level::INFO, "invocation", program = %program)
}

//! Tracing bootstrap for binaries. Logs go to stderr; stdout carries JSON.

use std::io::IsTerminal;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Error, Result};

/// Install the global subscriber.
///
/// `log_level` overrides `RUST_LOG`; both fall back to `info`. Accepts any
/// `EnvFilter` directive, e.g. `retrieval_hybrid=debug,tantivy=warn`.
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> Result<()> {
    let default_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let directive = log_level.unwrap_or(&default_level);

    let env_filter = EnvFilter::try_new(directive)
        .map_err(|e| Error::InvalidConfig(format!("invalid log filter '{directive}': {e}")))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(!no_color && use_color());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::Operation(format!("failed to init logging: {e}")))
}

fn use_color() -> bool { std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal() }

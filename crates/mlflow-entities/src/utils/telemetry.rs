//! Diagnostic logging for the crate itself. Recorded spans go to a
//! [`TraceClient`](crate::trace::TraceClient), never to this subscriber.

use std::sync::OnceLock;
use thiserror::Error;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

/// Directive used when `RUST_LOG` is unset or does not parse.
pub const DEFAULT_LOG_FILTER: &str = "mlflow_entities=debug";

static INSTALLED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("log filter `{directive}` does not parse: {source}")]
    InvalidFilter {
        directive: String,
        #[source]
        source: ParseError,
    },
    #[error("another global subscriber is already installed")]
    AlreadyInstalled(#[from] SetGlobalDefaultError),
}

/// Installs a compact stderr subscriber filtered by `RUST_LOG`, falling back to
/// [`DEFAULT_LOG_FILTER`]. Later calls are no-ops once one has succeeded.
pub fn init_tracing() -> Result<(), TelemetryInitError> {
    init_tracing_with(None)
}

/// Like [`init_tracing`], but `directive` (when given) wins over `RUST_LOG`.
pub fn init_tracing_with(directive: Option<&str>) -> Result<(), TelemetryInitError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = match directive {
        Some(directive) => parse_filter(directive)?,
        None => match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => parse_filter(DEFAULT_LOG_FILTER)?,
        },
    };

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = INSTALLED.set(());
    tracing::debug!("diagnostic logging installed");
    Ok(())
}

fn parse_filter(directive: &str) -> Result<EnvFilter, TelemetryInitError> {
    EnvFilter::try_new(directive).map_err(|source| TelemetryInitError::InvalidFilter {
        directive: directive.to_string(),
        source,
    })
}

/// Cuts `value` to at most `max_chars` characters, on a char boundary.
pub fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((cutoff, _)) => &value[..cutoff],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(parse_filter(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("", 0), "");
    }
}

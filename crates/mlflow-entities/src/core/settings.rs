use smart_default::SmartDefault;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::core::SettingsError;
use crate::trace::{TraceClient, Tracer};

pub const ENV_EXPERIMENT_ID: &str = "MLFLOW_EXPERIMENT_ID";
pub const ENV_TRACE_BUFFER_MAX_SIZE: &str = "MLFLOW_TRACE_BUFFER_MAX_SIZE";
pub const ENV_TRACING_ENABLED: &str = "MLFLOW_TRACING_ENABLED";

#[derive(Debug, Clone, PartialEq, Eq, SmartDefault)]
pub struct TracingSettings {
    /// Experiment that new traces are recorded under.
    #[default("0".to_string())]
    pub experiment_id: String,
    /// How many finished traces the in-memory client keeps.
    #[default(1000)]
    pub max_buffered_traces: usize,
    /// When `false`, traced functions run without recording spans.
    #[default(true)]
    pub enabled: bool,
}

impl TracingSettings {
    /// Defaults overridden by `MLFLOW_*` environment variables.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        if let Some(experiment_id) = lookup(ENV_EXPERIMENT_ID).filter(|v| !v.is_empty()) {
            settings.experiment_id = experiment_id;
        }
        if let Some(raw) = lookup(ENV_TRACE_BUFFER_MAX_SIZE) {
            settings.max_buffered_traces =
                raw.trim()
                    .parse()
                    .map_err(|_| SettingsError::InvalidEnv {
                        var: ENV_TRACE_BUFFER_MAX_SIZE,
                        value: raw.clone(),
                        expected: "non-negative integer",
                    })?;
        }
        if let Some(raw) = lookup(ENV_TRACING_ENABLED) {
            settings.enabled = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(SettingsError::InvalidEnv {
                        var: ENV_TRACING_ENABLED,
                        value: raw,
                        expected: "boolean",
                    });
                }
            };
        }
        Ok(settings)
    }
}

pub static GLOBAL_TRACER: LazyLock<RwLock<Tracer>> = LazyLock::new(|| {
    let settings = TracingSettings::from_env().unwrap_or_else(|err| {
        warn!(error = %err, "ignoring invalid tracing environment");
        TracingSettings::default()
    });
    RwLock::new(Tracer::in_memory(settings))
});

/// Replaces the process-wide tracer with a fresh in-memory one.
pub fn configure(settings: TracingSettings) {
    debug!(?settings, "configuring global tracer");
    *GLOBAL_TRACER
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Tracer::in_memory(settings);
}

/// Sends traces from the process-wide tracer to `client`, keeping its settings.
pub fn configure_client(client: Arc<dyn TraceClient>) {
    let mut tracer = GLOBAL_TRACER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    *tracer = tracer.clone().with_client(client);
}

pub fn global_tracer() -> Tracer {
    GLOBAL_TRACER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let settings = TracingSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, TracingSettings::default());
        assert_eq!(settings.experiment_id, "0");
        assert_eq!(settings.max_buffered_traces, 1000);
        assert!(settings.enabled);
    }

    #[test]
    fn environment_overrides() {
        let settings = TracingSettings::from_lookup(lookup(&[
            (ENV_EXPERIMENT_ID, "42"),
            (ENV_TRACE_BUFFER_MAX_SIZE, " 10 "),
            (ENV_TRACING_ENABLED, "False"),
        ]))
        .unwrap();
        assert_eq!(settings.experiment_id, "42");
        assert_eq!(settings.max_buffered_traces, 10);
        assert!(!settings.enabled);
    }

    #[test]
    fn invalid_buffer_size_is_reported() {
        let err = TracingSettings::from_lookup(lookup(&[(ENV_TRACE_BUFFER_MAX_SIZE, "lots")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "environment variable MLFLOW_TRACE_BUFFER_MAX_SIZE=\"lots\" is not a valid non-negative integer"
        );
    }
}

pub mod telemetry;

pub use telemetry::{
    DEFAULT_LOG_FILTER, TelemetryInitError, init_tracing, init_tracing_with, truncate,
};

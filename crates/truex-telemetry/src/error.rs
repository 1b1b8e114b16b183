//! Telemetry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Logging init failed: {0}")]
    LoggingInit(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;

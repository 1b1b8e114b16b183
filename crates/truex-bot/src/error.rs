//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(#[from] truex_session::SessionError),

    #[error("Book error: {0}")]
    Book(#[from] truex_book::BookError),

    #[error("Feed error: {0}")]
    Feed(#[from] truex_feed::FeedError),

    #[error("Order error: {0}")]
    Order(#[from] truex_orders::OrderError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] truex_telemetry::TelemetryError),

    #[error("Fatal authentication error: {0}")]
    FatalAuth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shutdown requested")]
    Shutdown,
}

pub type AppResult<T> = Result<T, AppError>;

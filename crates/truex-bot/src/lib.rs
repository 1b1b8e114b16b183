//! TrueX market-making data plane.
//!
//! Orchestrates the FIX session, the order book engines, the order
//! manager, and the optional Kraken ingress:
//! - FIX session task owns the transport and sequence numbers
//! - One book engine task per symbol validates and fans out snapshots
//! - The order manager applies execution reports and classifies rejects
//! - Engine events are surfaced to the supervisor loop

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};

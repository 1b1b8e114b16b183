//! Order lifecycle management.
//!
//! Tracks orders from placement to terminal execution report, maps
//! client order ids to exchange order ids, classifies rejects, and emits
//! fills. Outbound message bodies are produced in canonical FIX field
//! order; the session layer owns headers, sequence numbers, and signing.

pub mod error;
pub mod manager;
pub mod report;

pub use error::{OrderError, OrderResult};
pub use manager::{OrderManager, OrderManagerConfig, OutboundOrder};
pub use report::ExecReport;

//! Centralized order book engine.
//!
//! Accepts updates from the FIX market-data demux or any non-FIX feed,
//! normalizes heterogeneous payload shapes into one update type, maintains
//! an authoritative two-sided book per symbol, validates integrity
//! (inversion, volatility), and fans validated snapshots out to subscribers.

pub mod book;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod publisher;

pub use book::{BookConfig, BookState, SideUpdate};
pub use engine::{BookCommand, BookEngine, BookHandle};
pub use error::{BookError, BookResult};
pub use normalize::{normalize_payload, NormalizedUpdate};
pub use publisher::{SubscriberFn, SubscriberRegistry, Subscription};

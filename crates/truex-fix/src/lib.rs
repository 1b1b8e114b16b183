//! FIX 5.0SP2 wire codec for the TrueX session layer.
//!
//! Handles the byte-level protocol only: SOH-delimited framing, body length
//! and checksum arithmetic, canonical field ordering, repeating groups, and
//! the HMAC logon signature. Session semantics (sequence numbers, timers,
//! state) live in `truex-session`.

pub mod codec;
pub mod error;
pub mod fields;
pub mod message;
pub mod signer;

pub use codec::{decode, extract_frame, FrameBuilder, SOH};
pub use error::{FixError, FixResult};
pub use fields::{tags, MsgType};
pub use message::{FixMessage, GroupEntry};
pub use signer::{format_sending_time, sign_password};

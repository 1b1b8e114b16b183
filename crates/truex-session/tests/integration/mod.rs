//! Integration tests for truex-session.
//!
//! These tests drive a real session task against a mock FIX exchange:
//! - Logon round-trip and sequence numbering
//! - TestRequest/Heartbeat exchange
//! - Reconnect with automatic resubscribe
//! - Fatal logout handling

pub mod common;

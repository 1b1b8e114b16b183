//! Session error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connect timed out")]
    ConnectTimeout,

    #[error("Logon not acknowledged within the deadline")]
    LogonTimeout,

    #[error("No response to TestRequest within the grace window")]
    TestRequestTimeout,

    /// Logout text contained "invalid client". Surfaced, never retried.
    #[error("Fatal authentication error: {0}")]
    FatalAuth(String),

    #[error("Reconnect attempts exhausted after {attempts}")]
    ReconnectExhausted { attempts: u32 },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("FIX error: {0}")]
    Fix(#[from] truex_fix::FixError),

    #[error("Session channel closed")]
    ChannelClosed,
}

impl SessionError {
    /// True when the supervisor must stop instead of reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalAuth(_))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

//! FIX codec error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixError {
    /// Frame failed structural validation (body length, delimiters, UTF-8).
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Declared checksum disagrees with the byte sum.
    #[error("Checksum mismatch: declared {declared}, actual {actual}")]
    ChecksumMismatch { declared: u32, actual: u32 },

    /// Tag 35 value outside the supported set.
    #[error("Unknown message type: {0}")]
    UnknownMsgType(String),

    /// A required tag was absent.
    #[error("Missing tag {0}")]
    MissingTag(u32),
}

impl FixError {
    /// Framing errors drop the frame but never the session.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_) | Self::ChecksumMismatch { .. } | Self::UnknownMsgType(_)
        )
    }
}

pub type FixResult<T> = Result<T, FixError>;

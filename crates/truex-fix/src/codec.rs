//! FIX frame encoding and decoding.
//!
//! Outbound frames are built field-by-field in canonical order and wrapped
//! with `8=FIXT.1.1`, `9=<BodyLength>` and `10=<CheckSum>`. BodyLength is
//! the byte count from tag 35 through the SOH preceding tag 10 (exclusive);
//! CheckSum is the byte sum of everything before tag 10, mod 256, rendered
//! as three zero-padded digits.

use crate::error::{FixError, FixResult};
use crate::fields::{tags, MsgType};
use crate::message::FixMessage;

/// FIX field delimiter byte.
pub const SOH: u8 = 0x01;

/// Protocol begin string (tag 8).
pub const BEGIN_STRING: &str = "FIXT.1.1";

/// Checksum trailer is always `10=NNN<SOH>`: 7 bytes.
const TRAILER_LEN: usize = 7;

/// Builder for outbound frames.
///
/// Fields are emitted exactly in the order they are appended; callers are
/// responsible for the canonical body order of each message type.
#[derive(Debug, Clone)]
pub struct FrameBuilder {
    fields: Vec<(u32, String)>,
}

impl FrameBuilder {
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            fields: vec![(tags::MSG_TYPE, msg_type.as_str().to_string())],
        }
    }

    /// Append the standard header fields `49, 56, 34, 52`.
    pub fn header(
        self,
        sender_comp_id: &str,
        target_comp_id: &str,
        msg_seq_num: u64,
        sending_time: &str,
    ) -> Self {
        self.field(tags::SENDER_COMP_ID, sender_comp_id)
            .field(tags::TARGET_COMP_ID, target_comp_id)
            .field(tags::MSG_SEQ_NUM, msg_seq_num.to_string())
            .field(tags::SENDING_TIME, sending_time)
    }

    pub fn field(mut self, tag: u32, value: impl Into<String>) -> Self {
        self.fields.push((tag, value.into()));
        self
    }

    /// Serialize to wire bytes with length prefix and checksum trailer.
    pub fn build(self) -> Vec<u8> {
        let mut body = Vec::with_capacity(256);
        for (tag, value) in &self.fields {
            body.extend_from_slice(tag.to_string().as_bytes());
            body.push(b'=');
            body.extend_from_slice(value.as_bytes());
            body.push(SOH);
        }

        let mut frame = Vec::with_capacity(body.len() + 32);
        frame.extend_from_slice(format!("8={BEGIN_STRING}").as_bytes());
        frame.push(SOH);
        frame.extend_from_slice(format!("9={}", body.len()).as_bytes());
        frame.push(SOH);
        frame.extend_from_slice(&body);

        let checksum: u32 = frame.iter().map(|b| *b as u32).sum();
        frame.extend_from_slice(format!("10={:03}", checksum % 256).as_bytes());
        frame.push(SOH);
        frame
    }
}

/// Scan a read buffer for one complete frame.
///
/// Returns the frame bytes and the number of bytes consumed (including any
/// leading garbage skipped up to the first `8=`). Partial frames return
/// `None` and the caller keeps accumulating.
pub fn extract_frame(buf: &[u8]) -> Option<(Vec<u8>, usize)> {
    let start = find_subsequence(buf, b"8=")?;
    let rest = &buf[start..];

    // Locate the checksum field relative to the frame start.
    let trailer_tag = find_subsequence(rest, b"\x0110=")?;
    let trailer_end = trailer_tag + 1 + TRAILER_LEN;
    if rest.len() < trailer_end {
        return None;
    }

    let frame = rest[..trailer_end].to_vec();
    Some((frame, start + trailer_end))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Decode a complete frame into a [`FixMessage`].
///
/// Checksum and BodyLength are verified; a mismatch drops the frame (the
/// session logs and continues). Unknown tags are preserved.
pub fn decode(frame: &[u8]) -> FixResult<FixMessage> {
    if frame.len() < TRAILER_LEN + 4 || frame.last() != Some(&SOH) {
        return Err(FixError::MalformedFrame("truncated frame".to_string()));
    }

    let trailer_start = frame.len() - TRAILER_LEN;
    if &frame[trailer_start..trailer_start + 3] != b"10=" {
        return Err(FixError::MalformedFrame(
            "frame does not end with checksum field".to_string(),
        ));
    }

    let declared: u32 = std::str::from_utf8(&frame[trailer_start + 3..trailer_start + 6])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| FixError::MalformedFrame("unparseable checksum".to_string()))?;

    let actual: u32 = frame[..trailer_start].iter().map(|b| *b as u32).sum::<u32>() % 256;
    if declared != actual {
        return Err(FixError::ChecksumMismatch { declared, actual });
    }

    let fields = split_fields(&frame[..trailer_start])?;

    // BodyLength covers tag 35 through the SOH before the trailer.
    let (begin, rest) = fields
        .split_first()
        .ok_or_else(|| FixError::MalformedFrame("empty frame".to_string()))?;
    if begin.0 != tags::BEGIN_STRING {
        return Err(FixError::MalformedFrame(format!(
            "frame starts with tag {} instead of 8",
            begin.0
        )));
    }
    let (length_field, body_fields) = rest
        .split_first()
        .ok_or_else(|| FixError::MalformedFrame("missing BodyLength".to_string()))?;
    if length_field.0 != tags::BODY_LENGTH {
        return Err(FixError::MalformedFrame(format!(
            "second field is tag {} instead of 9",
            length_field.0
        )));
    }
    let declared_len: usize = length_field
        .1
        .parse()
        .map_err(|_| FixError::MalformedFrame("unparseable BodyLength".to_string()))?;
    let actual_len: usize = body_fields
        .iter()
        .map(|(t, v)| t.to_string().len() + 1 + v.len() + 1)
        .sum();
    if declared_len != actual_len {
        return Err(FixError::MalformedFrame(format!(
            "BodyLength {declared_len} != actual {actual_len}"
        )));
    }

    Ok(FixMessage::from_fields(fields))
}

fn split_fields(bytes: &[u8]) -> FixResult<Vec<(u32, String)>> {
    let mut fields = Vec::new();
    for raw in bytes.split(|b| *b == SOH) {
        if raw.is_empty() {
            continue;
        }
        let text = std::str::from_utf8(raw)
            .map_err(|_| FixError::MalformedFrame("non-UTF8 field".to_string()))?;
        let (tag, value) = text
            .split_once('=')
            .ok_or_else(|| FixError::MalformedFrame(format!("field without '=': {text}")))?;
        let tag: u32 = tag
            .parse()
            .map_err(|_| FixError::MalformedFrame(format!("non-numeric tag: {tag}")))?;
        fields.push((tag, value.to_string()));
    }
    Ok(fields)
}

//! HMAC logon signature.
//!
//! Every authenticated message carries `Password (554)` computed as
//! `base64(HMAC_SHA256(secret, sending_time || msg_type || msg_seq_num ||
//! sender_comp_id || target_comp_id || username))` with no separators.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use truex_core::Credentials;

type HmacSha256 = Hmac<Sha256>;

/// Format tag 52 `SendingTime`: `YYYYMMDD-HH:MM:SS.sss` in UTC.
pub fn format_sending_time(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d-%H:%M:%S%.3f").to_string()
}

/// Compute the tag 554 password for one outbound message.
pub fn sign_password(
    credentials: &Credentials,
    sending_time: &str,
    msg_type: &str,
    msg_seq_num: u64,
    sender_comp_id: &str,
    target_comp_id: &str,
) -> String {
    let mut mac = HmacSha256::new_from_slice(credentials.secret())
        .expect("HMAC accepts keys of any length");
    mac.update(sending_time.as_bytes());
    mac.update(msg_type.as_bytes());
    mac.update(msg_seq_num.to_string().as_bytes());
    mac.update(sender_comp_id.as_bytes());
    mac.update(target_comp_id.as_bytes());
    mac.update(credentials.username().as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sending_time_format() {
        let at = Utc.with_ymd_and_hms(2025, 10, 6, 14, 30, 0).unwrap();
        assert_eq!(format_sending_time(at), "20251006-14:30:00.000");
    }

    #[test]
    fn test_signature_deterministic() {
        let creds = Credentials::new("USER", "secret-key");
        let a = sign_password(&creds, "20251006-14:30:00.000", "A", 1, "CLI", "TRUEX_UAT_OE");
        let b = sign_password(&creds, "20251006-14:30:00.000", "A", 1, "CLI", "TRUEX_UAT_OE");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_varies_with_inputs() {
        let creds = Credentials::new("USER", "secret-key");
        let base = sign_password(&creds, "20251006-14:30:00.000", "A", 1, "CLI", "TRUEX_UAT_OE");

        let diff_seq =
            sign_password(&creds, "20251006-14:30:00.000", "A", 2, "CLI", "TRUEX_UAT_OE");
        assert_ne!(base, diff_seq);

        let other = Credentials::new("USER", "other-key");
        let diff_key =
            sign_password(&other, "20251006-14:30:00.000", "A", 1, "CLI", "TRUEX_UAT_OE");
        assert_ne!(base, diff_key);
    }

    #[test]
    fn test_signature_concatenation_has_no_separators() {
        // ("A", 12) and ("A1", 2) concatenate to the same payload.
        let creds = Credentials::new("U", "k");
        let a = sign_password(&creds, "t", "A", 12, "S", "T");
        let b = sign_password(&creds, "t", "A1", 2, "S", "T");
        assert_eq!(a, b);
    }
}

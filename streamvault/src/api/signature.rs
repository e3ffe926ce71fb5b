//! EventSub webhook signature verification.
//!
//! Twitch signs `message-id + timestamp + raw body` with HMAC-SHA256
//! over the shared subscription secret and sends the hex digest as
//! `Twitch-Eventsub-Message-Signature: sha256=<hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the expected signature header value.
pub fn compute_signature(secret: &str, message_id: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a delivery's signature in constant time.
pub fn verify_signature(
    secret: &str,
    message_id: &str,
    timestamp: &str,
    body: &[u8],
    provided: &str,
) -> bool {
    let Some(provided_hex) = provided.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(provided_bytes) = hex::decode(provided_hex) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(message_id.as_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(body);
    mac.verify_slice(&provided_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let signature = compute_signature("s3cret", "msg-1", "2025-01-02T10:00:00Z", b"{}");
        assert!(verify_signature(
            "s3cret",
            "msg-1",
            "2025-01-02T10:00:00Z",
            b"{}",
            &signature
        ));
    }

    #[test]
    fn test_rejects_tampered_body() {
        let signature = compute_signature("s3cret", "msg-1", "ts", b"{}");
        assert!(!verify_signature("s3cret", "msg-1", "ts", b"{\"x\":1}", &signature));
    }

    #[test]
    fn test_rejects_wrong_secret() {
        let signature = compute_signature("s3cret", "msg-1", "ts", b"{}");
        assert!(!verify_signature("other", "msg-1", "ts", b"{}", &signature));
    }

    #[test]
    fn test_rejects_malformed_header() {
        assert!(!verify_signature("s3cret", "msg-1", "ts", b"{}", "md5=abc"));
        assert!(!verify_signature("s3cret", "msg-1", "ts", b"{}", "sha256=zz"));
    }
}

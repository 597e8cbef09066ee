//! HMAC-SHA256 signatures used by the payment gateway.
//!
//! Checkout confirmations are signed over `"<gateway order id>|<payment id>"`
//! with the API key secret; webhooks are signed over the raw request body
//! with a separate webhook secret. Both arrive hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `message` under `secret`.
#[must_use]
pub fn sign(secret: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature over `message`.
#[must_use]
pub fn verify(secret: &[u8], message: &[u8], signature_hex: &str) -> bool {
    let Ok(provided) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&provided).is_ok()
}

/// The message a checkout confirmation signs.
#[must_use]
pub fn payment_message(gateway_order_id: &str, payment_id: &str) -> String {
    format!("{gateway_order_id}|{payment_id}")
}

/// Check the signature the checkout widget returns after payment.
#[must_use]
pub fn verify_payment(
    key_secret: &[u8],
    gateway_order_id: &str,
    payment_id: &str,
    signature_hex: &str,
) -> bool {
    verify(
        key_secret,
        payment_message(gateway_order_id, payment_id).as_bytes(),
        signature_hex,
    )
}

/// Check a webhook signature over the exact bytes received.
#[must_use]
pub fn verify_webhook(webhook_secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    verify(webhook_secret, body, signature_hex)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 4231 test case 2.
    #[test]
    fn test_sign_known_vector() {
        assert_eq!(
            sign(b"Jefe", b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_payment_roundtrip() {
        let sig = sign(b"key-secret", payment_message("order_1", "pay_1").as_bytes());
        assert!(verify_payment(b"key-secret", "order_1", "pay_1", &sig));
        assert!(verify_payment(
            b"key-secret",
            "order_1",
            "pay_1",
            &sig.to_uppercase()
        ));
    }

    #[test]
    fn test_verify_payment_rejects_tampering() {
        let sig = sign(b"key-secret", payment_message("order_1", "pay_1").as_bytes());
        assert!(!verify_payment(b"key-secret", "order_1", "pay_2", &sig));
        assert!(!verify_payment(b"key-secret", "order_2", "pay_1", &sig));
        assert!(!verify_payment(b"other-secret", "order_1", "pay_1", &sig));

        let mut flipped = sig.clone();
        flipped.replace_range(0..1, if sig.starts_with('0') { "1" } else { "0" });
        assert!(!verify_payment(b"key-secret", "order_1", "pay_1", &flipped));
    }

    #[test]
    fn test_verify_rejects_malformed_hex() {
        assert!(!verify(b"k", b"m", "not-hex"));
        assert!(!verify(b"k", b"m", ""));
        assert!(!verify(b"k", b"m", "abcd"));
    }

    #[test]
    fn test_verify_webhook_uses_raw_bytes() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign(b"hook-secret", body);
        assert!(verify_webhook(b"hook-secret", body, &sig));
        assert!(!verify_webhook(
            b"hook-secret",
            br#"{"event": "payment.captured"}"#,
            &sig
        ));
    }
}

//! HMAC-SHA256 signatures used by the checkout callback and webhooks.
//!
//! Signatures are lowercase hex. Comparison goes through `Mac::verify_slice`,
//! which is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `message` under `secret`.
pub fn sign(secret: &[u8], message: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(message);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a hex signature of `message`. An empty secret never verifies.
pub fn verify(secret: &[u8], message: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Message signed for a checkout callback.
pub fn payment_message(order_ref: &str, payment_ref: &str) -> String {
    format!("{order_ref}|{payment_ref}")
}

/// Verifies the checkout callback signature.
pub fn verify_payment_signature(secret: &str, order_ref: &str, payment_ref: &str, signature: &str) -> bool {
    verify(
        secret.as_bytes(),
        payment_message(order_ref, payment_ref).as_bytes(),
        signature,
    )
}

/// Verifies a webhook signature over the body bytes exactly as received.
pub fn verify_webhook_signature(raw_body: &[u8], signature: &str, secret: &str) -> bool {
    verify(secret.as_bytes(), raw_body, signature)
}

//! Request signing for outgoing webhooks.
//!
//! Receivers recompute `HMAC-SHA256(secret, raw_body)` and compare it with the
//! `X-Orbit-Signature` header.

use hmac::{Hmac, Mac, digest::InvalidLength};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Orbit-Signature";
pub const EVENT_HEADER: &str = "X-Orbit-Event";
pub const DELIVERY_HEADER: &str = "X-Orbit-Delivery";

/// `sha256=<hex digest>` for the given body.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Constant-time check of a `sha256=` signature header.
pub fn verify(secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Random 32-byte secret, hex encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

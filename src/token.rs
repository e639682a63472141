// ABOUTME: Capability token signing and verification for signed stream links
// ABOUTME: HMAC-SHA256 over "file_id:expires", compared in constant time

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Canonical signed message. No escaping: a `:` inside `file_id` can collide
/// with the delimiter.
fn canonical_message(file_id: &str, expires: &str) -> String {
    format!("{}:{}", file_id, expires)
}

fn mac(secret: &str, file_id: &str, expires: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(canonical_message(file_id, expires).as_bytes());
    Some(mac)
}

/// Hex-encoded signature for a link, as issued by the signing utility
pub fn sign(secret: &str, file_id: &str, expires: &str) -> String {
    match mac(secret, file_id, expires) {
        Some(mac) => hex::encode(mac.finalize().into_bytes()),
        // HMAC accepts keys of any length
        None => String::new(),
    }
}

/// Query string for a link to `file_id` valid for `ttl_secs` from now
pub fn signed_query(secret: &str, file_id: &str, ttl_secs: u64) -> String {
    let expires = unix_now().saturating_add(ttl_secs).to_string();
    let sig = sign(secret, file_id, &expires);
    form_urlencoded::Serializer::new(String::new())
        .append_pair("file_id", file_id)
        .append_pair("expires", &expires)
        .append_pair("sig", &sig)
        .finish()
}

/// Checks `signature` against the expected HMAC. Malformed hex fails closed.
pub fn verify(file_id: &str, expires: &str, signature: &str, secret: &str) -> bool {
    let Ok(provided) = hex::decode(signature.trim()) else {
        return false;
    };
    match mac(secret, file_id, expires) {
        Some(mac) => mac.verify_slice(&provided).is_ok(),
        None => false,
    }
}

/// Zero, non-numeric, or not strictly in the future counts as expired
pub fn is_expired(expires: &str) -> bool {
    is_expired_at(expires, unix_now())
}

fn is_expired_at(expires: &str, now: u64) -> bool {
    match expires.trim().parse::<u64>() {
        Ok(0) | Err(_) => true,
        Ok(exp) => now >= exp,
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

//! Webhook signature verification

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of `body`, as sent in `X-Hub-Signature-256` without the prefix
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return String::new();
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check `header` against the HMAC of the raw, unparsed `body`.
///
/// Accepts the digest with or without a `sha256=` prefix and surrounding
/// whitespace. The comparison is constant time.
pub fn verify(secret: &[u8], body: &[u8], header: &str) -> bool {
    let digest = header.trim();
    let digest = digest.strip_prefix("sha256=").unwrap_or(digest);
    let Ok(expected) = hex::decode(digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

//! Webhook signature verification.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body and sends
//! the hex digest in `X-Hub-Signature-256` as `sha256=<hex>`. Verification
//! runs before the body is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";
const SIGNATURE_LEN: usize = 32;

/// Verifies a webhook signature header against the raw request body.
///
/// An empty secret disables verification and always returns true; the
/// caller is expected to log that opt-out. A missing, malformed, or
/// wrong-length signature is false. The digest comparison is constant-time
/// over fixed 32-byte buffers, so neither a mismatch position nor a length
/// difference shortens the check.
pub fn verify(secret: &str, payload: &[u8], signature_header: Option<&str>) -> bool {
    if secret.is_empty() {
        return true;
    }

    let Some(header) = signature_header else {
        return false;
    };
    let Some(hex_sig) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let claimed = match hex::decode(hex_sig) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    if claimed.len() != SIGNATURE_LEN {
        return false;
    }

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&claimed).is_ok()
}

/// Computes the raw HMAC-SHA256 signature of a payload.
pub fn compute_signature(secret: &str, payload: &[u8]) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a raw signature as a `sha256=<hex>` header value.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(signature))
}

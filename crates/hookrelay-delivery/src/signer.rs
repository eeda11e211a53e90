//! HMAC-SHA256 payload signing and verification.
//!
//! Signatures are computed over the exact bytes put on the wire and carried
//! as `sha256=<hex>` in the signature header. Verification compares in
//! constant time. Secrets never appear in logs or error messages.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Prefix identifying the digest algorithm in the signature header.
pub const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signing key rejected")]
    InvalidKey,
}

/// Computes the signature header value for a payload.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}

/// Checks a signature header value against a payload.
///
/// Accepts only the `sha256=` format produced by [`sign`]. Always runs the
/// comparison in constant time over the decoded digest.
pub fn verify(secret: &str, body: &[u8], signature: &str) -> bool {
    let Some(hex_digest) = signature.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(provided) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    timing_safe_eq(&provided, &expected)
}

/// Constant-time byte comparison. XOR-accumulates so runtime does not
/// depend on where the first difference occurs.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_roundtrips() {
        let secret = "whsec_test_secret";
        let body = br#"{"event":"model.created","id":42}"#;

        let signature = sign(secret, body).unwrap();
        assert!(signature.starts_with(SIGNATURE_PREFIX));
        assert!(verify(secret, body, &signature));
    }

    #[test]
    fn single_byte_tamper_fails_verification() {
        let secret = "whsec_test_secret";
        let body = b"payload bytes".to_vec();
        let signature = sign(secret, &body).unwrap();

        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert!(!verify(secret, &tampered, &signature), "byte {i} tamper passed");
        }
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let body = b"payload";
        let signature = sign("secret-a", body).unwrap();
        assert!(!verify("secret-b", body, &signature));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let body = b"payload";
        let signature = sign("secret", body).unwrap();
        let raw_hex = signature.strip_prefix(SIGNATURE_PREFIX).unwrap();

        assert!(!verify("secret", body, raw_hex));
        assert!(!verify("secret", body, &format!("v1={raw_hex}")));
        assert!(!verify("secret", body, "sha256=not-hex"));
    }

    #[test]
    fn signature_is_deterministic() {
        let a = sign("secret", b"body").unwrap();
        let b = sign("secret", b"body").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn timing_safe_eq_handles_length_mismatch() {
        assert!(!timing_safe_eq(b"abc", b"abcd"));
        assert!(timing_safe_eq(b"abc", b"abc"));
        assert!(!timing_safe_eq(b"abc", b"abd"));
    }
}

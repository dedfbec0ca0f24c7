//! Payload signing for outbound webhooks.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Signs a payload using HMAC-SHA256, hex encoded.
pub fn sign_payload(payload: &[u8], secret: &str) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a signature using constant-time comparison.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    match sign_payload(payload, secret) {
        Ok(expected) => expected.as_bytes().ct_eq(signature.as_bytes()).into(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let payload = br#"{"recipient":"0123456789","message":"paid"}"#;
        let secret = "whsec_123";

        let signature = sign_payload(payload, secret).unwrap();
        assert_eq!(signature.len(), 64);
        assert!(verify_signature(payload, &signature, secret));
        assert!(!verify_signature(payload, &signature, "wrong_secret"));
        assert!(!verify_signature(b"tampered", &signature, secret));
    }

    #[test]
    fn test_signing_is_deterministic() {
        assert_eq!(
            sign_payload(b"body", "k").unwrap(),
            sign_payload(b"body", "k").unwrap()
        );
    }
}

//! Tamper-evident signed assertions over a single field value.
//!
//! Login and signup prove possession of the signing key by signing
//! `timestamp || 0x00 || value`. The timestamp binds the assertion to a
//! moment so the server can reject stale or replayed fields; the client
//! treats it as advisory freshness metadata and never verifies it itself.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::codec::text_to_bytes;
use crate::error::CryptoError;
use crate::keys::SigningKeyPair;

/// A signed assertion over one field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedField {
    /// The asserted value, unchanged.
    pub value: String,
    /// Base64 signature over `timestamp || 0x00 || value`.
    pub signature: String,
    /// Decimal wall-clock milliseconds the signature was produced at.
    pub timestamp: String,
}

/// Sign `value` at the given wall-clock instant.
///
/// The message is the ASCII decimal form of `unix_millis`, one zero byte,
/// then the single-byte wire form of `value`.
pub fn sign_field(
    signing: &SigningKeyPair,
    value: &str,
    unix_millis: u64,
) -> Result<SignedField, CryptoError> {
    let timestamp = unix_millis.to_string();

    let value_bytes = text_to_bytes(value)?;
    let mut message = Vec::with_capacity(timestamp.len() + 1 + value_bytes.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.push(0);
    message.extend_from_slice(&value_bytes);

    let signature = signing.sign(&message)?;

    Ok(SignedField { value: value.to_string(), signature: BASE64.encode(signature), timestamp })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn signed_field_carries_value_and_timestamp() {
        let pair = SigningKeyPair::generate(&mut OsRng, 1024).unwrap();
        let field = sign_field(&pair, "alice", 1_700_000_000_123).unwrap();

        assert_eq!(field.value, "alice");
        assert_eq!(field.timestamp, "1700000000123");

        // Rebuild the signed message the way the server does.
        let mut message = Vec::new();
        message.extend_from_slice(b"1700000000123");
        message.push(0);
        message.extend_from_slice(b"alice");

        let signature = BASE64.decode(&field.signature).unwrap();
        assert!(pair.public().verify(&message, &signature));
    }

    #[test]
    fn signature_is_bound_to_the_timestamp() {
        let pair = SigningKeyPair::generate(&mut OsRng, 1024).unwrap();
        let field = sign_field(&pair, "alice", 1000).unwrap();

        // The same value signed at a different moment must not verify
        // against the original message bytes.
        let mut replayed = Vec::new();
        replayed.extend_from_slice(b"2000");
        replayed.push(0);
        replayed.extend_from_slice(b"alice");

        let signature = BASE64.decode(&field.signature).unwrap();
        assert!(!pair.public().verify(&replayed, &signature));
    }
}

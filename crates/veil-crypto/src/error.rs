//! Crypto error types.

use thiserror::Error;

/// Errors from cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// A PEM envelope is missing its exact header/footer markers or carries
    /// invalid base64 between them.
    #[error("invalid PEM envelope for {kind} key")]
    InvalidPem {
        /// Which envelope failed to parse ("public" or "private").
        kind: &'static str,
    },

    /// A key's binary encoding could not be produced or consumed.
    #[error("key encoding error: {reason}")]
    KeyEncoding {
        /// Description of the codec failure.
        reason: String,
    },

    /// RSA key generation failed.
    #[error("key generation error: {reason}")]
    KeyGeneration {
        /// Description of the generation failure.
        reason: String,
    },

    /// A symmetric key had the wrong length.
    #[error("symmetric key must be {expected} bytes, got {got}")]
    InvalidKeyLength {
        /// Required key size in bytes.
        expected: usize,
        /// Size actually provided.
        got: usize,
    },

    /// An initialization vector had the wrong length.
    #[error("initialization vector must be {expected} bytes, got {got}")]
    InvalidIvLength {
        /// Required IV size in bytes.
        expected: usize,
        /// Size actually provided.
        got: usize,
    },

    /// Message plaintext was empty after trimming whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// Text contains a code point outside the single-byte wire range.
    #[error("text contains unencodable code point U+{code_point:04X}")]
    UnencodableText {
        /// The offending code point.
        code_point: u32,
    },

    /// Symmetric decryption failed (wrong key, damaged ciphertext or IV).
    #[error("decryption failed")]
    DecryptFailed,

    /// Asymmetric wrap of a group key failed.
    #[error("key wrap failed: {reason}")]
    WrapFailed {
        /// Description of the wrap failure.
        reason: String,
    },

    /// Asymmetric unwrap of a group key failed.
    #[error("key unwrap failed")]
    UnwrapFailed,

    /// Producing a signature failed.
    #[error("signing failed: {reason}")]
    SignFailed {
        /// Description of the signing failure.
        reason: String,
    },
}

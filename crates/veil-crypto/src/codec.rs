//! Sealing and opening of chat message bodies.
//!
//! A sealed message is `text bytes || 0x00 || signature(text bytes)`
//! encrypted under the group's AES-256-CBC key with a fresh 16-byte IV.
//! The signature binds the body to the sender's signing key; the zero byte
//! separates it from the text, which therefore must not contain `0x00`
//! itself (no chat text does, and the Latin-1 codec below maps code points
//! 1:1 so no multi-byte sequence can introduce one).
//!
//! # Text encoding
//!
//! Message characters travel one code unit per byte: only code points
//! 0–255 exist on the wire. The wire format is preserved as-is for
//! compatibility; text containing a wider code point is rejected with
//! [`CryptoError::UnencodableText`] rather than silently narrowed.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::error::CryptoError;
use crate::keys::{GroupKey, SigningKeyPair};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of an AES-CBC initialization vector in bytes.
pub const IV_SIZE: usize = 16;

const CIPHER_BLOCK_SIZE: usize = 16;

/// Result of opening a sealed message body.
///
/// The signature, when present, still has to be verified against the
/// sender's signing public key; that step needs a key lookup and lives
/// with the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedMessage {
    /// Decrypted message text.
    pub text: String,
    /// Signature bytes, present iff the plaintext contained a zero byte.
    pub signature: Option<Vec<u8>>,
}

/// Encode text to the single-byte-per-code-unit wire form.
pub fn text_to_bytes(text: &str) -> Result<Vec<u8>, CryptoError> {
    text.chars()
        .map(|c| {
            u8::try_from(u32::from(c))
                .map_err(|_| CryptoError::UnencodableText { code_point: u32::from(c) })
        })
        .collect()
}

/// Decode the single-byte wire form back to text. Total: every byte maps
/// to the code point of the same value.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Seal a message body: sign, frame, and encrypt.
///
/// The plaintext is trimmed first; blank input is rejected with
/// [`CryptoError::EmptyMessage`]. The caller supplies the 16-byte IV so
/// sealing stays deterministic under test.
pub fn seal_message(
    plaintext: &str,
    signing: &SigningKeyPair,
    group_key: &GroupKey,
    iv: &[u8; IV_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let trimmed = plaintext.trim();
    if trimmed.is_empty() {
        return Err(CryptoError::EmptyMessage);
    }

    let text_bytes = text_to_bytes(trimmed)?;
    let signature = signing.sign(&text_bytes)?;

    let mut payload = Vec::with_capacity(text_bytes.len() + 1 + signature.len());
    payload.extend_from_slice(&text_bytes);
    payload.push(0);
    payload.extend_from_slice(&signature);

    let cipher = Aes256CbcEnc::new(group_key.as_bytes().into(), iv.into());
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(&payload))
}

/// Open a sealed message body: decrypt and split at the first zero byte.
///
/// The prefix becomes the message text; the suffix, when a zero byte
/// occurs strictly before the end of the plaintext, is the signature.
/// Any decryption failure collapses to [`CryptoError::DecryptFailed`] —
/// callers record it as per-message state, not as a fatal error.
pub fn open_message(
    ciphertext: &[u8],
    iv: &[u8],
    group_key: &GroupKey,
) -> Result<OpenedMessage, CryptoError> {
    let iv: &[u8; IV_SIZE] = iv
        .try_into()
        .map_err(|_| CryptoError::InvalidIvLength { expected: IV_SIZE, got: iv.len() })?;

    if ciphertext.is_empty() || ciphertext.len() % CIPHER_BLOCK_SIZE != 0 {
        return Err(CryptoError::DecryptFailed);
    }

    let cipher = Aes256CbcDec::new(group_key.as_bytes().into(), iv.into());
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptFailed)?;

    match plaintext.iter().position(|&b| b == 0) {
        Some(split) => Ok(OpenedMessage {
            text: bytes_to_text(&plaintext[..split]),
            signature: Some(plaintext[split + 1..].to_vec()),
        }),
        None => Ok(OpenedMessage { text: bytes_to_text(&plaintext), signature: None }),
    }
}

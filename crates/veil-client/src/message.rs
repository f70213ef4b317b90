//! Decoded message: wire fields plus derived plaintext state.
//!
//! Decryption and verification are per-message outcomes, not errors: one
//! undecryptable message must not sink the batch it arrived in. The
//! derived fields are computed exactly once, when the wire message is
//! decoded, and are plain data afterwards.

use veil_crypto::OpenedMessage;
use veil_proto::Message;

/// A group message after decryption and signature checking.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Server-assigned message id.
    pub id: String,
    /// Group the message belongs to.
    pub group_id: String,
    /// Sender's login.
    pub from_login: String,
    /// Server-side creation stamp, passed through untouched.
    pub created_at: Option<serde_json::Value>,
    /// Raw ciphertext as received.
    pub ciphertext: Vec<u8>,
    /// Initialization vector as received.
    pub iv: Vec<u8>,
    /// Whether decryption succeeded.
    pub decrypted: bool,
    /// Plaintext, when decryption succeeded.
    pub text: Option<String>,
    /// Whether the plaintext carried a signature section.
    pub has_signature: bool,
    /// The raw signature bytes, when a signature section was present.
    pub signature: Option<Vec<u8>>,
    /// Signature check outcome. `None` when there was nothing to check:
    /// decryption failed or the message carried no signature.
    pub verified: Option<bool>,
}

impl DecodedMessage {
    /// A message whose ciphertext did not decrypt. Wire fields are kept;
    /// all derived fields stay empty.
    pub(crate) fn undecrypted(wire: Message) -> Self {
        Self {
            id: wire.id,
            group_id: wire.group_id,
            from_login: wire.from_login,
            created_at: wire.created_at,
            ciphertext: wire.content.data,
            iv: wire.salt.data,
            decrypted: false,
            text: None,
            has_signature: false,
            signature: None,
            verified: None,
        }
    }

    /// A successfully decrypted message with its signature outcome.
    pub(crate) fn decrypted(wire: Message, opened: OpenedMessage, verified: Option<bool>) -> Self {
        let has_signature = opened.signature.is_some();
        Self {
            id: wire.id,
            group_id: wire.group_id,
            from_login: wire.from_login,
            created_at: wire.created_at,
            ciphertext: wire.content.data,
            iv: wire.salt.data,
            decrypted: true,
            text: Some(opened.text),
            has_signature,
            signature: opened.signature,
            verified,
        }
    }
}

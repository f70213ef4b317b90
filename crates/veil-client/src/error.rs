//! Client error types.

use thiserror::Error;
use veil_crypto::CryptoError;

/// Errors from storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Underlying I/O failed.
    #[error("storage I/O error: {reason}")]
    Io {
        /// Description of the I/O failure.
        reason: String,
    },
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io { reason: err.to_string() }
    }
}

/// Errors from the HTTP transport.
///
/// These are network-level failures: the request never produced a server
/// response. A response with a non-2xx status is not a transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request failed before a response arrived.
    #[error("request failed: {reason}")]
    Request {
        /// Description of the network failure.
        reason: String,
    },
}

/// Errors from client operations.
///
/// Per-message decrypt and verify failures are deliberately absent: they
/// are recorded as state on the decoded message, never raised, so a batch
/// fetch survives one bad message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No bearer token is available.
    #[error("not authenticated")]
    NotAuthenticated,

    /// No keystore record exists in memory or durable storage.
    #[error("no keys found")]
    NoKeysFound,

    /// A keystore record exists but cannot be parsed.
    #[error("corrupt key data: {reason}")]
    CorruptKeyData {
        /// Description of the parse failure.
        reason: String,
    },

    /// A message was blank after trimming whitespace.
    #[error("message is empty")]
    EmptyMessage,

    /// No group key is stored for this group.
    #[error("no key for group {group_id}")]
    UnknownGroup {
        /// The group without a local key.
        group_id: String,
    },

    /// The server answered with a non-2xx status.
    #[error("server rejected request ({status}): {body}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Raw server-provided body text.
        body: String,
    },

    /// A 2xx response body did not have the expected shape.
    #[error("malformed server response: {reason}")]
    InvalidResponse {
        /// Description of the parse failure.
        reason: String,
    },

    /// Network-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Durable storage failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Cryptographic operation failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Invariant violation inside the engine.
    #[error("internal error: {reason}")]
    Internal {
        /// Description of the violated invariant.
        reason: String,
    },
}

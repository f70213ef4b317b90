//! Veil Cryptographic Primitives
//!
//! This crate provides the cryptographic building blocks for the Veil
//! messaging client.
//!
//! # Design
//!
//! All functions in this crate are pure - they have no side effects and
//! produce deterministic outputs given the same inputs. Random input
//! (initialization vectors, OAEP padding, key generation) is provided by
//! the caller, enabling:
//!
//! - Deterministic testing with fixed IVs and seeded RNG
//! - No coupling to application-level abstractions
//!
//! # Primitives
//!
//! - RSA-PKCS#1 v1.5 / SHA-256 signatures for identity proofs and message
//!   authentication
//! - RSA-OAEP / SHA-256 for wrapping group keys inside invitations
//! - AES-256-CBC for group message bodies

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod error;
pub mod keys;
pub mod signed;

/// Re-export of the RNG traits key generation and wrapping expect, so
/// callers do not need a direct `rsa` dependency to supply entropy.
pub use rsa::rand_core;

pub use codec::{IV_SIZE, OpenedMessage, bytes_to_text, open_message, seal_message, text_to_bytes};
pub use error::CryptoError;
pub use keys::{
    DEFAULT_RSA_BITS, EncryptionKeyPair, EncryptionPublicKey, GROUP_KEY_SIZE, GroupKey,
    SigningKeyPair, SigningPublicKey,
};
pub use signed::{SignedField, sign_field};

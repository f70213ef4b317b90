//! Veil Client Engine
//!
//! The client side of the Veil end-to-end encrypted group messenger:
//! identity and key management, the challenge-response authentication
//! flow, sealed group messaging, key exchange through invitations, and
//! the long-poll event stream.
//!
//! # Architecture
//!
//! - [`KeyStore`] owns all key material over a pluggable [`Keyring`]
//! - [`AuthSession`] owns the bearer token and runs the per-request
//!   challenge handshake through a serializing [`queue`](crate::queue)
//! - [`ChatClient`] implements the chat operations on top of the session
//! - [`EventStream`] fans server events out to subscribers
//!
//! Network and storage sit behind the [`HttpTransport`] and [`Keyring`]
//! traits; time and randomness behind [`Environment`]. Production wires
//! in [`ReqwestTransport`], [`FsKeyring`] and [`SystemEnv`]; tests swap
//! all three for deterministic substitutes.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod client;
pub mod env;
pub mod error;
pub mod events;
pub mod keyring;
pub mod keystore;
pub mod message;
pub mod queue;
pub mod session;
pub mod transport;

pub use client::ChatClient;
pub use env::{Environment, SystemEnv};
pub use error::{ClientError, StorageError, TransportError};
pub use events::{ChatEvent, EventStream};
pub use keyring::{FsKeyring, Keyring, MemoryKeyring};
pub use keystore::{KeyBundle, KeyStore, PeerKeys};
pub use message::DecodedMessage;
pub use queue::RequestQueue;
pub use session::AuthSession;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};

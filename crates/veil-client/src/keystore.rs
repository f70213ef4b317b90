//! Local key material: the key bundle and its durable record.
//!
//! [`KeyStore`] is the single owner of all cryptographic material. Every
//! mutation goes through one of its operations, which update the resident
//! [`KeyBundle`] snapshot and re-persist the whole bundle in one write -
//! there are no partial updates of the durable record.
//!
//! The durable encoding is a JSON document with PEM-wrapped asymmetric
//! keys and base64 symmetric keys, byte-compatible with the archive files
//! users move between devices:
//!
//! ```json
//! {
//!   "signKeyPair":    {"publicKey": "-----BEGIN ...", "privateKey": "..."},
//!   "messageKeyPair": {"publicKey": "...", "privateKey": "..."},
//!   "users":  {"bob": {"signPublicKey": "...", "messagePublicKey": "..."}},
//!   "groups": {"g1": {"key": "<base64>"}}
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use veil_crypto::rand_core::CryptoRngCore;
use veil_crypto::{
    EncryptionKeyPair, EncryptionPublicKey, GroupKey, SigningKeyPair, SigningPublicKey,
};

use crate::error::ClientError;
use crate::keyring::Keyring;

/// Cached public keys of a remote user.
///
/// Trust-on-first-use: once cached, an entry is never overwritten.
#[derive(Debug, Clone)]
pub struct PeerKeys {
    /// The peer's signing public key, for verifying message signatures.
    pub signing: SigningPublicKey,
    /// The peer's encryption public key, for wrapping group keys.
    pub encryption: EncryptionPublicKey,
}

/// The complete local key material.
///
/// The two identity pairs are plain fields, so the atomic-identity
/// invariant (signing and encryption pair both present or both absent)
/// holds by construction.
#[derive(Debug, Clone)]
pub struct KeyBundle {
    /// Identity signing pair.
    pub signing: SigningKeyPair,
    /// Identity encryption pair.
    pub encryption: EncryptionKeyPair,
    /// Cached peer public keys, keyed by login.
    pub peers: BTreeMap<String, PeerKeys>,
    /// Group keys, keyed by group id.
    pub groups: BTreeMap<String, GroupKey>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPair {
    public_key: String,
    private_key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredPeer {
    sign_public_key: String,
    message_public_key: String,
}

#[derive(Serialize, Deserialize)]
struct StoredGroup {
    key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBundle {
    sign_key_pair: StoredPair,
    message_key_pair: StoredPair,
    #[serde(default)]
    users: BTreeMap<String, StoredPeer>,
    #[serde(default)]
    groups: BTreeMap<String, StoredGroup>,
}

fn corrupt(reason: impl std::fmt::Display) -> ClientError {
    ClientError::CorruptKeyData { reason: reason.to_string() }
}

impl KeyBundle {
    /// Generate a fresh identity: new signing and encryption pairs, no
    /// groups, no peers.
    pub fn generate(rng: &mut impl CryptoRngCore, bits: usize) -> Result<Self, ClientError> {
        Ok(Self {
            signing: SigningKeyPair::generate(rng, bits)?,
            encryption: EncryptionKeyPair::generate(rng, bits)?,
            peers: BTreeMap::new(),
            groups: BTreeMap::new(),
        })
    }

    /// Serialize to the durable JSON record.
    pub fn to_record(&self) -> Result<String, ClientError> {
        let mut users = BTreeMap::new();
        for (login, peer) in &self.peers {
            users.insert(
                login.clone(),
                StoredPeer {
                    sign_public_key: peer.signing.to_pem()?,
                    message_public_key: peer.encryption.to_pem()?,
                },
            );
        }

        let groups = self
            .groups
            .iter()
            .map(|(id, key)| (id.clone(), StoredGroup { key: key.to_base64() }))
            .collect();

        let stored = StoredBundle {
            sign_key_pair: StoredPair {
                public_key: self.signing.public_pem()?,
                private_key: self.signing.private_pem()?,
            },
            message_key_pair: StoredPair {
                public_key: self.encryption.public_pem()?,
                private_key: self.encryption.private_pem()?,
            },
            users,
            groups,
        };

        serde_json::to_string(&stored)
            .map_err(|e| ClientError::Internal { reason: e.to_string() })
    }

    /// Parse the durable JSON record back into live key handles.
    ///
    /// Any malformation - bad JSON, a PEM envelope without its markers, a
    /// truncated key - surfaces as [`ClientError::CorruptKeyData`].
    pub fn from_record(record: &str) -> Result<Self, ClientError> {
        let stored: StoredBundle = serde_json::from_str(record).map_err(corrupt)?;

        let signing = SigningKeyPair::from_pems(
            &stored.sign_key_pair.public_key,
            &stored.sign_key_pair.private_key,
        )
        .map_err(corrupt)?;
        let encryption = EncryptionKeyPair::from_pems(
            &stored.message_key_pair.public_key,
            &stored.message_key_pair.private_key,
        )
        .map_err(corrupt)?;

        let mut peers = BTreeMap::new();
        for (login, peer) in stored.users {
            peers.insert(
                login,
                PeerKeys {
                    signing: SigningPublicKey::from_pem(&peer.sign_public_key)
                        .map_err(corrupt)?,
                    encryption: EncryptionPublicKey::from_pem(&peer.message_public_key)
                        .map_err(corrupt)?,
                },
            );
        }

        let mut groups = BTreeMap::new();
        for (id, group) in stored.groups {
            groups.insert(id, GroupKey::from_base64(&group.key).map_err(corrupt)?);
        }

        Ok(Self { signing, encryption, peers, groups })
    }
}

/// Single owner of the local [`KeyBundle`].
///
/// Holds the resident bundle behind one mutex: the lock is the single
/// mutation path, and every mutation re-persists the whole snapshot
/// before releasing it.
pub struct KeyStore {
    keyring: Arc<dyn Keyring>,
    bundle: Mutex<Option<KeyBundle>>,
}

impl KeyStore {
    /// Create a store over the given keyring. Nothing is loaded until an
    /// operation needs key material.
    pub fn new(keyring: Arc<dyn Keyring>) -> Self {
        Self { keyring, bundle: Mutex::new(None) }
    }

    /// True iff a bundle is resident in memory or a record is recoverable
    /// from durable storage. Does not trigger a full load.
    pub async fn has_identity(&self) -> Result<bool, ClientError> {
        if self.bundle.lock().await.is_some() {
            return Ok(true);
        }
        Ok(self.keyring.load_keys()?.is_some())
    }

    /// Force a (re)load of the durable record into live key handles.
    pub async fn load(&self) -> Result<(), ClientError> {
        let mut guard = self.bundle.lock().await;
        *guard = Some(self.load_record()?);
        Ok(())
    }

    fn load_record(&self) -> Result<KeyBundle, ClientError> {
        let record = self.keyring.load_keys()?.ok_or(ClientError::NoKeysFound)?;
        KeyBundle::from_record(&record)
    }

    /// Lock the bundle, loading it from storage on first use.
    async fn loaded(&self) -> Result<MutexGuard<'_, Option<KeyBundle>>, ClientError> {
        let mut guard = self.bundle.lock().await;
        if guard.is_none() {
            *guard = Some(self.load_record()?);
        }
        Ok(guard)
    }

    fn persist(&self, bundle: &KeyBundle) -> Result<(), ClientError> {
        self.keyring.store_keys(&bundle.to_record()?)?;
        Ok(())
    }

    /// Install a bundle as the identity, persisting it immediately.
    pub async fn install(&self, bundle: KeyBundle) -> Result<(), ClientError> {
        let mut guard = self.bundle.lock().await;
        self.persist(&bundle)?;
        *guard = Some(bundle);
        Ok(())
    }

    /// Re-persist the resident bundle.
    pub async fn save(&self) -> Result<(), ClientError> {
        let guard = self.bundle.lock().await;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        self.persist(bundle)
    }

    /// Drop the resident bundle and remove the durable record.
    pub async fn clear(&self) -> Result<(), ClientError> {
        let mut guard = self.bundle.lock().await;
        self.keyring.clear_keys()?;
        *guard = None;
        Ok(())
    }

    /// Clone of the identity signing pair.
    pub async fn signing_keys(&self) -> Result<SigningKeyPair, ClientError> {
        let guard = self.loaded().await?;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        Ok(bundle.signing.clone())
    }

    /// PEM envelopes of the identity public keys: `(signing, encryption)`.
    pub async fn identity_public_pems(&self) -> Result<(String, String), ClientError> {
        let guard = self.loaded().await?;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        Ok((bundle.signing.public_pem()?, bundle.encryption.public_pem()?))
    }

    /// The symmetric key for a group.
    pub async fn group_key(&self, group_id: &str) -> Result<GroupKey, ClientError> {
        let guard = self.loaded().await?;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        bundle
            .groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownGroup { group_id: group_id.to_string() })
    }

    /// Store a group's symmetric key and re-persist the bundle.
    pub async fn insert_group_key(
        &self,
        group_id: &str,
        key: GroupKey,
    ) -> Result<(), ClientError> {
        let mut guard = self.loaded().await?;
        let bundle = guard.as_mut().ok_or(ClientError::NoKeysFound)?;
        bundle.groups.insert(group_id.to_string(), key);
        self.persist(bundle)
    }

    /// Cached public keys for a peer, if any.
    pub async fn peer_keys(&self, login: &str) -> Result<Option<PeerKeys>, ClientError> {
        let guard = self.loaded().await?;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        Ok(bundle.peers.get(login).cloned())
    }

    /// Cache a peer's public keys on first sight.
    ///
    /// Append-only: an existing entry is left untouched, so a later
    /// (possibly hostile) directory answer cannot displace the keys that
    /// were trusted first.
    pub async fn cache_peer_keys(&self, login: &str, keys: PeerKeys) -> Result<(), ClientError> {
        let mut guard = self.loaded().await?;
        let bundle = guard.as_mut().ok_or(ClientError::NoKeysFound)?;
        if !bundle.peers.contains_key(login) {
            bundle.peers.insert(login.to_string(), keys);
        }
        self.persist(bundle)
    }

    /// Unwrap an invitation payload with the identity encryption key.
    pub async fn unwrap_group_key(&self, wrapped: &[u8]) -> Result<GroupKey, ClientError> {
        let guard = self.loaded().await?;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        Ok(GroupKey::unwrap_with(wrapped, &bundle.encryption)?)
    }

    /// Serialize the keystore to a portable archive.
    pub async fn export_archive(&self) -> Result<Vec<u8>, ClientError> {
        let guard = self.loaded().await?;
        let bundle = guard.as_ref().ok_or(ClientError::NoKeysFound)?;
        Ok(bundle.to_record()?.into_bytes())
    }

    /// Import a portable archive, replacing the current keystore.
    ///
    /// All-or-nothing: the archive is parsed before anything is touched,
    /// so a malformed archive leaves the previous keystore fully intact.
    /// On success the previous durable record, when one existed, is
    /// returned so the caller can keep it (it is never silently
    /// discarded).
    pub async fn import_archive(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>, ClientError> {
        let record = std::str::from_utf8(bytes).map_err(corrupt)?;

        let mut guard = self.bundle.lock().await;
        let displaced = self.keyring.load_keys()?;

        let bundle = KeyBundle::from_record(record)?;
        self.keyring.store_keys(record)?;
        *guard = Some(bundle);

        Ok(displaced.map(String::into_bytes))
    }
}

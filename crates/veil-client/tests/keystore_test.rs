//! Keystore persistence: record round-trips, archive import semantics,
//! and the trust-on-first-use peer cache.

#![allow(clippy::unwrap_used, clippy::panic)]

mod support;

use std::sync::Arc;

use rand::rngs::OsRng;
use support::TEST_RSA_BITS;
use veil_client::{ClientError, KeyBundle, KeyStore, Keyring, MemoryKeyring, PeerKeys};
use veil_crypto::GroupKey;

fn bundle() -> KeyBundle {
    KeyBundle::generate(&mut OsRng, TEST_RSA_BITS).unwrap()
}

fn store() -> (MemoryKeyring, KeyStore) {
    let keyring = MemoryKeyring::new();
    (keyring.clone(), KeyStore::new(Arc::new(keyring)))
}

#[tokio::test]
async fn record_roundtrip_preserves_all_sections() {
    let mut original = bundle();
    original.groups.insert("g1".to_string(), GroupKey::new([7; 32]));
    let peer = bundle();
    original.peers.insert(
        "bob".to_string(),
        PeerKeys {
            signing: peer.signing.public().clone(),
            encryption: peer.encryption.public().clone(),
        },
    );

    let restored = KeyBundle::from_record(&original.to_record().unwrap()).unwrap();

    assert_eq!(
        restored.signing.public_pem().unwrap(),
        original.signing.public_pem().unwrap()
    );
    assert_eq!(restored.groups["g1"].as_bytes(), &[7; 32]);
    assert_eq!(
        restored.peers["bob"].signing.to_pem().unwrap(),
        peer.signing.public_pem().unwrap()
    );

    // The restored private key still signs for the original public key.
    let signature = restored.signing.sign(b"probe").unwrap();
    assert!(original.signing.public().verify(b"probe", &signature));
}

#[tokio::test]
async fn load_without_a_record_is_no_keys_found() {
    let (_, store) = store();
    assert!(!store.has_identity().await.unwrap());
    assert_eq!(store.signing_keys().await.unwrap_err(), ClientError::NoKeysFound);
}

#[tokio::test]
async fn corrupt_record_is_surfaced_as_such() {
    let (keyring, store) = store();
    keyring.store_keys("{\"signKeyPair\": 42}").unwrap();

    let err = store.signing_keys().await.unwrap_err();
    assert!(matches!(err, ClientError::CorruptKeyData { .. }));
}

#[tokio::test]
async fn mutations_are_persisted_immediately() {
    let (keyring, store) = store();
    store.install(bundle()).await.unwrap();
    store.insert_group_key("g1", GroupKey::new([9; 32])).await.unwrap();

    // A second store over the same keyring sees the mutation.
    let other = KeyStore::new(Arc::new(keyring));
    assert_eq!(other.group_key("g1").await.unwrap().as_bytes(), &[9; 32]);

    let err = other.group_key("g2").await.unwrap_err();
    assert_eq!(err, ClientError::UnknownGroup { group_id: "g2".to_string() });
}

#[tokio::test]
async fn peer_cache_is_append_only() {
    let (_, store) = store();
    store.install(bundle()).await.unwrap();

    let first = bundle();
    let second = bundle();
    let keys_of = |b: &KeyBundle| PeerKeys {
        signing: b.signing.public().clone(),
        encryption: b.encryption.public().clone(),
    };

    store.cache_peer_keys("bob", keys_of(&first)).await.unwrap();
    store.cache_peer_keys("bob", keys_of(&second)).await.unwrap();

    let cached = store.peer_keys("bob").await.unwrap().unwrap();
    assert_eq!(cached.signing.to_pem().unwrap(), first.signing.public_pem().unwrap());
}

#[tokio::test]
async fn import_replaces_and_returns_the_displaced_archive() {
    let (_, store) = store();
    let old = bundle();
    let old_pem = old.signing.public_pem().unwrap();
    store.install(old).await.unwrap();

    let incoming = bundle();
    let archive = incoming.to_record().unwrap().into_bytes();

    let displaced = store.import_archive(&archive).await.unwrap().unwrap();
    let displaced = KeyBundle::from_record(std::str::from_utf8(&displaced).unwrap()).unwrap();
    assert_eq!(displaced.signing.public_pem().unwrap(), old_pem);

    let (pem, _) = store.identity_public_pems().await.unwrap();
    assert_eq!(pem, incoming.signing.public_pem().unwrap());
}

#[tokio::test]
async fn failed_import_leaves_the_previous_keystore_intact() {
    let (keyring, store) = store();
    let old = bundle();
    let old_record = old.to_record().unwrap();
    store.install(old).await.unwrap();

    let err = store.import_archive(b"{ not an archive").await.unwrap_err();
    assert!(matches!(err, ClientError::CorruptKeyData { .. }));

    assert_eq!(keyring.load_keys().unwrap().as_deref(), Some(old_record.as_str()));
    assert!(store.signing_keys().await.is_ok());
}

#[tokio::test]
async fn import_into_an_empty_store_displaces_nothing() {
    let (_, store) = store();
    let archive = bundle().to_record().unwrap().into_bytes();

    assert_eq!(store.import_archive(&archive).await.unwrap(), None);
    assert!(store.has_identity().await.unwrap());
}

#[tokio::test]
async fn clear_wipes_memory_and_storage() {
    let (keyring, store) = store();
    store.install(bundle()).await.unwrap();
    store.clear().await.unwrap();

    assert!(!store.has_identity().await.unwrap());
    assert_eq!(keyring.load_keys().unwrap(), None);
}

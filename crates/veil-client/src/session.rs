//! Authentication: identity lifecycle and the challenge handshake.
//!
//! Every authenticated endpoint takes per-request proof of key possession:
//! the client fetches a challenge string, signs its Latin-1 bytes with the
//! identity signing key, and sends the signature alongside the request.
//! The bearer token on its own authorizes nothing but the challenge fetch.
//!
//! Handshakes for distinct requests must not interleave, so authenticated
//! requests go through a [`RequestQueue`] by default.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::rngs::OsRng;
use veil_crypto::{DEFAULT_RSA_BITS, SignedField, sign_field, text_to_bytes};
use veil_proto::{ChallengeReply, TokenReply};

use crate::env::Environment;
use crate::error::ClientError;
use crate::keyring::Keyring;
use crate::keystore::{KeyBundle, KeyStore};
use crate::queue::RequestQueue;
use crate::transport::{HttpResponse, HttpTransport};

/// Expand a signed field into its three form parameters.
fn signed_field_params(field: &str, signed: &SignedField) -> Vec<(String, String)> {
    vec![
        (field.to_string(), signed.value.clone()),
        (format!("{field}_signature"), signed.signature.clone()),
        (format!("{field}_signature_timestamp"), signed.timestamp.clone()),
    ]
}

/// Shared session state the queued request futures capture: everything a
/// challenge handshake touches, behind one `Arc`.
struct SessionCore {
    transport: Arc<dyn HttpTransport>,
    keyring: Arc<dyn Keyring>,
    keystore: Arc<KeyStore>,
    token: Mutex<Option<String>>,
}

impl SessionCore {
    fn token_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current bearer token: memory first, then durable storage.
    fn token(&self) -> Result<String, ClientError> {
        let mut slot = self.token_slot();
        if let Some(token) = slot.as_ref() {
            return Ok(token.clone());
        }
        let stored = self.keyring.load_token()?.ok_or(ClientError::NotAuthenticated)?;
        *slot = Some(stored.clone());
        Ok(stored)
    }

    fn set_token(&self, token: String) -> Result<(), ClientError> {
        self.keyring.store_token(&token)?;
        *self.token_slot() = Some(token);
        Ok(())
    }

    fn drop_token(&self) -> Result<(), ClientError> {
        self.keyring.clear_token()?;
        *self.token_slot() = None;
        Ok(())
    }

    /// One challenge handshake plus the actual request.
    async fn challenge_request(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, ClientError> {
        let token = self.token()?;

        let challenge_params = vec![("access_token".to_string(), token.clone())];
        let response = self.transport.post_form("/api/challenge", &challenge_params).await?;
        if !response.ok() {
            return Err(ClientError::RemoteRejected { status: response.status, body: response.body });
        }
        let reply: ChallengeReply = response.json()?;

        let signing = self.keystore.signing_keys().await?;
        let signature = signing.sign(&text_to_bytes(&reply.challenge)?)?;

        let mut merged = vec![
            ("access_token".to_string(), token),
            ("challenge".to_string(), reply.challenge),
            ("challenge_signature".to_string(), BASE64.encode(signature)),
        ];
        merged.extend_from_slice(params);

        Ok(self.transport.post_form(endpoint, &merged).await?)
    }
}

/// Session state: key material, bearer token, and the request queue.
pub struct AuthSession<E: Environment> {
    env: E,
    core: Arc<SessionCore>,
    queue: RequestQueue,
    rsa_bits: usize,
}

impl<E: Environment> AuthSession<E> {
    /// Create a session over the given transport and keyring.
    pub fn new(env: E, transport: Arc<dyn HttpTransport>, keyring: Arc<dyn Keyring>) -> Self {
        let keystore = Arc::new(KeyStore::new(Arc::clone(&keyring)));
        Self {
            env,
            core: Arc::new(SessionCore {
                transport,
                keyring,
                keystore,
                token: Mutex::new(None),
            }),
            queue: RequestQueue::new(),
            rsa_bits: DEFAULT_RSA_BITS,
        }
    }

    /// Override the RSA modulus size used by [`sign_up`](Self::sign_up).
    ///
    /// Production uses the default; tests shrink it so key generation does
    /// not dominate the run.
    #[must_use]
    pub fn with_rsa_bits(mut self, bits: usize) -> Self {
        self.rsa_bits = bits;
        self
    }

    /// The keystore backing this session.
    pub fn keystore(&self) -> &Arc<KeyStore> {
        &self.core.keystore
    }

    /// The environment backing this session.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Current bearer token: memory first, then durable storage.
    pub fn token(&self) -> Result<String, ClientError> {
        self.core.token()
    }

    /// True iff a bearer token is available.
    pub fn is_authenticated(&self) -> bool {
        self.core.token().is_ok()
    }

    /// Register a new account: generate a fresh identity, prove possession
    /// of its signing key, and install it.
    ///
    /// When an identity already exists its archive is returned so the
    /// caller can keep it; the new identity replaces it only after the
    /// server accepts the registration.
    pub async fn sign_up(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Option<Vec<u8>>, ClientError> {
        let bundle = KeyBundle::generate(&mut OsRng, self.rsa_bits)?;
        let signed = sign_field(&bundle.signing, login, self.env.unix_millis())?;

        let mut params = vec![
            ("password".to_string(), password.to_string()),
            ("sign_public_key".to_string(), bundle.signing.public_pem()?),
            ("message_public_key".to_string(), bundle.encryption.public_pem()?),
        ];
        params.extend(signed_field_params("login", &signed));

        let response = self.core.transport.post_form("/api/signup", &params).await?;
        if !response.ok() {
            return Err(ClientError::RemoteRejected { status: response.status, body: response.body });
        }
        let reply: TokenReply = response.json()?;
        self.core.set_token(reply.token)?;

        let displaced = if self.keystore().has_identity().await? {
            Some(self.keystore().export_archive().await?)
        } else {
            None
        };
        self.keystore().install(bundle).await?;
        Ok(displaced)
    }

    /// Authenticate an existing account.
    ///
    /// When no identity is stored locally, `archive` must carry one (for
    /// example exported on another device); it is imported before the
    /// login proof is built. A stored identity wins over the archive.
    pub async fn log_in(
        &self,
        login: &str,
        password: &str,
        archive: Option<&[u8]>,
    ) -> Result<(), ClientError> {
        if !self.keystore().has_identity().await? {
            let archive = archive.ok_or(ClientError::NoKeysFound)?;
            self.keystore().import_archive(archive).await?;
        }

        let signing = self.keystore().signing_keys().await?;
        let signed = sign_field(&signing, login, self.env.unix_millis())?;

        let mut params = vec![("password".to_string(), password.to_string())];
        params.extend(signed_field_params("login", &signed));

        let response = self.core.transport.post_form("/api/login", &params).await?;
        if !response.ok() {
            return Err(ClientError::RemoteRejected { status: response.status, body: response.body });
        }
        let reply: TokenReply = response.json()?;
        self.core.set_token(reply.token)
    }

    /// End the session: export the keystore archive, then wipe both the
    /// keystore and the token.
    ///
    /// The archive is returned before anything is destroyed, so key
    /// material is never silently discarded.
    pub async fn log_out(&self) -> Result<Vec<u8>, ClientError> {
        let archive = self.keystore().export_archive().await?;
        self.keystore().clear().await?;
        self.core.drop_token()?;
        Ok(archive)
    }

    /// Issue an authenticated request through the serialization queue.
    ///
    /// The returned response may carry any status; callers decide whether
    /// a rejection is fatal.
    pub async fn authenticated_request(
        &self,
        endpoint: &str,
        params: Vec<(String, String)>,
    ) -> Result<HttpResponse, ClientError> {
        let core = Arc::clone(&self.core);
        let endpoint = endpoint.to_string();
        self.queue.run(async move { core.challenge_request(&endpoint, &params).await }).await
    }

    /// Issue an authenticated request immediately, bypassing the queue.
    ///
    /// Used by the long-poll loop, which must not block interactive
    /// requests behind a poll that sits idle for tens of seconds.
    pub async fn authenticated_request_unqueued(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<HttpResponse, ClientError> {
        self.core.challenge_request(endpoint, params).await
    }
}

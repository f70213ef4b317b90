//! High-level chat operations: groups, messages, invitations.
//!
//! Every operation here runs over an authenticated [`AuthSession`]. The
//! server never sees plaintext or unwrapped keys: message bodies are
//! sealed with the group key before leaving this module, and group keys
//! travel only wrapped to a member's public encryption key.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use veil_crypto::{GroupKey, IV_SIZE, open_message, seal_message, text_to_bytes};
use veil_proto::{
    GROUPS_PAGE_LIMIT, Group, GroupsPage, INVITES_PAGE_LIMIT, Invitation, InvitationsPage,
    MESSAGES_PAGE_LIMIT, Me, Message, MessagesPage, UserProfile,
};

use crate::env::Environment;
use crate::error::ClientError;
use crate::keystore::{KeyStore, PeerKeys};
use crate::message::DecodedMessage;
use crate::session::AuthSession;
use crate::transport::HttpResponse;

/// Turn a non-2xx response into [`ClientError::RemoteRejected`].
fn expect_ok(response: HttpResponse) -> Result<HttpResponse, ClientError> {
    if response.ok() {
        Ok(response)
    } else {
        Err(ClientError::RemoteRejected { status: response.status, body: response.body })
    }
}

/// Chat operations over an authenticated session.
pub struct ChatClient<E: Environment> {
    session: Arc<AuthSession<E>>,
}

impl<E: Environment> ChatClient<E> {
    /// Create a client over the given session.
    pub fn new(session: Arc<AuthSession<E>>) -> Self {
        Self { session }
    }

    /// The session this client runs over.
    pub fn session(&self) -> &Arc<AuthSession<E>> {
        &self.session
    }

    fn keystore(&self) -> &Arc<KeyStore> {
        self.session.keystore()
    }

    /// Fetch pages from a list endpoint until `count` items arrived or a
    /// page came back empty. The server caps page sizes, so `count` is
    /// chunked to at most `page_limit` per request.
    async fn fetch_all<P, T>(
        &self,
        endpoint: &str,
        base_params: &[(String, String)],
        page_limit: usize,
        mut skip: usize,
        mut count: usize,
        extract: impl Fn(P) -> Vec<T>,
    ) -> Result<Vec<T>, ClientError>
    where
        P: DeserializeOwned,
    {
        let mut items = Vec::new();
        while count > 0 {
            let mut params = base_params.to_vec();
            params.push(("skip".to_string(), skip.to_string()));
            params.push(("count".to_string(), count.min(page_limit).to_string()));

            let response = self.session.authenticated_request(endpoint, params).await?;
            let page = extract(expect_ok(response)?.json::<P>()?);
            if page.is_empty() {
                break;
            }
            count = count.saturating_sub(page.len());
            skip += page.len();
            items.extend(page);
        }
        Ok(items)
    }

    /// The authenticated account's profile.
    pub async fn me(&self) -> Result<Me, ClientError> {
        let response = self.session.authenticated_request("/api/me", Vec::new()).await?;
        expect_ok(response)?.json()
    }

    /// Create a group and generate its symmetric key locally.
    ///
    /// The key never leaves the keystore here; other members receive it
    /// through [`invite`](Self::invite).
    pub async fn create_group(&self, name: &str) -> Result<Group, ClientError> {
        let params = vec![("name".to_string(), name.to_string())];
        let response = self.session.authenticated_request("/api/create-group", params).await?;
        let group: Group = expect_ok(response)?.json()?;

        let key = GroupKey::new(self.session.env().random_array());
        self.keystore().insert_group_key(&group.id, key).await?;
        Ok(group)
    }

    /// List the account's groups.
    pub async fn groups(&self, skip: usize, count: usize) -> Result<Vec<Group>, ClientError> {
        self.fetch_all("/api/groups", &[], GROUPS_PAGE_LIMIT, skip, count, |page: GroupsPage| {
            page.groups
        })
        .await
    }

    /// Fetch and decode a group's message history.
    pub async fn messages(
        &self,
        group_id: &str,
        skip: usize,
        count: usize,
    ) -> Result<Vec<DecodedMessage>, ClientError> {
        let base = vec![("group_id".to_string(), group_id.to_string())];
        let wire = self
            .fetch_all("/api/messages", &base, MESSAGES_PAGE_LIMIT, skip, count, |page: MessagesPage| {
                page.messages
            })
            .await?;

        let mut decoded = Vec::with_capacity(wire.len());
        for message in wire {
            decoded.push(self.decode_message(message).await?);
        }
        Ok(decoded)
    }

    /// Seal and send a message to a group, returning the decoded echo.
    pub async fn send_message(
        &self,
        group_id: &str,
        text: &str,
    ) -> Result<DecodedMessage, ClientError> {
        let key = self.keystore().group_key(group_id).await?;
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }

        let signing = self.keystore().signing_keys().await?;
        let iv: [u8; IV_SIZE] = self.session.env().random_array();
        let sealed = seal_message(text, &signing, &key, &iv)?;

        let params = vec![
            ("id".to_string(), group_id.to_string()),
            ("message".to_string(), BASE64.encode(sealed)),
            ("salt".to_string(), BASE64.encode(iv)),
        ];
        let response = self.session.authenticated_request("/api/send-message", params).await?;
        let echoed: Message = expect_ok(response)?.json()?;
        self.decode_message(echoed).await
    }

    /// Fetch a user's profile, caching their public keys on first sight.
    pub async fn user(&self, login: &str) -> Result<UserProfile, ClientError> {
        let params = vec![("login".to_string(), login.to_string())];
        let response = self.session.authenticated_request("/api/user", params).await?;
        let profile: UserProfile = expect_ok(response)?.json()?;

        let keys = PeerKeys {
            signing: veil_crypto::SigningPublicKey::from_pem(&profile.sign_public_key)?,
            encryption: veil_crypto::EncryptionPublicKey::from_pem(&profile.message_public_key)?,
        };
        self.keystore().cache_peer_keys(login, keys).await?;
        Ok(profile)
    }

    /// A user's public keys: the trust-on-first-use cache, or a directory
    /// fetch when the user has not been seen before.
    pub async fn user_keys(&self, login: &str) -> Result<PeerKeys, ClientError> {
        if let Some(keys) = self.keystore().peer_keys(login).await? {
            return Ok(keys);
        }
        self.user(login).await?;
        self.keystore()
            .peer_keys(login)
            .await?
            .ok_or_else(|| ClientError::Internal { reason: format!("keys for {login} not cached") })
    }

    /// Invite a user to a group, wrapping the group key to their public
    /// encryption key.
    pub async fn invite(&self, group_id: &str, login: &str) -> Result<(), ClientError> {
        let key = self.keystore().group_key(group_id).await?;
        let peer = self.user_keys(login).await?;
        let wrapped = key.wrap_for(&peer.encryption, &mut OsRng)?;

        let params = vec![
            ("login".to_string(), login.to_string()),
            ("group_id".to_string(), group_id.to_string()),
            ("key".to_string(), BASE64.encode(wrapped)),
        ];
        let response = self.session.authenticated_request("/api/invite", params).await?;
        expect_ok(response)?;
        Ok(())
    }

    /// List pending invitations.
    pub async fn invitations(
        &self,
        skip: usize,
        count: usize,
    ) -> Result<Vec<Invitation>, ClientError> {
        self.fetch_all(
            "/api/get-invites",
            &[],
            INVITES_PAGE_LIMIT,
            skip,
            count,
            |page: InvitationsPage| page.invitations,
        )
        .await
    }

    /// Accept an invitation: unwrap its group key with the identity
    /// encryption key, store it, and return the joined group.
    ///
    /// The key is unwrapped before the server is told, so a corrupt
    /// invitation fails without being consumed.
    pub async fn accept_invitation(&self, invitation: &Invitation) -> Result<Group, ClientError> {
        let key = self.keystore().unwrap_group_key(&invitation.key.data).await?;

        let params = vec![
            ("group_id".to_string(), invitation.group_id.clone()),
            ("accept".to_string(), "true".to_string()),
        ];
        let response = self.session.authenticated_request("/api/remove-invite", params).await?;
        let group: Group = expect_ok(response)?.json()?;

        self.keystore().insert_group_key(&invitation.group_id, key).await?;
        Ok(group)
    }

    /// Decline an invitation. The wrapped key is discarded unopened.
    pub async fn decline_invitation(&self, invitation: &Invitation) -> Result<(), ClientError> {
        let params = vec![
            ("group_id".to_string(), invitation.group_id.clone()),
            ("accept".to_string(), "false".to_string()),
        ];
        let response = self.session.authenticated_request("/api/remove-invite", params).await?;
        expect_ok(response)?;
        Ok(())
    }

    /// Decode one wire message: decrypt with the group key, then check the
    /// embedded signature against the sender's cached or fetched key.
    ///
    /// Decrypt and verify outcomes are data on the result, never errors;
    /// only a missing group key fails the call.
    pub async fn decode_message(&self, wire: Message) -> Result<DecodedMessage, ClientError> {
        let key = self.keystore().group_key(&wire.group_id).await?;

        let opened = match open_message(&wire.content.data, &wire.salt.data, &key) {
            Ok(opened) => opened,
            Err(_) => return Ok(DecodedMessage::undecrypted(wire)),
        };

        let verified = match &opened.signature {
            None => None,
            Some(signature) => {
                let outcome = match self.user_keys(&wire.from_login).await {
                    Ok(keys) => match text_to_bytes(&opened.text) {
                        Ok(bytes) => keys.signing.verify(&bytes, signature),
                        Err(_) => false,
                    },
                    // A sender whose keys cannot be obtained is an
                    // unverifiable sender, not a failed fetch.
                    Err(_) => false,
                };
                Some(outcome)
            }
        };

        Ok(DecodedMessage::decrypted(wire, opened, verified))
    }
}

//! Response body models.

use serde::{Deserialize, Serialize};

/// Server page size cap for `/api/groups`.
pub const GROUPS_PAGE_LIMIT: usize = 20;

/// Server page size cap for `/api/messages`.
pub const MESSAGES_PAGE_LIMIT: usize = 50;

/// Server page size cap for `/api/get-invites`.
pub const INVITES_PAGE_LIMIT: usize = 20;

/// Binary payload in the backend's serialized-buffer form.
///
/// The backend JSON-encodes raw buffers as `{"type": "Buffer", "data":
/// [..bytes..]}`; only the byte array matters to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireBytes {
    /// The raw bytes.
    #[serde(default)]
    pub data: Vec<u8>,
}

impl WireBytes {
    /// Wrap raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

/// A chat group. Owned by the backend; the client only reads it and
/// associates a group key to its id locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Backend-assigned group id.
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Login of the group's creator.
    #[serde(default)]
    pub owner_login: String,
    /// Logins of the current members.
    #[serde(default)]
    pub member_logins: Vec<String>,
}

/// A chat message as the backend stores it: encrypted body plus routing
/// metadata. Decryption state lives client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Backend-assigned message id.
    #[serde(rename = "_id", alias = "id", default)]
    pub id: String,
    /// Group the message belongs to.
    #[serde(default)]
    pub group_id: String,
    /// Login of the sender.
    #[serde(default)]
    pub from_login: String,
    /// Backend-assigned creation stamp, passed through opaquely.
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
    /// Encrypted message body.
    pub content: WireBytes,
    /// AES-CBC initialization vector for `content`.
    pub salt: WireBytes,
}

/// A pending group invitation. Ephemeral - consumed exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    /// Group the invitation grants access to.
    pub group_id: String,
    /// Group key wrapped for the recipient's encryption public key.
    pub key: WireBytes,
    /// Backend-assigned creation stamp, passed through opaquely.
    #[serde(default)]
    pub created_at: Option<serde_json::Value>,
}

/// Public identity of a remote user as served by `/api/user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user's login.
    #[serde(default)]
    pub login: String,
    /// PEM envelope of the user's signing public key.
    #[serde(rename = "sign_public_key", alias = "signPublicKey")]
    pub sign_public_key: String,
    /// PEM envelope of the user's encryption public key.
    #[serde(rename = "message_public_key", alias = "messagePublicKey")]
    pub message_public_key: String,
}

/// `/api/me` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Me {
    /// The authenticated user's login.
    pub login: String,
}

/// Bearer token reply from `/api/signup` and `/api/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenReply {
    /// The session's bearer token.
    pub token: String,
}

/// One-time challenge reply from `/api/challenge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeReply {
    /// Short opaque challenge string, single-use and short-lived.
    pub challenge: String,
}

/// One page of `/api/groups`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupsPage {
    /// Groups in this page.
    pub groups: Vec<Group>,
}

/// One page of `/api/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesPage {
    /// Messages in this page.
    pub messages: Vec<Message>,
}

/// One page of `/api/get-invites`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationsPage {
    /// Invitations in this page.
    pub invitations: Vec<Invitation>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn message_decodes_from_backend_shape() {
        let body = r#"{
            "_id": "m1",
            "groupId": "g1",
            "fromLogin": "alice",
            "createdAt": "2024-01-01T00:00:00Z",
            "content": {"type": "Buffer", "data": [1, 2, 3]},
            "salt": {"type": "Buffer", "data": [4, 5, 6]}
        }"#;

        let message: Message = serde_json::from_str(body).unwrap();
        assert_eq!(message.id, "m1");
        assert_eq!(message.group_id, "g1");
        assert_eq!(message.from_login, "alice");
        assert_eq!(message.content.data, vec![1, 2, 3]);
        assert_eq!(message.salt.data, vec![4, 5, 6]);
    }

    #[test]
    fn group_decodes_with_mongo_id() {
        let body = r#"{"_id": "g1", "name": "team", "ownerLogin": "alice",
                       "memberLogins": ["alice", "bob"]}"#;
        let group: Group = serde_json::from_str(body).unwrap();
        assert_eq!(group.id, "g1");
        assert_eq!(group.name, "team");
        assert_eq!(group.owner_login, "alice");
        assert_eq!(group.member_logins, vec!["alice", "bob"]);
    }

    #[test]
    fn invitation_decodes_wrapped_key() {
        let body = r#"{"groupId": "g1", "key": {"type": "Buffer", "data": [9, 9]}}"#;
        let invitation: Invitation = serde_json::from_str(body).unwrap();
        assert_eq!(invitation.group_id, "g1");
        assert_eq!(invitation.key.data, vec![9, 9]);
        assert_eq!(invitation.created_at, None);
    }

    #[test]
    fn user_profile_accepts_both_key_field_spellings() {
        let snake = r#"{"login": "bob", "sign_public_key": "S", "message_public_key": "M"}"#;
        let camel = r#"{"login": "bob", "signPublicKey": "S", "messagePublicKey": "M"}"#;

        let a: UserProfile = serde_json::from_str(snake).unwrap();
        let b: UserProfile = serde_json::from_str(camel).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sign_public_key, "S");
    }

    #[test]
    fn pages_decode() {
        let groups: GroupsPage = serde_json::from_str(r#"{"groups": []}"#).unwrap();
        assert!(groups.groups.is_empty());

        let invites: InvitationsPage = serde_json::from_str(r#"{"invitations": []}"#).unwrap();
        assert!(invites.invitations.is_empty());
    }
}

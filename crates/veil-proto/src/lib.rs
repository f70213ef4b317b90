//! Veil wire types.
//!
//! Serde models of the backend's JSON responses. Requests travel as
//! form-urlencoded parameter lists and are built by the client crate; only
//! response bodies have enough structure to deserve types here.
//!
//! Binary fields (ciphertexts, IVs, wrapped keys) arrive in the backend's
//! serialized-buffer form, an object carrying a `data` array of bytes -
//! see [`WireBytes`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod event;
pub mod wire;

pub use event::{EVENT_MESSAGE, MessageEvent};
pub use wire::{
    ChallengeReply, Group, GROUPS_PAGE_LIMIT, GroupsPage, Invitation, INVITES_PAGE_LIMIT,
    InvitationsPage, Me, Message, MESSAGES_PAGE_LIMIT, MessagesPage, TokenReply, UserProfile,
    WireBytes,
};

//! Long-poll event envelopes.
//!
//! `/api/poll` answers each request with a single event object tagged by a
//! `type` field. The client inspects the tag and, for known tags, parses
//! the rest of the envelope into a typed payload.

use serde::{Deserialize, Serialize};

use crate::wire::Message;

/// Event tag for newly arrived messages.
pub const EVENT_MESSAGE: &str = "message";

/// Payload of a `"message"` poll event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Group the message arrived in.
    pub group_id: String,
    /// The encrypted message.
    pub message: Message,
}

//! Wire protocol for the live-session chat socket.
//!
//! JSON text frames, tagged by `type`. Event tags are snake_case; field names
//! are camelCase for compatibility with the platform's web and mobile clients.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    #[serde(rename_all = "camelCase")]
    Join {
        session_id: String,
        user_id: String,
        user_name: String,
    },
    #[serde(rename_all = "camelCase")]
    Message {
        session_id: String,
        message: String,
    },
    Leave,
}

/// Reason attached to an outbound `error` frame.
///
/// The offending connection is kept open in every case; the frame exists so a
/// client can tell a dropped event from network loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MalformedFrame,
    NotJoined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Chat message relayed to every member of the room, sender included.
    /// `id` and `timestamp` are attached by the server at dispatch time.
    #[serde(rename_all = "camelCase")]
    Message {
        id: Uuid,
        session_id: String,
        user_id: String,
        user_name: String,
        message: String,
        timestamp: String,
    },
    #[serde(rename_all = "camelCase")]
    UserJoined { user_name: String, timestamp: String },
    #[serde(rename_all = "camelCase")]
    UserLeft { user_name: String, timestamp: String },
    Error {
        code: RejectReason,
        message: String,
    },
}

impl OutboundEvent {
    /// Serialize to a wire frame. Serialization of these variants cannot fail.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("outbound event serializes")
    }
}

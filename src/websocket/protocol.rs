//! Wire messages of the relay.
//!
//! Server to client traffic is JSON tagged by `type`. Client to server
//! traffic has no envelope at all: the raw text of a frame is the id of the
//! client to poke. Anything richer would be a new protocol version.

use serde::{Deserialize, Serialize};

/// Fixed payload carried by every poke.
pub const POKE_PAYLOAD: &str = "hey";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// First message on every connection, carrying its routable id.
    #[serde(rename = "welcome")]
    Welcome {
        #[serde(rename = "userID")]
        user_id: String,
    },
    #[serde(rename = "poke")]
    Poke { data: String },
}

impl ServerMessage {
    pub fn welcome(user_id: impl Into<String>) -> Self {
        ServerMessage::Welcome { user_id: user_id.into() }
    }

    pub fn poke() -> Self {
        ServerMessage::Poke { data: POKE_PAYLOAD.to_string() }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

//! Wire protocol shared by the relay server and its clients.
//!
//! Every datagram carries exactly one JSON object with a `type` discriminator.
//! Positions and event payloads are opaque [`serde_json::Value`]s owned by the
//! clients; the server only carries them around.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BROADCAST_INTERVAL_MS: u64 = 30;
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Errors raised while decoding inbound or encoding outbound messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("message has no `type` field")]
    MissingType,
    #[error("unrecognized message type `{0}`")]
    UnknownType(String),
    #[error("malformed `{kind}` message: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("move entry has no position")]
    MissingPosition,
    #[error("unrecognized action type `{0}`")]
    UnknownAction(String),
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Messages sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Registration handshake, also used as a retry.
    #[serde(rename = "id")]
    Register {
        #[serde(
            default,
            deserialize_with = "lenient_id",
            skip_serializing_if = "Option::is_none"
        )]
        id: Option<u64>,
        #[serde(default)]
        position: Value,
    },
    /// A batch of client intents sharing one timestamp.
    #[serde(rename = "actions")]
    Actions {
        #[serde(
            default,
            deserialize_with = "lenient_id",
            skip_serializing_if = "Option::is_none"
        )]
        id: Option<u64>,
        timestamp: u64,
        actions: Vec<RawAction>,
    },
}

/// Reads a client-claimed id, treating anything but an unsigned integer as absent
///
/// The server resolves identity from the sender's address, so a garbled
/// claim must not cost the client its whole message.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_u64))
}

/// One entry of an `actions` batch as it arrives on the wire.
///
/// Entries are validated one by one with [`RawAction::parse`] so a single bad
/// entry does not discard the rest of the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

/// A validated batch entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionEntry {
    /// Movement. `data` is the full move object, `position` is copied out of it.
    Move { position: Value, data: Value },
    /// Transient gameplay event relayed to every other session.
    Event { data: Value },
}

impl RawAction {
    pub fn moving(data: Value) -> Self {
        Self {
            kind: "move".to_string(),
            data,
        }
    }

    pub fn event(data: Value) -> Self {
        Self {
            kind: "action".to_string(),
            data,
        }
    }

    pub fn parse(&self) -> Result<ActionEntry, ProtocolError> {
        match self.kind.as_str() {
            "move" => {
                let position = self
                    .data
                    .get("position")
                    .cloned()
                    .ok_or(ProtocolError::MissingPosition)?;
                Ok(ActionEntry::Move {
                    position,
                    data: self.data.clone(),
                })
            }
            "action" => Ok(ActionEntry::Event {
                data: self.data.clone(),
            }),
            other => Err(ProtocolError::UnknownAction(other.to_string())),
        }
    }
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Registration acknowledgement carrying the resolved session id.
    Id { id: u64 },
    NewPlayer { id: u64, position: Value },
    OldPlayer { id: u64, position: Value },
    /// Periodic snapshot of every movement queued since the last tick.
    Update {
        data: Vec<SnapshotEntry>,
        timestamp: u64,
    },
    Action { data: RelayedEvent },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotEntry {
    Move { id: u64, timestamp: u64, data: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayedEvent {
    EmitParticles { id: u64, timestamp: u64, data: Value },
}

const KNOWN_TYPES: [&str; 2] = ["id", "actions"];

/// Decodes one inbound datagram.
///
/// The discriminator is checked before the full decode so that a missing or
/// unknown `type` is reported as such rather than as a generic serde error.
pub fn decode_client_message(bytes: &[u8]) -> Result<ClientMessage, ProtocolError> {
    let value: Value = serde_json::from_slice(bytes).map_err(ProtocolError::InvalidJson)?;

    let kind = match value.get("type").and_then(Value::as_str) {
        Some(kind) => kind,
        None => return Err(ProtocolError::MissingType),
    };

    let kind = match KNOWN_TYPES.iter().find(|known| **known == kind) {
        Some(known) => *known,
        None => return Err(ProtocolError::UnknownType(kind.to_string())),
    };

    serde_json::from_value(value).map_err(|source| ProtocolError::Malformed { kind, source })
}

pub fn encode_server_message(message: &ServerMessage) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

pub fn encode_client_message(message: &ClientMessage) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(message).map_err(ProtocolError::Encode)
}

pub fn decode_server_message(bytes: &[u8]) -> Result<ServerMessage, ProtocolError> {
    serde_json::from_slice(bytes).map_err(ProtocolError::InvalidJson)
}

//! Wire messages between clients and the authoritative server.
//!
//! Messages are encoded with [`postcard`] behind a protocol version byte.
//! Actions travel as a bare [`ActionId`]; each side resolves it against its
//! own, identically built, action registry.

use serde::{Deserialize, Serialize};

use crate::actions::ActionId;
use crate::replication::StateUpdate;
use crate::session::{AdmissionResult, ClientId, LoadoutSelection};

/// Wire protocol version, prepended to every payload.
pub const PROTOCOL_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A client asks to join the lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Requesting client.
    pub client_id: ClientId,
}

/// The transport lost or closed a client. No reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    /// Departed client.
    pub client_id: ClientId,
}

/// A client performs an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Acting client.
    pub client_id: ClientId,
    /// Action reference.
    pub action: ActionId,
}

/// A client picks its build in the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectLoadout {
    /// Selecting client.
    pub client_id: ClientId,
    /// Selection.
    pub selection: LoadoutSelection,
}

// ---------------------------------------------------------------------------
// Top-level enums
// ---------------------------------------------------------------------------

/// Client-to-server message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join request.
    Connect(ConnectRequest),
    /// Leave notification.
    Disconnect(Disconnect),
    /// Lobby selection.
    SelectLoadout(SelectLoadout),
    /// Gameplay action.
    Action(ActionRequest),
}

/// Server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Reply to [`ClientMessage::Connect`].
    Admission(AdmissionResult),
    /// Replicated state changes.
    State(Vec<StateUpdate>),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Decoding failures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// No version byte.
    #[error("empty payload")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// Malformed body.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes `message` as `[version] [postcard body]`.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, WireError> {
    let mut out = vec![PROTOCOL_VERSION];
    out.extend(postcard::to_allocvec(message)?);
    Ok(out)
}

/// Decodes a payload produced by [`encode`].
pub fn decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T, WireError> {
    let (&version, body) = data.split_first().ok_or(WireError::EmptyPayload)?;
    if version != PROTOCOL_VERSION {
        return Err(WireError::UnsupportedVersion(version));
    }
    Ok(postcard::from_bytes(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::life_state::LifeState;
    use crate::replication::NetworkId;

    #[test]
    fn test_action_reference_is_compact() {
        let message = ClientMessage::Action(ActionRequest {
            client_id: ClientId(3),
            action: ActionId(5),
        });
        // version, variant tag, client id, action id
        assert_eq!(encode(&message).unwrap(), vec![PROTOCOL_VERSION, 3, 3, 5]);
    }

    #[test]
    fn test_client_messages_decode() {
        let messages = [
            ClientMessage::Connect(ConnectRequest { client_id: ClientId(1) }),
            ClientMessage::Disconnect(Disconnect { client_id: ClientId(1) }),
            ClientMessage::SelectLoadout(SelectLoadout {
                client_id: ClientId(2),
                selection: LoadoutSelection {
                    class_id: 4,
                    actions: vec![ActionId(0), ActionId(3)],
                },
            }),
        ];
        for message in messages {
            let decoded: ClientMessage = decode(&encode(&message).unwrap()).unwrap();
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_server_state_message() {
        let message = ServerMessage::State(vec![StateUpdate {
            entity: NetworkId(7),
            health: Some(30.0),
            life_state: Some(LifeState::Incapacitated),
        }]);
        let decoded: ServerMessage = decode(&encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_rejects_bad_payloads() {
        assert!(matches!(decode::<ServerMessage>(&[]), Err(WireError::EmptyPayload)));
        assert!(matches!(
            decode::<ServerMessage>(&[9, 0, 0]),
            Err(WireError::UnsupportedVersion(9))
        ));
        assert!(matches!(
            decode::<ServerMessage>(&[PROTOCOL_VERSION, 200]),
            Err(WireError::Postcard(_))
        ));
    }
}

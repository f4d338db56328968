use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::lobby::{AnimationTag, LobbyCode, LobbySummary, ParticipantId, ParticipantState, StateUpdate};
use crate::util::vec3::Vec3;

/// Largest framed message accepted on the reliable stream
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Largest datagram accepted or sent
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Announce own state to the current scope
    PlayerJoined(StateUpdate),
    /// Movement / animation change
    PlayerUpdate(StateUpdate),
    CreateLobby { map_name: String },
    JoinLobby { lobby_id: String },
    LeaveLobby,
    RequestLobbyList,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::PlayerJoined(_) => "playerJoined",
            ClientMessage::PlayerUpdate(_) => "playerUpdate",
            ClientMessage::CreateLobby { .. } => "createLobby",
            ClientMessage::JoinLobby { .. } => "joinLobby",
            ClientMessage::LeaveLobby => "leaveLobby",
            ClientMessage::RequestLobbyList => "requestLobbyList",
        }
    }
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServerMessage {
    /// First message on every connection: the id the server assigned
    Welcome { id: ParticipantId },
    PlayerJoined(PlayerPayload),
    PlayerUpdate(PlayerPayload),
    PlayerLeft { id: ParticipantId },
    LobbyCreated { lobby_id: LobbyCode },
    JoinedLobby {
        lobby_id: LobbyCode,
        map_name: String,
        host: ParticipantId,
        players: Vec<ParticipantId>,
    },
    LobbyError { message: String },
    /// Sent only to the participant that just became host
    HostChanged,
    LobbyList(BTreeMap<LobbyCode, LobbySummary>),
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::PlayerJoined(_) => "playerJoined",
            ServerMessage::PlayerUpdate(_) => "playerUpdate",
            ServerMessage::PlayerLeft { .. } => "playerLeft",
            ServerMessage::LobbyCreated { .. } => "lobbyCreated",
            ServerMessage::JoinedLobby { .. } => "joinedLobby",
            ServerMessage::LobbyError { .. } => "lobbyError",
            ServerMessage::HostChanged => "hostChanged",
            ServerMessage::LobbyList(_) => "lobbyList",
        }
    }
}

/// Participant state as relayed to peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPayload {
    pub id: ParticipantId,
    pub position: Vec3,
    #[serde(default)]
    pub animation_state: Option<AnimationTag>,
    #[serde(default)]
    pub rotation: Option<f32>,
}

impl PlayerPayload {
    /// Full merged state; rotation and animation are always present
    pub fn from_state(id: &ParticipantId, state: &ParticipantState) -> Self {
        Self {
            id: id.clone(),
            position: state.position,
            animation_state: Some(state.animation.clone()),
            rotation: Some(state.rotation),
        }
    }
}

/// Encode a message using bincode
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_roundtrip() {
        let msg = ClientMessage::PlayerUpdate(
            StateUpdate::at(Vec3::new(1.0, 2.0, 3.0))
                .with_animation("walking")
                .with_rotation(0.25),
        );

        let decoded: ClientMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_custom_clip_survives_wire() {
        let msg = ServerMessage::PlayerUpdate(PlayerPayload {
            id: ParticipantId::from("a"),
            position: Vec3::ZERO,
            animation_state: Some(AnimationTag::from("wave")),
            rotation: None,
        });

        let decoded: ServerMessage = decode(&encode(&msg).unwrap()).unwrap();
        match decoded {
            ServerMessage::PlayerUpdate(payload) => {
                assert_eq!(payload.animation_state, Some(AnimationTag::Clip("wave".to_string())));
                assert_eq!(payload.rotation, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_lobby_list_roundtrip() {
        let mut list = BTreeMap::new();
        list.insert(
            LobbyCode::from("ABC123"),
            LobbySummary {
                host: ParticipantId::from("a"),
                map_name: "test".to_string(),
                player_count: 2,
            },
        );
        let msg = ServerMessage::LobbyList(list);

        let decoded: ServerMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_payload_from_state_is_complete() {
        let state = ParticipantState::default();
        let payload = PlayerPayload::from_state(&ParticipantId::from("a"), &state);
        assert_eq!(payload.rotation, Some(0.0));
        assert_eq!(payload.animation_state, Some(AnimationTag::Idle));
        assert_eq!(payload.position, state.position);
    }

    #[test]
    fn test_decode_garbage() {
        let result: Result<ClientMessage, _> = decode(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        assert!(result.is_err());
    }

    #[test]
    fn test_player_update_fits_datagram() {
        let msg = ClientMessage::PlayerUpdate(
            StateUpdate::at(Vec3::new(1.0, 2.0, 3.0))
                .with_animation("walking")
                .with_rotation(1.0),
        );
        assert!(encode(&msg).unwrap().len() < MAX_DATAGRAM_SIZE);
    }
}

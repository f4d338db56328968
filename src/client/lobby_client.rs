//! Client-side view of lobby membership.
//!
//! Turns user intents into `ClientMessage`s and resolves the server's
//! lobby replies into outcomes the UI can show.

use std::collections::BTreeMap;
use tracing::debug;

use crate::lobby::{LobbyCode, LobbySummary, ParticipantId};
use crate::net::protocol::{ClientMessage, ServerMessage};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum LobbyClientError {
    #[error("Not in any lobby")]
    NotInLobby,
}

/// A create or join request still waiting for the server's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingRequest {
    Create { map_name: String },
    Join { code: LobbyCode },
}

/// The lobby this client currently belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveLobby {
    pub code: LobbyCode,
    pub map_name: String,
    pub is_host: bool,
}

/// Resolution of a lobby request, or an unsolicited lobby event
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyOutcome {
    Created {
        lobby_id: LobbyCode,
        map_name: String,
        is_host: bool,
    },
    Joined {
        lobby_id: LobbyCode,
        map_name: String,
        host: ParticipantId,
        players: Vec<ParticipantId>,
        is_host: bool,
    },
    Failed {
        message: String,
        /// The request the server rejected, if one was outstanding
        request: Option<PendingRequest>,
    },
    /// This client was promoted
    HostChanged,
    ListUpdated,
}

#[derive(Debug, Default)]
pub struct LobbyClient {
    pending: Option<PendingRequest>,
    active: Option<ActiveLobby>,
    known_lobbies: BTreeMap<LobbyCode, LobbySummary>,
}

impl LobbyClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveLobby> {
        self.active.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.active.as_ref().is_some_and(|l| l.is_host)
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn known_lobbies(&self) -> &BTreeMap<LobbyCode, LobbySummary> {
        &self.known_lobbies
    }

    pub fn create_lobby(&mut self, map_name: impl Into<String>) -> ClientMessage {
        let map_name = map_name.into();
        self.replace_pending(PendingRequest::Create {
            map_name: map_name.clone(),
        });
        ClientMessage::CreateLobby { map_name }
    }

    pub fn join_lobby(&mut self, code: &str) -> ClientMessage {
        let code = LobbyCode::from(code);
        let lobby_id = code.to_string();
        self.replace_pending(PendingRequest::Join { code });
        ClientMessage::JoinLobby { lobby_id }
    }

    /// The server answers in order, so a newer request supersedes the old one
    fn replace_pending(&mut self, request: PendingRequest) {
        if let Some(previous) = self.pending.replace(request) {
            debug!("Superseding unanswered {:?}", previous);
        }
    }

    /// Fails locally when no lobby is active; nothing is sent
    pub fn leave_lobby(&mut self) -> Result<ClientMessage, LobbyClientError> {
        match self.active.take() {
            Some(lobby) => {
                debug!("Leaving lobby {}", lobby.code);
                Ok(ClientMessage::LeaveLobby)
            }
            None => Err(LobbyClientError::NotInLobby),
        }
    }

    pub fn request_lobby_list(&self) -> ClientMessage {
        ClientMessage::RequestLobbyList
    }

    /// Feed a server message; lobby replies resolve to an outcome
    pub fn apply(&mut self, message: &ServerMessage) -> Option<LobbyOutcome> {
        match message {
            ServerMessage::LobbyCreated { lobby_id } => {
                let map_name = match self.pending.take() {
                    Some(PendingRequest::Create { map_name }) => map_name,
                    other => {
                        debug!("lobbyCreated without a create request ({:?})", other);
                        String::new()
                    }
                };
                self.active = Some(ActiveLobby {
                    code: lobby_id.clone(),
                    map_name: map_name.clone(),
                    is_host: true,
                });
                Some(LobbyOutcome::Created {
                    lobby_id: lobby_id.clone(),
                    map_name,
                    is_host: true,
                })
            }
            ServerMessage::JoinedLobby {
                lobby_id,
                map_name,
                host,
                players,
            } => {
                if let Some(PendingRequest::Join { code }) = &self.pending {
                    if code != lobby_id {
                        debug!("Asked to join {} but joined {}", code, lobby_id);
                    }
                }
                self.pending = None;
                self.active = Some(ActiveLobby {
                    code: lobby_id.clone(),
                    map_name: map_name.clone(),
                    is_host: false,
                });
                Some(LobbyOutcome::Joined {
                    lobby_id: lobby_id.clone(),
                    map_name: map_name.clone(),
                    host: host.clone(),
                    players: players.clone(),
                    is_host: false,
                })
            }
            ServerMessage::LobbyError { message } => Some(LobbyOutcome::Failed {
                message: message.clone(),
                request: self.pending.take(),
            }),
            ServerMessage::HostChanged => {
                if let Some(lobby) = &mut self.active {
                    lobby.is_host = true;
                }
                Some(LobbyOutcome::HostChanged)
            }
            ServerMessage::LobbyList(lobbies) => {
                self.known_lobbies = lobbies.clone();
                Some(LobbyOutcome::ListUpdated)
            }
            _ => None,
        }
    }

    /// Connection lost: nothing on the server side survives
    pub fn reset(&mut self) {
        self.pending = None;
        self.active = None;
    }
}

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};

use crate::lobby::code::{self, LobbyCode};
use crate::lobby::player::ParticipantId;
use crate::lobby::room::{sanitize_map_name, Lobby, LobbySnapshot, LobbySummary};

/// Table of live lobbies and who is in which
pub struct LobbyTable {
    lobbies: HashMap<LobbyCode, Lobby>,
    memberships: HashMap<ParticipantId, LobbyCode>,
    max_lobbies: usize,
    rng: StdRng,
}

impl LobbyTable {
    pub fn new(max_lobbies: usize) -> Self {
        Self::with_rng(max_lobbies, StdRng::from_entropy())
    }

    /// Deterministic code generation for tests
    pub fn with_seed(max_lobbies: usize, seed: u64) -> Self {
        Self::with_rng(max_lobbies, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_lobbies: usize, rng: StdRng) -> Self {
        Self {
            lobbies: HashMap::new(),
            memberships: HashMap::new(),
            max_lobbies,
            rng,
        }
    }

    /// Create a lobby hosted by `requester`
    pub fn create(
        &mut self,
        requester: &ParticipantId,
        map_name: &str,
    ) -> Result<LobbyCode, LobbyError> {
        if self.memberships.contains_key(requester) {
            return Err(LobbyError::AlreadyInLobby);
        }
        if self.lobbies.len() >= self.max_lobbies {
            return Err(LobbyError::TooManyLobbies);
        }
        let map_name = sanitize_map_name(map_name).ok_or(LobbyError::InvalidMapName)?;

        let lobbies = &self.lobbies;
        let code = code::generate_unique(&mut self.rng, |c| lobbies.contains_key(c));

        self.lobbies
            .insert(code.clone(), Lobby::new(code.clone(), requester.clone(), map_name));
        self.memberships.insert(requester.clone(), code.clone());

        Ok(code)
    }

    /// Add a participant to an existing lobby
    pub fn join(
        &mut self,
        code: &LobbyCode,
        participant: &ParticipantId,
    ) -> Result<LobbySnapshot, LobbyError> {
        if self.memberships.contains_key(participant) {
            return Err(LobbyError::AlreadyInLobby);
        }

        let lobby = self
            .lobbies
            .get_mut(code)
            .ok_or(LobbyError::LobbyNotFound)?;

        lobby.add_member(participant.clone());
        self.memberships.insert(participant.clone(), code.clone());

        Ok(lobby.snapshot())
    }

    /// Leave whichever lobby contains `participant`
    pub fn leave(&mut self, participant: &ParticipantId) -> Option<Departure> {
        let code = self.memberships.get(participant)?.clone();
        self.leave_from(&code, participant)
    }

    /// Leave a specific lobby
    pub fn leave_from(
        &mut self,
        code: &LobbyCode,
        participant: &ParticipantId,
    ) -> Option<Departure> {
        let lobby = self.lobbies.get_mut(code)?;
        if !lobby.contains(participant) {
            return None;
        }

        let new_host = lobby.remove_member(participant);
        self.memberships.remove(participant);

        let remaining = lobby.members().to_vec();
        let closed = lobby.is_empty();
        if closed {
            self.lobbies.remove(code);
        }

        Some(Departure {
            code: code.clone(),
            remaining,
            new_host,
            closed,
        })
    }

    /// Browser view of every live lobby
    pub fn list_all(&self) -> BTreeMap<LobbyCode, LobbySummary> {
        self.lobbies
            .iter()
            .map(|(code, lobby)| (code.clone(), lobby.summary()))
            .collect()
    }

    pub fn lobby_of(&self, participant: &ParticipantId) -> Option<&LobbyCode> {
        self.memberships.get(participant)
    }

    pub fn get(&self, code: &LobbyCode) -> Option<&Lobby> {
        self.lobbies.get(code)
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }

    /// Participants currently in some lobby
    pub fn member_total(&self) -> usize {
        self.memberships.len()
    }
}

impl Default for LobbyTable {
    fn default() -> Self {
        Self::new(100)
    }
}

/// What happened when a participant left a lobby
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub code: LobbyCode,
    /// Members still in the lobby, join order
    pub remaining: Vec<ParticipantId>,
    /// Set when the host left and the role moved
    pub new_host: Option<ParticipantId>,
    /// Lobby was deleted because nobody is left
    pub closed: bool,
}

/// Lobby errors, reported to the requesting connection as `lobbyError`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby not found")]
    LobbyNotFound,
    #[error("Already in a lobby")]
    AlreadyInLobby,
    #[error("Too many lobbies")]
    TooManyLobbies,
    #[error("Invalid map name")]
    InvalidMapName,
}

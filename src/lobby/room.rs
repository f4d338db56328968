use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::lobby::code::LobbyCode;
use crate::lobby::player::ParticipantId;

/// Maximum length of a sanitized map name
pub const MAX_MAP_NAME_LEN: usize = 32;

/// Members in join order; most lobbies are small
pub type MemberList = SmallVec<[ParticipantId; 8]>;

/// A live lobby: host, members and the selected map
#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: LobbyCode,
    pub map_name: String,
    host: ParticipantId,
    members: MemberList,
}

impl Lobby {
    pub fn new(code: LobbyCode, host: ParticipantId, map_name: String) -> Self {
        let mut members = MemberList::new();
        members.push(host.clone());
        Self {
            code,
            map_name,
            host,
            members,
        }
    }

    pub fn host(&self) -> &ParticipantId {
        &self.host
    }

    /// Members in join order
    pub fn members(&self) -> &[ParticipantId] {
        &self.members
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.members.iter().any(|m| m == id)
    }

    pub fn add_member(&mut self, id: ParticipantId) {
        if !self.contains(&id) {
            self.members.push(id);
        }
    }

    /// Remove a member. Returns the new host when the host left and
    /// someone is still here to take over.
    pub fn remove_member(&mut self, id: &ParticipantId) -> Option<ParticipantId> {
        let index = self.members.iter().position(|m| m == id)?;
        self.members.remove(index);

        if &self.host == id {
            // Earliest-joined survivor takes over
            let next = self.members.first()?.clone();
            self.host = next.clone();
            return Some(next);
        }
        None
    }

    pub fn snapshot(&self) -> LobbySnapshot {
        LobbySnapshot {
            code: self.code.clone(),
            map_name: self.map_name.clone(),
            host: self.host.clone(),
            players: self.members.to_vec(),
        }
    }

    pub fn summary(&self) -> LobbySummary {
        LobbySummary {
            host: self.host.clone(),
            map_name: self.map_name.clone(),
            player_count: self.members.len() as u32,
        }
    }
}

/// Full view of a lobby handed to a joining participant
#[derive(Debug, Clone, PartialEq)]
pub struct LobbySnapshot {
    pub code: LobbyCode,
    pub map_name: String,
    pub host: ParticipantId,
    pub players: Vec<ParticipantId>,
}

/// Lobby browser entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbySummary {
    pub host: ParticipantId,
    pub map_name: String,
    pub player_count: u32,
}

/// Trim, strip control characters and cap the length. `None` if nothing is left.
pub fn sanitize_map_name(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_MAP_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_end().to_string();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

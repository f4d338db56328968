use std::collections::HashMap;

use crate::lobby::player::{ParticipantId, ParticipantState, StateUpdate};

/// Last-known state of every connected participant
#[derive(Debug, Default)]
pub struct ParticipantRegistry {
    participants: HashMap<ParticipantId, ParticipantState>,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with the default state.
    ///
    /// Re-registering an existing id resets it.
    pub fn register(&mut self, id: ParticipantId) -> &ParticipantState {
        let entry = self.participants.entry(id).or_default();
        *entry = ParticipantState::default();
        entry
    }

    /// Merge a reported update into the stored state.
    ///
    /// Numbered updates older than the last applied one are rejected.
    pub fn update(
        &mut self,
        id: &ParticipantId,
        update: &StateUpdate,
    ) -> Result<&ParticipantState, RegistryError> {
        let state = self
            .participants
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownParticipant(id.clone()))?;
        if state.is_stale(update) {
            return Err(RegistryError::StaleUpdate(id.clone()));
        }
        state.apply(update);
        Ok(state)
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<ParticipantState> {
        self.participants.remove(id)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&ParticipantState> {
        self.participants.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.participants.contains_key(id)
    }

    /// Every registered participant with its state, used to backfill newcomers
    pub fn snapshot_all(&self) -> Vec<(ParticipantId, ParticipantState)> {
        self.participants
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participants.keys()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }
}

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown participant: {0}")]
    UnknownParticipant(ParticipantId),
    #[error("Out-of-order update from {0}")]
    StaleUpdate(ParticipantId),
}

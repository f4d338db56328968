//! Participants and lobbies
//!
//! Registry of connected participants plus the table of live lobbies.
//! Both are owned by the session coordinator.

pub mod code;
pub mod manager;
pub mod player;
pub mod registry;
pub mod room;

pub use code::LobbyCode;
pub use manager::{Departure, LobbyError, LobbyTable};
pub use player::{AnimationTag, ParticipantId, ParticipantState, StateUpdate};
pub use registry::{ParticipantRegistry, RegistryError};
pub use room::{Lobby, LobbySnapshot, LobbySummary};

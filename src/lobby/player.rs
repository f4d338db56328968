use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::util::vec3::Vec3;

/// Spawn point every participant starts at until its first report
pub const SPAWN_POSITION: Vec3 = Vec3::new(0.0, 1.0, -2.0);

/// Connection-scoped participant identifier.
///
/// Assigned by the transport when a session is accepted; clients never pick it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Generate a fresh identifier for a newly accepted connection
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Animation a participant reports as currently playing.
///
/// Serialized as the clip name so custom clips from the asset layer pass
/// through the server untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnimationTag {
    #[default]
    Idle,
    Walking,
    Jump,
    Punch,
    Clip(String),
}

impl AnimationTag {
    pub fn as_str(&self) -> &str {
        match self {
            AnimationTag::Idle => "idle",
            AnimationTag::Walking => "walking",
            AnimationTag::Jump => "jump",
            AnimationTag::Punch => "punch",
            AnimationTag::Clip(name) => name,
        }
    }
}

impl From<String> for AnimationTag {
    fn from(value: String) -> Self {
        match value.as_str() {
            "idle" => AnimationTag::Idle,
            "walking" => AnimationTag::Walking,
            "jump" => AnimationTag::Jump,
            "punch" => AnimationTag::Punch,
            _ => AnimationTag::Clip(value),
        }
    }
}

impl From<&str> for AnimationTag {
    fn from(value: &str) -> Self {
        AnimationTag::from(value.to_string())
    }
}

impl From<AnimationTag> for String {
    fn from(tag: AnimationTag) -> Self {
        match tag {
            AnimationTag::Clip(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for AnimationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    pub position: Vec3,
    /// Yaw in radians
    pub rotation: f32,
    pub animation: AnimationTag,
    /// Highest sequence number applied so far
    pub last_seq: Option<u32>,
}

impl Default for ParticipantState {
    fn default() -> Self {
        Self {
            position: SPAWN_POSITION,
            rotation: 0.0,
            animation: AnimationTag::Idle,
            last_seq: None,
        }
    }
}

impl ParticipantState {
    /// An update numbered at or below one already applied arrived out of order
    pub fn is_stale(&self, update: &StateUpdate) -> bool {
        matches!((self.last_seq, update.seq), (Some(last), Some(seq)) if seq <= last)
    }

    /// Overwrite with a reported update; omitted optional fields keep their value
    pub fn apply(&mut self, update: &StateUpdate) {
        if update.seq.is_some() {
            self.last_seq = update.seq;
        }
        self.position = update.position;
        if let Some(rotation) = update.rotation {
            self.rotation = rotation;
        }
        if let Some(animation) = &update.animation_state {
            self.animation = animation.clone();
        }
    }
}

/// State a client reports about itself (`playerJoined` / `playerUpdate`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateUpdate {
    pub position: Vec3,
    #[serde(default)]
    pub animation_state: Option<AnimationTag>,
    #[serde(default)]
    pub rotation: Option<f32>,
    /// Sender-side counter; datagrams may arrive reordered
    #[serde(default)]
    pub seq: Option<u32>,
}

impl StateUpdate {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            animation_state: None,
            rotation: None,
            seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u32) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn with_animation(mut self, tag: impl Into<AnimationTag>) -> Self {
        self.animation_state = Some(tag.into());
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = Some(rotation);
        self
    }

    /// Reject NaN/Infinity before it reaches any peer
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.map_or(true, f32::is_finite)
    }
}

//! `RemoteMirror` – local reconstruction of every other participant.
//!
//! Populated from relayed `playerJoined` / `playerUpdate` / `playerLeft`
//! events and ticked once per frame on the render thread. Each entry owns
//! its avatar node, its physics proxy body and its animation state machine.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::client::animation::{AnimationStateMachine, ClipSet};
use crate::client::scene::{PhysicsWorld, SceneGraph};
use crate::lobby::{AnimationTag, ParticipantId};
use crate::net::protocol::{PlayerPayload, ServerMessage};
use crate::util::vec3::Vec3;

/// One mirrored remote participant
#[derive(Debug)]
pub struct RemoteParticipant<N, B> {
    pub node: N,
    pub body: B,
    /// Last reported yaw
    pub rotation: f32,
    /// Tag from the most recent event that carried one
    pub last_reported: Option<AnimationTag>,
    pub animation: AnimationStateMachine,
}

pub struct RemoteMirror<N, B> {
    local_id: Option<ParticipantId>,
    entries: HashMap<ParticipantId, RemoteParticipant<N, B>>,
    clips: Arc<ClipSet>,
}

impl<N, B> RemoteMirror<N, B> {
    pub fn new(clips: Arc<ClipSet>) -> Self {
        Self {
            local_id: None,
            entries: HashMap::new(),
            clips,
        }
    }

    /// Own id, as announced by the server's `welcome`
    pub fn set_local_id(&mut self, id: ParticipantId) {
        self.local_id = Some(id);
    }

    pub fn local_id(&self) -> Option<&ParticipantId> {
        self.local_id.as_ref()
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&RemoteParticipant<N, B>> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_local(&self, id: &ParticipantId) -> bool {
        self.local_id.as_ref() == Some(id)
    }

    /// Apply one server message. Returns true if the mirror changed.
    pub fn apply<S, P>(&mut self, message: &ServerMessage, scene: &mut S, physics: &mut P) -> bool
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        match message {
            ServerMessage::Welcome { id } => {
                self.set_local_id(id.clone());
                // A stale entry for ourselves must never render
                self.remove(id, scene, physics)
            }
            ServerMessage::PlayerJoined(payload) => self.on_joined(payload, scene, physics),
            ServerMessage::PlayerUpdate(payload) => self.on_updated(payload, scene, physics),
            ServerMessage::PlayerLeft { id } => self.remove(id, scene, physics),
            _ => false,
        }
    }

    /// `playerJoined`: create the entry, or treat as an update if it exists
    pub fn on_joined<S, P>(&mut self, payload: &PlayerPayload, scene: &mut S, physics: &mut P) -> bool
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        if self.is_local(&payload.id) {
            return false;
        }
        if self.entries.contains_key(&payload.id) {
            return self.on_updated(payload, scene, physics);
        }

        debug!("Mirroring remote participant {}", payload.id);
        let node = scene.spawn_avatar(&payload.id, payload.position);
        let body = physics.create_body(payload.position);
        let mut animation = AnimationStateMachine::new(self.clips.clone());
        if let Some(tag) = &payload.animation_state {
            animation.transition(tag.clone());
        }
        let rotation = payload.rotation.unwrap_or(0.0);
        scene.set_transform(&node, payload.position, rotation);

        self.entries.insert(
            payload.id.clone(),
            RemoteParticipant {
                node,
                body,
                rotation,
                last_reported: payload.animation_state.clone(),
                animation,
            },
        );
        true
    }

    /// `playerUpdate`: move the proxy, turn, switch animation
    pub fn on_updated<S, P>(&mut self, payload: &PlayerPayload, scene: &mut S, physics: &mut P) -> bool
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        if self.is_local(&payload.id) {
            return false;
        }
        let Some(entry) = self.entries.get_mut(&payload.id) else {
            // Update before join: create implicitly
            return self.on_joined(payload, scene, physics);
        };

        physics.set_translation(&entry.body, payload.position);
        if let Some(rotation) = payload.rotation {
            entry.rotation = rotation;
        }
        // Repeats of the same report must not restart a finished one-shot
        if let Some(tag) = &payload.animation_state {
            if entry.last_reported.as_ref() != Some(tag) {
                entry.last_reported = Some(tag.clone());
                entry.animation.transition(tag.clone());
            }
        }
        true
    }

    /// `playerLeft`: drop the entry and its engine objects. Unknown ids are a no-op.
    pub fn remove<S, P>(&mut self, id: &ParticipantId, scene: &mut S, physics: &mut P) -> bool
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        match self.entries.remove(id) {
            Some(entry) => {
                debug!("Removing remote participant {}", id);
                scene.despawn(entry.node);
                physics.remove_body(entry.body);
                true
            }
            None => false,
        }
    }

    /// Remove everything (connection lost, lobby switch on the client)
    pub fn clear<S, P>(&mut self, scene: &mut S, physics: &mut P)
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        for (_, entry) in self.entries.drain() {
            scene.despawn(entry.node);
            physics.remove_body(entry.body);
        }
    }

    /// Per-frame: sync visuals to physics, advance animations, push poses
    pub fn tick<S, P>(&mut self, dt: f32, scene: &mut S, physics: &P)
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        for entry in self.entries.values_mut() {
            let position: Vec3 = physics.translation(&entry.body);
            scene.set_transform(&entry.node, position, entry.rotation);
            entry.animation.advance(dt);
            scene.apply_pose(&entry.node, &entry.animation.pose());
        }
    }
}

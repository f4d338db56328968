//! The participant driven by this client's input.

use crate::client::link::Outbound;
use crate::client::movement::{apply_movement, InputState, MovementState, WALK_SPEED_THRESHOLD};
use crate::client::scene::PhysicsWorld;
use crate::lobby::{AnimationTag, StateUpdate};
use crate::net::protocol::ClientMessage;

/// Position change (metres) that is worth reporting
const POSITION_EPSILON: f32 = 0.001;
const YAW_EPSILON: f32 = 1e-4;
/// Minimum spacing of movement-only updates, independent of frame rate
pub const SEND_INTERVAL: f32 = 1.0 / 30.0;

#[derive(Debug)]
pub struct LocalPlayer<B> {
    body: B,
    yaw: f32,
    animation: AnimationTag,
    last_sent: Option<StateUpdate>,
    /// Seconds since `last_sent` went out
    since_sent: f32,
    next_seq: u32,
}

impl<B> LocalPlayer<B> {
    pub fn new(body: B) -> Self {
        Self {
            body,
            yaw: 0.0,
            animation: AnimationTag::Idle,
            last_sent: None,
            since_sent: 0.0,
            next_seq: 0,
        }
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn animation(&self) -> &AnimationTag {
        &self.animation
    }

    fn current_update<P: PhysicsWorld<Body = B>>(&self, physics: &P) -> StateUpdate {
        StateUpdate::at(physics.translation(&self.body))
            .with_rotation(self.yaw)
            .with_animation(self.animation.clone())
    }

    /// Stamp and remember an update that is about to go out
    fn mark_sent(&mut self, update: StateUpdate) -> StateUpdate {
        let update = update.with_seq(self.next_seq);
        self.next_seq = self.next_seq.wrapping_add(1);
        self.since_sent = 0.0;
        self.last_sent = Some(update.clone());
        update
    }

    /// Announcement sent once the link reports it is connected
    pub fn joined_message<P: PhysicsWorld<Body = B>>(&mut self, physics: &P) -> ClientMessage {
        let update = self.current_update(physics);
        ClientMessage::PlayerJoined(self.mark_sent(update))
    }

    /// Apply one frame of input.
    ///
    /// Animation changes go out at once and reliably. Movement alone is
    /// held back to one update per [`SEND_INTERVAL`]; the newest state wins.
    /// Updates sent while the body is at rest are reliable so the final
    /// resting state cannot be lost.
    pub fn tick<P: PhysicsWorld<Body = B>>(
        &mut self,
        dt: f32,
        input: &InputState,
        physics: &mut P,
    ) -> Option<Outbound> {
        self.since_sent += dt.max(0.0);
        apply_movement(physics, &self.body, input);

        let velocity = physics.linear_velocity(&self.body);
        let moving = velocity.horizontal_length() > WALK_SPEED_THRESHOLD;
        if moving {
            self.yaw = velocity.yaw();
        }
        self.animation = MovementState::sample(input, velocity).animation();

        let update = self.current_update(physics);
        let animation_changed = match &self.last_sent {
            Some(last) => last.animation_state != update.animation_state,
            None => true,
        };
        if !animation_changed && (!self.has_changed(&update) || self.since_sent < SEND_INTERVAL) {
            return None;
        }

        let message = ClientMessage::PlayerUpdate(self.mark_sent(update));
        if animation_changed || !moving {
            Some(Outbound::reliable(message))
        } else {
            Some(Outbound::unreliable(message))
        }
    }

    fn has_changed(&self, update: &StateUpdate) -> bool {
        let Some(last) = &self.last_sent else {
            return true;
        };
        let yaw_changed = match (last.rotation, update.rotation) {
            (Some(a), Some(b)) => (a - b).abs() > YAW_EPSILON,
            (a, b) => a != b,
        };
        last.position.distance_to(update.position) > POSITION_EPSILON
            || yaw_changed
            || last.animation_state != update.animation_state
    }
}

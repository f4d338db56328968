//! Narrow interfaces to the engine the client runs inside.
//!
//! Rendering and rigid-body stepping live outside this crate; the mirror and
//! the movement sampler only ever talk to them through these two traits.

use crate::client::animation::AnimationPose;
use crate::lobby::ParticipantId;
use crate::util::vec3::Vec3;

/// Visual side: avatar nodes in the scene
pub trait SceneGraph {
    type Node;

    /// Instantiate an avatar for `id` at `position`
    fn spawn_avatar(&mut self, id: &ParticipantId, position: Vec3) -> Self::Node;

    fn despawn(&mut self, node: Self::Node);

    /// Place a node; `yaw` in radians around +Y
    fn set_transform(&mut self, node: &Self::Node, position: Vec3, yaw: f32);

    /// Push the current blend of animation layers to the node's mixer
    fn apply_pose(&mut self, node: &Self::Node, pose: &AnimationPose);
}

/// Physics side: one rigid body per avatar
pub trait PhysicsWorld {
    type Body;

    fn create_body(&mut self, position: Vec3) -> Self::Body;
    fn remove_body(&mut self, body: Self::Body);

    fn set_translation(&mut self, body: &Self::Body, position: Vec3);
    fn translation(&self, body: &Self::Body) -> Vec3;

    fn linear_velocity(&self, body: &Self::Body) -> Vec3;
    fn set_linear_velocity(&mut self, body: &Self::Body, velocity: Vec3);

    fn apply_impulse(&mut self, body: &Self::Body, impulse: Vec3);
}

//! Local input to physics impulses, and the animation tag that goes with it.

use crate::client::scene::PhysicsWorld;
use crate::lobby::AnimationTag;
use crate::util::vec3::Vec3;

/// Horizontal impulse per held direction key per frame
pub const MOVE_IMPULSE: f32 = 0.5;
/// Per-axis horizontal speed cap
pub const MAX_AXIS_SPEED: f32 = 3.0;
/// Per-axis cap when moving diagonally (3 / sqrt 2)
pub const MAX_DIAGONAL_SPEED: f32 = 2.12132;
pub const JUMP_IMPULSE: f32 = 10.0;
/// Vertical speed under which the body counts as standing
pub const GROUNDED_VY: f32 = 0.1;
/// Horizontal speed over which the body counts as walking
pub const WALK_SPEED_THRESHOLD: f32 = 0.1;

/// Keys held this frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
    pub punch: bool,
}

impl InputState {
    pub fn has_direction(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }

    /// Sum of the per-key impulses. Forward is -Z, right is +X.
    pub fn move_impulse(&self) -> Vec3 {
        let mut impulse = Vec3::ZERO;
        if self.forward {
            impulse.z -= MOVE_IMPULSE;
        }
        if self.back {
            impulse.z += MOVE_IMPULSE;
        }
        if self.left {
            impulse.x -= MOVE_IMPULSE;
        }
        if self.right {
            impulse.x += MOVE_IMPULSE;
        }
        impulse
    }
}

pub fn is_grounded(velocity: Vec3) -> bool {
    velocity.y.abs() < GROUNDED_VY
}

/// Clamp each horizontal axis, then tighten both when moving diagonally
pub fn clamp_horizontal(velocity: Vec3) -> Vec3 {
    let mut x = velocity.x.clamp(-MAX_AXIS_SPEED, MAX_AXIS_SPEED);
    let mut z = velocity.z.clamp(-MAX_AXIS_SPEED, MAX_AXIS_SPEED);
    if x.abs() > MAX_DIAGONAL_SPEED && z.abs() > MAX_DIAGONAL_SPEED {
        x = x.clamp(-MAX_DIAGONAL_SPEED, MAX_DIAGONAL_SPEED);
        z = z.clamp(-MAX_DIAGONAL_SPEED, MAX_DIAGONAL_SPEED);
    }
    Vec3::new(x, velocity.y, z)
}

/// Push `body` for one frame of `input`
pub fn apply_movement<P: PhysicsWorld>(physics: &mut P, body: &P::Body, input: &InputState) {
    let impulse = input.move_impulse();
    if impulse != Vec3::ZERO {
        physics.apply_impulse(body, impulse);
    }

    let velocity = clamp_horizontal(physics.linear_velocity(body));
    physics.set_linear_velocity(body, velocity);

    if input.jump && is_grounded(velocity) {
        physics.apply_impulse(body, Vec3::new(0.0, JUMP_IMPULSE, 0.0));
    }
}

/// Flags sampled once per frame after movement is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MovementState {
    pub walking: bool,
    pub jumping: bool,
    pub punching: bool,
}

impl MovementState {
    pub fn sample(input: &InputState, velocity: Vec3) -> Self {
        Self {
            punching: input.punch,
            jumping: !is_grounded(velocity) || input.jump,
            walking: input.has_direction() || velocity.horizontal_length() > WALK_SPEED_THRESHOLD,
        }
    }

    /// Punch beats jump beats walk
    pub fn animation(&self) -> AnimationTag {
        if self.punching {
            AnimationTag::Punch
        } else if self.jumping {
            AnimationTag::Jump
        } else if self.walking {
            AnimationTag::Walking
        } else {
            AnimationTag::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::scene::testing::PointPhysics;

    fn held(f: impl FnOnce(&mut InputState)) -> InputState {
        let mut input = InputState::default();
        f(&mut input);
        input
    }

    #[test]
    fn test_direction_impulses() {
        let input = held(|i| {
            i.forward = true;
            i.right = true;
        });
        assert_eq!(input.move_impulse(), Vec3::new(0.5, 0.0, -0.5));

        let opposed = held(|i| {
            i.left = true;
            i.right = true;
        });
        assert_eq!(opposed.move_impulse(), Vec3::ZERO);
    }

    #[test]
    fn test_axis_clamp() {
        let v = clamp_horizontal(Vec3::new(5.0, -4.0, 1.0));
        assert_eq!(v, Vec3::new(3.0, -4.0, 1.0));
    }

    #[test]
    fn test_diagonal_clamp() {
        let v = clamp_horizontal(Vec3::new(3.0, 0.0, -2.5));
        assert_eq!(v, Vec3::new(MAX_DIAGONAL_SPEED, 0.0, -MAX_DIAGONAL_SPEED));

        // Only one axis fast: untouched
        let v = clamp_horizontal(Vec3::new(3.0, 0.0, 2.0));
        assert_eq!(v, Vec3::new(3.0, 0.0, 2.0));
    }

    #[test]
    fn test_apply_movement_accumulates_to_cap() {
        let mut physics = PointPhysics::default();
        let body = physics.create_body(Vec3::ZERO);
        let input = held(|i| i.forward = true);

        for _ in 0..10 {
            apply_movement(&mut physics, &body, &input);
        }

        assert_eq!(physics.linear_velocity(&body), Vec3::new(0.0, 0.0, -MAX_AXIS_SPEED));
    }

    #[test]
    fn test_jump_only_when_grounded() {
        let mut physics = PointPhysics::default();
        let body = physics.create_body(Vec3::ZERO);
        let input = held(|i| i.jump = true);

        apply_movement(&mut physics, &body, &input);
        assert_eq!(physics.linear_velocity(&body).y, JUMP_IMPULSE);

        apply_movement(&mut physics, &body, &input);
        assert_eq!(physics.linear_velocity(&body).y, JUMP_IMPULSE);
    }

    #[test]
    fn test_animation_priority() {
        let airborne = Vec3::new(0.0, 4.0, 0.0);
        let all = held(|i| {
            i.forward = true;
            i.punch = true;
        });
        assert_eq!(MovementState::sample(&all, airborne).animation(), AnimationTag::Punch);

        let walking_in_air = held(|i| i.forward = true);
        assert_eq!(
            MovementState::sample(&walking_in_air, airborne).animation(),
            AnimationTag::Jump
        );
        assert_eq!(
            MovementState::sample(&walking_in_air, Vec3::ZERO).animation(),
            AnimationTag::Walking
        );
        assert_eq!(
            MovementState::sample(&InputState::default(), Vec3::new(1.0, 0.0, 0.0)).animation(),
            AnimationTag::Walking
        );
        assert_eq!(
            MovementState::sample(&InputState::default(), Vec3::ZERO).animation(),
            AnimationTag::Idle
        );
    }
}

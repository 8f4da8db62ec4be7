//! Deterministic movement shared by client prediction and the server authority
//!
//! [`apply`] is the only place entity kinematics change. It is invoked live on
//! the client, once per frame on the server, and again during replay after a
//! misprediction, so it must depend on nothing but its arguments.

use crate::input::InputFrame;
use crate::math::{wrap_degrees, Vec3};
use crate::snapshot::EntityState;
use serde::{Deserialize, Serialize};

pub const WALK_SPEED: f32 = 4.0;
pub const RUN_SPEED: f32 = 7.0;
pub const BACKWARD_MULTIPLIER: f32 = 0.5;
pub const YAW_SENSITIVITY: f32 = 100.0;
pub const PITCH_SENSITIVITY: f32 = 100.0;
pub const PITCH_LIMIT: f32 = 60.0;
pub const JUMP_HEIGHT: f32 = 1.2;
pub const GRAVITY: f32 = -15.0;
pub const GROUND_HEIGHT: f32 = 0.0;

/// Tuning for [`apply`]. Client and server must run with identical values or
/// every frame will mispredict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovementConfig {
    pub walk_speed: f32,
    pub run_speed: f32,
    /// Applied to `walk_speed` when moving backwards
    pub backward_multiplier: f32,
    pub yaw_sensitivity: f32,
    pub pitch_sensitivity: f32,
    /// Symmetric camera pitch clamp in degrees
    pub pitch_limit: f32,
    pub jump_height: f32,
    /// Negative is down
    pub gravity: f32,
    pub ground_height: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            walk_speed: WALK_SPEED,
            run_speed: RUN_SPEED,
            backward_multiplier: BACKWARD_MULTIPLIER,
            yaw_sensitivity: YAW_SENSITIVITY,
            pitch_sensitivity: PITCH_SENSITIVITY,
            pitch_limit: PITCH_LIMIT,
            jump_height: JUMP_HEIGHT,
            gravity: GRAVITY,
            ground_height: GROUND_HEIGHT,
        }
    }
}

impl MovementConfig {
    /// Initial upward velocity that reaches `jump_height` under `gravity`.
    pub fn jump_velocity(&self) -> f32 {
        (self.jump_height * -2.0 * self.gravity).sqrt()
    }
}

/// Unit vector the entity faces for a yaw in degrees (clockwise from +z).
pub fn forward(yaw: f32) -> Vec3 {
    let radians = yaw.to_radians();
    Vec3::new(radians.sin(), 0.0, radians.cos())
}

/// Unit vector to the entity's right for a yaw in degrees.
pub fn right(yaw: f32) -> Vec3 {
    let radians = yaw.to_radians();
    Vec3::new(radians.cos(), 0.0, -radians.sin())
}

fn movement_speed(frame: &InputFrame, config: &MovementConfig) -> f32 {
    // Sprinting only counts when running straight ahead
    let sprinting = frame.sprinting && frame.move_x == 0.0 && frame.move_z > 0.0;

    if sprinting {
        config.run_speed
    } else if frame.move_z < 0.0 {
        config.walk_speed * config.backward_multiplier
    } else {
        config.walk_speed
    }
}

/// Applies one input frame to an entity state and returns the new state.
pub fn apply(state: &EntityState, frame: &InputFrame, config: &MovementConfig) -> EntityState {
    let dt = frame.delta_time;
    let mut next = *state;

    next.yaw = wrap_degrees(state.yaw + frame.look_yaw * config.yaw_sensitivity * dt);
    next.pitch = (state.pitch + frame.look_pitch * config.pitch_sensitivity * dt)
        .clamp(-config.pitch_limit, config.pitch_limit);

    let horizontal = if state.grounded {
        let direction = forward(next.yaw)
            .scale(frame.move_z)
            .add(&right(next.yaw).scale(frame.move_x))
            .normalize();
        direction.scale(movement_speed(frame, config))
    } else {
        state.carried_velocity
    };
    next.carried_velocity = horizontal.horizontal();
    next.position = next.position.add(&next.carried_velocity.scale(dt));

    if frame.jump_requested && state.grounded && !state.jumping {
        next.vertical_velocity = config.jump_velocity();
        next.grounded = false;
        next.jumping = true;
    }

    if !next.grounded {
        next.vertical_velocity += config.gravity * dt;
    }
    next.position.y += next.vertical_velocity * dt;

    if next.position.y <= config.ground_height && next.vertical_velocity <= 0.0 {
        next.position.y = config.ground_height;
        next.vertical_velocity = 0.0;
        next.grounded = true;
        next.jumping = false;
    } else if next.position.y > config.ground_height {
        next.grounded = false;
    }

    next
}

/// Applies a run of frames in order, returning the final state.
pub fn apply_all<'a, I>(state: &EntityState, frames: I, config: &MovementConfig) -> EntityState
where
    I: IntoIterator<Item = &'a InputFrame>,
{
    frames
        .into_iter()
        .fold(*state, |current, frame| apply(&current, frame, config))
}

use crate::math::{angle_approx_eq, Vec3};
use serde::{Deserialize, Serialize};

/// Kinematic state of a player entity.
///
/// The server holds the single authoritative copy; the client keeps a
/// speculative copy that is rewritten wholesale on reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub position: Vec3,
    /// Facing in degrees, `[0, 360)`
    pub yaw: f32,
    /// Camera pitch in degrees. Visual only, never reconciled.
    pub pitch: f32,
    pub grounded: bool,
    pub vertical_velocity: f32,
    pub jumping: bool,
    /// Horizontal velocity from the last grounded tick, kept while airborne
    pub carried_velocity: Vec3,
}

impl EntityState {
    pub fn new(position: Vec3, yaw: f32) -> Self {
        Self {
            position,
            yaw,
            pitch: 0.0,
            grounded: true,
            vertical_velocity: 0.0,
            jumping: false,
            carried_velocity: Vec3::ZERO,
        }
    }
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 0.0)
    }
}

/// Entity state produced by applying one [`crate::InputFrame`].
///
/// Only `sequence`, `position` and `yaw` take part in comparison. The
/// remaining fields let a hard snap restore a full kinematic baseline so the
/// replay that follows starts from what the server actually had.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub sequence: u32,
    pub position: Vec3,
    pub yaw: f32,
    pub vertical_velocity: f32,
    pub grounded: bool,
    pub jumping: bool,
    pub carried_velocity: Vec3,
}

impl ResultSnapshot {
    pub fn capture(sequence: u32, state: &EntityState) -> Self {
        Self {
            sequence,
            position: state.position,
            yaw: state.yaw,
            vertical_velocity: state.vertical_velocity,
            grounded: state.grounded,
            jumping: state.jumping,
            carried_velocity: state.carried_velocity,
        }
    }

    /// Exact on the sequence number, epsilon-tolerant on position (per axis)
    /// and yaw.
    pub fn matches(&self, other: &ResultSnapshot, epsilon: f32) -> bool {
        self.sequence == other.sequence
            && self.position.approx_eq(&other.position, epsilon)
            && angle_approx_eq(self.yaw, other.yaw, epsilon)
    }

    /// Rebuilds an entity state from this snapshot, keeping the caller's
    /// camera pitch.
    pub fn restore(&self, pitch: f32) -> EntityState {
        EntityState {
            position: self.position,
            yaw: self.yaw,
            pitch,
            grounded: self.grounded,
            vertical_velocity: self.vertical_velocity,
            jumping: self.jumping,
            carried_velocity: self.carried_velocity,
        }
    }
}

use serde::{Deserialize, Serialize};

/// Buffered input state between two simulation ticks.
///
/// This is what the local input devices have written so far; it becomes an
/// [`InputFrame`] once the predictor stamps it with a sequence number and the
/// tick's delta time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InputSample {
    pub move_x: f32,
    pub move_z: f32,
    pub look_yaw: f32,
    pub look_pitch: f32,
    pub jump_requested: bool,
    pub interact_requested: bool,
    pub sprinting: bool,
}

/// One tick's worth of local player input, uniquely numbered.
///
/// Frames are immutable once built: the same frame is applied locally,
/// shipped to the server, and replayed during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Monotonic per client, starting at 0
    pub sequence: u32,
    /// Seconds elapsed for this tick
    pub delta_time: f32,
    pub move_x: f32,
    pub move_z: f32,
    pub look_yaw: f32,
    pub look_pitch: f32,
    pub jump_requested: bool,
    pub interact_requested: bool,
    pub sprinting: bool,
}

impl InputFrame {
    pub fn from_sample(sequence: u32, delta_time: f32, sample: &InputSample) -> Self {
        Self {
            sequence,
            delta_time,
            move_x: sample.move_x.clamp(-1.0, 1.0),
            move_z: sample.move_z.clamp(-1.0, 1.0),
            look_yaw: sample.look_yaw,
            look_pitch: sample.look_pitch,
            jump_requested: sample.jump_requested,
            interact_requested: sample.interact_requested,
            sprinting: sample.sprinting,
        }
    }

    /// Checks a frame that arrived over the network before it is simulated.
    ///
    /// Frames with a non-finite field or a non-positive delta time are
    /// rejected. Otherwise the move axes are clamped to `[-1, 1]` and the
    /// delta time to at most `max_delta_time`.
    pub fn sanitized(&self, max_delta_time: f32) -> Option<Self> {
        let finite = [
            self.delta_time,
            self.move_x,
            self.move_z,
            self.look_yaw,
            self.look_pitch,
        ]
        .iter()
        .all(|value| value.is_finite());

        if !finite || self.delta_time <= 0.0 {
            return None;
        }

        Some(Self {
            delta_time: self.delta_time.min(max_delta_time),
            move_x: self.move_x.clamp(-1.0, 1.0),
            move_z: self.move_z.clamp(-1.0, 1.0),
            ..*self
        })
    }

    /// A frame with no input, only elapsed time.
    pub fn idle(sequence: u32, delta_time: f32) -> Self {
        Self::from_sample(sequence, delta_time, &InputSample::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_sample_clamps_axes() {
        let sample = InputSample {
            move_x: 3.0,
            move_z: -7.5,
            look_yaw: 12.0,
            ..Default::default()
        };

        let frame = InputFrame::from_sample(4, 0.016, &sample);

        assert_eq!(frame.sequence, 4);
        assert_eq!(frame.move_x, 1.0);
        assert_eq!(frame.move_z, -1.0);
        // look deltas are raw and never clamped
        assert_eq!(frame.look_yaw, 12.0);
    }

    #[test]
    fn test_idle_frame_has_no_input() {
        let frame = InputFrame::idle(9, 0.02);
        assert_eq!(frame.sequence, 9);
        assert_eq!(frame.delta_time, 0.02);
        assert!(!frame.jump_requested);
        assert!(!frame.sprinting);
        assert_eq!(frame.move_z, 0.0);
    }

    #[test]
    fn test_sanitized_rejects_non_finite_and_non_positive_time() {
        let mut frame = InputFrame::idle(1, 0.016);
        frame.delta_time = f32::NAN;
        assert_eq!(frame.sanitized(0.25), None);

        frame.delta_time = 0.0;
        assert_eq!(frame.sanitized(0.25), None);

        frame.delta_time = -0.5;
        assert_eq!(frame.sanitized(0.25), None);

        let mut frame = InputFrame::idle(2, 0.016);
        frame.look_yaw = f32::INFINITY;
        assert_eq!(frame.sanitized(0.25), None);
    }

    #[test]
    fn test_sanitized_clamps_time_and_axes() {
        let mut frame = InputFrame::idle(3, 30.0);
        frame.move_x = -4.0;
        frame.move_z = 2.5;
        frame.look_pitch = 720.0;

        let clean = frame.sanitized(0.25).unwrap();

        assert_eq!(clean.sequence, 3);
        assert_eq!(clean.delta_time, 0.25);
        assert_eq!(clean.move_x, -1.0);
        assert_eq!(clean.move_z, 1.0);
        assert_eq!(clean.look_pitch, 720.0);
    }

    #[test]
    fn test_sanitized_keeps_well_formed_frames() {
        let frame = InputFrame::idle(4, 1.0 / 60.0);
        assert_eq!(frame.sanitized(0.25), Some(frame));
    }
}

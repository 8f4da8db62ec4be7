//! Client input buffering and a scripted driver for headless play

use shared::InputSample;

/// Collects press/release events between ticks and hands out one
/// [`InputSample`] per simulation tick.
///
/// Held flags (sprint, axes) persist until released. Look deltas are also
/// held, matching a device that keeps reporting the same motion until it
/// stops.
#[derive(Debug, Default)]
pub struct InputRecorder {
    current: InputSample,
}

impl InputRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_move(&mut self, x: f32, z: f32) {
        self.current.move_x = x;
        self.current.move_z = z;
    }

    pub fn clear_move(&mut self) {
        self.set_move(0.0, 0.0);
    }

    pub fn set_look(&mut self, yaw: f32, pitch: f32) {
        self.current.look_yaw = yaw;
        self.current.look_pitch = pitch;
    }

    pub fn clear_look(&mut self) {
        self.set_look(0.0, 0.0);
    }

    pub fn set_jump(&mut self, pressed: bool) {
        self.current.jump_requested = pressed;
    }

    pub fn set_interact(&mut self, pressed: bool) {
        self.current.interact_requested = pressed;
    }

    pub fn set_sprint(&mut self, pressed: bool) {
        self.current.sprinting = pressed;
    }

    /// The buffered input as of this tick.
    pub fn sample(&self) -> InputSample {
        self.current
    }
}

/// Deterministic stand-in for a player at the keyboard.
///
/// Walks forward, sprints in bursts, strafes, turns slowly and jumps every
/// couple of seconds. Driven by tick count so a run is reproducible.
#[derive(Debug)]
pub struct ScriptedInput {
    tick: u64,
    tick_rate: u32,
}

impl ScriptedInput {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick: 0,
            tick_rate: tick_rate.max(1),
        }
    }

    /// Writes this tick's events into the recorder and advances the script.
    pub fn drive(&mut self, recorder: &mut InputRecorder) {
        let rate = self.tick_rate as u64;
        let second = self.tick / rate;
        let in_second = self.tick % rate;

        match second % 6 {
            0 | 1 => recorder.set_move(0.0, 1.0),
            2 => recorder.set_move(1.0, 0.0),
            3 => recorder.set_move(0.0, -1.0),
            4 => recorder.set_move(-1.0, 1.0),
            _ => recorder.clear_move(),
        }

        recorder.set_sprint(second % 6 == 1);
        recorder.set_look(if second % 3 == 0 { 0.3 } else { 0.0 }, 0.0);
        recorder.set_jump(second % 2 == 0 && in_second == 0);

        self.tick += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_holds_until_released() {
        let mut recorder = InputRecorder::new();
        recorder.set_move(0.0, 1.0);
        recorder.set_sprint(true);

        assert_eq!(recorder.sample().move_z, 1.0);
        assert!(recorder.sample().sprinting);

        recorder.clear_move();
        recorder.set_sprint(false);

        assert_eq!(recorder.sample(), InputSample::default());
    }

    #[test]
    fn test_script_is_reproducible() {
        let mut a = ScriptedInput::new(30);
        let mut b = ScriptedInput::new(30);
        let mut rec_a = InputRecorder::new();
        let mut rec_b = InputRecorder::new();

        for _ in 0..400 {
            a.drive(&mut rec_a);
            b.drive(&mut rec_b);
            assert_eq!(rec_a.sample(), rec_b.sample());
        }
    }

    #[test]
    fn test_script_jumps_on_even_seconds() {
        let mut script = ScriptedInput::new(10);
        let mut recorder = InputRecorder::new();
        let mut jumps = Vec::new();

        for tick in 0..40 {
            script.drive(&mut recorder);
            if recorder.sample().jump_requested {
                jumps.push(tick);
            }
        }

        assert_eq!(jumps, vec![0, 20]);
    }
}

//! Client-side prediction
//!
//! Every local tick the predictor numbers the buffered input, applies it to
//! the local entity straight away, ships it to the server, and remembers
//! both the frame and the state it produced. Those two histories are what
//! [`crate::reconciliation`] compares against and replays from when the
//! server's answer disagrees.

use log::debug;
use shared::{
    apply, EntityState, History, InputFrame, InputSample, MovementConfig, ResultSnapshot,
    ServerLink, DEFAULT_EPSILON, MAX_HISTORY_SIZE,
};

/// Tolerances for deciding whether a prediction held.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcileConfig {
    /// Per-axis position and yaw tolerance
    pub epsilon: f32,
    /// Bound on both input and result history
    pub history_capacity: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            history_capacity: MAX_HISTORY_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PredictionStats {
    pub predicted: u64,
    pub confirmed: u64,
    pub corrected: u64,
    pub resynced: u64,
    pub stale: u64,
    pub evicted: u64,
}

pub struct ClientPredictor {
    pub(crate) state: EntityState,
    pub(crate) movement: MovementConfig,
    pub(crate) config: ReconcileConfig,
    pub(crate) next_sequence: u32,
    pub(crate) last_acknowledged: Option<u32>,
    pub(crate) inputs: History<InputFrame>,
    pub(crate) results: History<ResultSnapshot>,
    pub(crate) stats: PredictionStats,
}

impl ClientPredictor {
    pub fn new(initial: EntityState, movement: MovementConfig, config: ReconcileConfig) -> Self {
        Self {
            state: initial,
            movement,
            config,
            next_sequence: 0,
            last_acknowledged: None,
            inputs: History::with_capacity(config.history_capacity),
            results: History::with_capacity(config.history_capacity),
            stats: PredictionStats::default(),
        }
    }

    /// Runs one local tick: number, apply, record, send, snapshot.
    pub fn predict<L: ServerLink>(
        &mut self,
        sample: &InputSample,
        delta_time: f32,
        link: &mut L,
    ) -> InputFrame {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let frame = InputFrame::from_sample(sequence, delta_time, sample);

        self.state = apply(&self.state, &frame, &self.movement);

        self.stats.evicted += self.inputs.insert(sequence, frame) as u64;

        link.send_to_server(&frame);

        let snapshot = ResultSnapshot::capture(sequence, &self.state);
        self.results.insert(sequence, snapshot);

        self.stats.predicted += 1;
        debug!(
            "Predicted #{} -> ({:.3}, {:.3}, {:.3}) yaw {:.2}",
            sequence, snapshot.position.x, snapshot.position.y, snapshot.position.z, snapshot.yaw
        );

        frame
    }

    /// Replaces the local entity wholesale, e.g. when the server assigns a
    /// spawn point. Drops all history since it described another baseline.
    pub fn reset(&mut self, state: EntityState) {
        self.state = state;
        self.inputs.clear();
        self.results.clear();
        self.last_acknowledged = self.next_sequence.checked_sub(1);
    }

    pub fn state(&self) -> &EntityState {
        &self.state
    }

    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    pub fn last_acknowledged(&self) -> Option<u32> {
        self.last_acknowledged
    }

    pub fn input_history(&self) -> &History<InputFrame> {
        &self.inputs
    }

    pub fn result_history(&self) -> &History<ResultSnapshot> {
        &self.results
    }

    pub fn stats(&self) -> PredictionStats {
        self.stats
    }
}

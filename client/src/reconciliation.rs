//! Server reconciliation
//!
//! When the authority reports the result of frame N, the locally predicted
//! result for N is looked up and compared. A match only prunes history. A
//! mismatch snaps the entity to the authoritative result and replays every
//! later buffered frame, in ascending order, rewriting the stored
//! predictions so the next comparison is made against the corrected
//! trajectory.

use crate::prediction::ClientPredictor;
use log::{debug, warn};
use shared::{apply, ResultSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Prediction held; history up to N pruned
    Confirmed,
    /// Prediction diverged; snapped and replayed this many frames
    Corrected { replayed: usize },
    /// No local prediction for N survived; snapped and replayed what remained
    Resynced { replayed: usize },
    /// N was already acknowledged; a late or duplicated delivery
    Stale,
    /// N was never predicted by this client
    Unknown,
}

impl ClientPredictor {
    /// Handles one authoritative result from the server.
    pub fn reconcile(&mut self, authoritative: &ResultSnapshot) -> ReconcileOutcome {
        let sequence = authoritative.sequence;

        if self.last_acknowledged.is_some_and(|acked| sequence <= acked) {
            debug!("Ignoring stale result #{}", sequence);
            self.stats.stale += 1;
            return ReconcileOutcome::Stale;
        }

        if sequence >= self.next_sequence {
            warn!(
                "Result #{} is ahead of anything predicted (next #{}), ignoring",
                sequence, self.next_sequence
            );
            return ReconcileOutcome::Unknown;
        }

        let outcome = match self.results.get(sequence).copied() {
            Some(predicted) if predicted.matches(authoritative, self.config.epsilon) => {
                self.stats.confirmed += 1;
                ReconcileOutcome::Confirmed
            }
            Some(predicted) => {
                warn!(
                    "Out of sync at #{}: predicted ({:.3}, {:.3}, {:.3}) yaw {:.2}, server ({:.3}, {:.3}, {:.3}) yaw {:.2}; re-syncing",
                    sequence,
                    predicted.position.x,
                    predicted.position.y,
                    predicted.position.z,
                    predicted.yaw,
                    authoritative.position.x,
                    authoritative.position.y,
                    authoritative.position.z,
                    authoritative.yaw
                );
                let replayed = self.snap_and_replay(authoritative);
                self.stats.corrected += 1;
                ReconcileOutcome::Corrected { replayed }
            }
            None => {
                warn!(
                    "Predicted result #{} missing from history (capacity {}), full re-sync",
                    sequence,
                    self.results.capacity()
                );
                let replayed = self.snap_and_replay(authoritative);
                self.stats.resynced += 1;
                ReconcileOutcome::Resynced { replayed }
            }
        };

        self.inputs.prune_through(sequence);
        self.results.prune_through(sequence);
        self.last_acknowledged = Some(sequence);

        outcome
    }

    /// Hard snap to `authoritative`, then re-apply every buffered frame after
    /// it in ascending order, overwriting the stored predictions.
    fn snap_and_replay(&mut self, authoritative: &ResultSnapshot) -> usize {
        self.state = authoritative.restore(self.state.pitch);

        let frames: Vec<_> = self
            .inputs
            .after(authoritative.sequence)
            .map(|(_, frame)| *frame)
            .collect();

        for frame in &frames {
            self.state = apply(&self.state, frame, &self.movement);
            self.results.insert(
                frame.sequence,
                ResultSnapshot::capture(frame.sequence, &self.state),
            );
        }

        debug!(
            "Replayed {} frames after #{}",
            frames.len(),
            authoritative.sequence
        );
        frames.len()
    }
}

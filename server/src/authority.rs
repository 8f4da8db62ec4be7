//! Authoritative simulation of player entities
//!
//! The server applies each client's input frames with the same movement
//! rules the client predicts with, and answers every consumed frame with the
//! resulting snapshot, addressed to that client alone.
//!
//! Frames come straight off the wire, so each one is sanitized first: frames
//! with non-finite values are dropped unanswered, and delta time and move axes
//! are clamped to what an honest client could send.

use clap::ValueEnum;
use log::{debug, info, warn};
use shared::{
    apply, ClientLink, EntityState, InputFrame, MovementConfig, ResultSnapshot, Vec3,
    MAX_FRAME_DELTA,
};
use std::collections::HashMap;

/// How a drained batch of frames is ordered before it is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum InputOrdering {
    /// Apply in the order the frames arrived, duplicates and all
    #[default]
    Arrival,
    /// Sort each batch by sequence and skip anything not newer than the
    /// last applied frame
    Sequence,
}

#[derive(Debug)]
pub struct Authority {
    entities: HashMap<u32, EntityState>,
    last_applied: HashMap<u32, u32>,
    movement: MovementConfig,
    ordering: InputOrdering,
}

impl Authority {
    pub fn new(movement: MovementConfig, ordering: InputOrdering) -> Self {
        Self {
            entities: HashMap::new(),
            last_applied: HashMap::new(),
            movement,
            ordering,
        }
    }

    /// Creates the entity a client will control and returns its initial
    /// state so it can be handed to the client.
    pub fn spawn(&mut self, client_id: u32) -> EntityState {
        let spawn_x = (client_id as f32 * 2.0) % 20.0;
        let state = EntityState::new(Vec3::new(spawn_x, self.movement.ground_height, 0.0), 0.0);

        info!(
            "Spawned entity for client {} at ({:.1}, {:.1}, {:.1})",
            client_id, state.position.x, state.position.y, state.position.z
        );
        self.entities.insert(client_id, state);
        state
    }

    pub fn despawn(&mut self, client_id: u32) -> bool {
        self.last_applied.remove(&client_id);
        if self.entities.remove(&client_id).is_some() {
            info!("Removed entity for client {}", client_id);
            true
        } else {
            false
        }
    }

    pub fn state(&self, client_id: u32) -> Option<&EntityState> {
        self.entities.get(&client_id)
    }

    pub fn last_applied(&self, client_id: u32) -> Option<u32> {
        self.last_applied.get(&client_id).copied()
    }

    /// Every entity with its owner, ordered by client ID.
    pub fn entities(&self) -> Vec<(u32, EntityState)> {
        let mut entities: Vec<(u32, EntityState)> = self
            .entities
            .iter()
            .map(|(client_id, state)| (*client_id, *state))
            .collect();
        entities.sort_by_key(|(client_id, _)| *client_id);
        entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Applies a batch of one client's frames and sends one result per
    /// applied frame back to that client. Returns how many were applied.
    pub fn consume<L: ClientLink>(
        &mut self,
        client_id: u32,
        mut frames: Vec<InputFrame>,
        link: &mut L,
    ) -> usize {
        let Some(mut state) = self.entities.get(&client_id).copied() else {
            warn!(
                "Dropping {} frames for client {} with no entity",
                frames.len(),
                client_id
            );
            return 0;
        };

        if self.ordering == InputOrdering::Sequence {
            frames.sort_by_key(|frame| frame.sequence);
        }

        let mut last = self.last_applied.get(&client_id).copied();
        let mut consumed = 0;

        for frame in &frames {
            if self.ordering == InputOrdering::Sequence
                && last.is_some_and(|applied| frame.sequence <= applied)
            {
                debug!(
                    "Skipping out-of-date frame #{} from client {}",
                    frame.sequence, client_id
                );
                continue;
            }

            let Some(frame) = frame.sanitized(MAX_FRAME_DELTA) else {
                warn!(
                    "Rejecting malformed frame #{} from client {}",
                    frame.sequence, client_id
                );
                continue;
            };

            state = apply(&state, &frame, &self.movement);
            link.send_to_client(client_id, &ResultSnapshot::capture(frame.sequence, &state));

            last = Some(last.map_or(frame.sequence, |applied| applied.max(frame.sequence)));
            consumed += 1;
        }

        self.entities.insert(client_id, state);
        if let Some(last) = last {
            self.last_applied.insert(client_id, last);
        }

        consumed
    }
}

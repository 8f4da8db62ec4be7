//! Smoothing of other players' entities
//!
//! Only the local player is predicted. Every other player is shown slightly
//! in the past, blended between the two authoritative snapshots that bracket
//! a local playback clock. The clock starts [`INTERPOLATION_OFFSET`] behind
//! the first snapshot received for an entity and then advances with local
//! time.

use log::debug;
use shared::{lerp_degrees, EntityState};
use std::collections::{BTreeMap, VecDeque};

/// How far behind the newest snapshot remote entities are shown, in seconds.
pub const INTERPOLATION_OFFSET: f64 = 0.1;

/// Upper bound on buffered snapshots per remote entity.
pub const MAX_BUFFERED_SNAPSHOTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteSnapshot {
    pub server_time: f64,
    pub state: EntityState,
}

#[derive(Debug, Default)]
struct RemoteTrack {
    snapshots: VecDeque<RemoteSnapshot>,
    clock: f64,
}

impl RemoteTrack {
    fn cull(&mut self) {
        while self.snapshots.len() >= 2 && self.snapshots[1].server_time <= self.clock {
            self.snapshots.pop_front();
        }
    }

    fn sample(&self) -> Option<EntityState> {
        let from = self.snapshots.front()?;
        let Some(to) = self.snapshots.get(1) else {
            return Some(from.state);
        };
        if self.clock <= from.server_time {
            return Some(from.state);
        }

        let span = to.server_time - from.server_time;
        let t = ((self.clock - from.server_time) / span).clamp(0.0, 1.0) as f32;
        Some(blend(&from.state, &to.state, t))
    }
}

fn blend(from: &EntityState, to: &EntityState, t: f32) -> EntityState {
    EntityState {
        position: from.position.lerp(&to.position, t),
        yaw: lerp_degrees(from.yaw, to.yaw, t),
        pitch: from.pitch + (to.pitch - from.pitch) * t,
        ..*to
    }
}

/// Snapshot buffers for every remote player the server has told us about.
#[derive(Debug)]
pub struct RemoteEntities {
    tracks: BTreeMap<u32, RemoteTrack>,
    offset: f64,
}

impl Default for RemoteEntities {
    fn default() -> Self {
        Self::new(INTERPOLATION_OFFSET)
    }
}

impl RemoteEntities {
    pub fn new(offset: f64) -> Self {
        Self {
            tracks: BTreeMap::new(),
            offset,
        }
    }

    /// Buffers one authoritative snapshot. Snapshots not newer than the last
    /// one buffered for the entity are ignored.
    pub fn push(&mut self, client_id: u32, server_time: f64, state: EntityState) {
        let track = self.tracks.entry(client_id).or_default();

        if let Some(newest) = track.snapshots.back() {
            if server_time <= newest.server_time {
                debug!(
                    "Ignoring out-of-order state for player {} ({:.3} <= {:.3})",
                    client_id, server_time, newest.server_time
                );
                return;
            }
        }

        // Playback ran past everything we had; start over from this snapshot
        if track.clock > server_time {
            debug!("Playback for player {} starved, restarting", client_id);
            track.snapshots.clear();
        }

        if track.snapshots.is_empty() {
            track.clock = server_time - self.offset;
        }

        track.snapshots.push_back(RemoteSnapshot { server_time, state });
        if track.snapshots.len() > MAX_BUFFERED_SNAPSHOTS {
            track.snapshots.pop_front();
        }
    }

    /// Moves every playback clock forward by `dt` seconds of local time.
    pub fn advance(&mut self, dt: f64) {
        for track in self.tracks.values_mut() {
            if track.snapshots.is_empty() {
                continue;
            }
            track.clock += dt;
            track.cull();
        }
    }

    /// Interpolated state of a remote player at its current playback time.
    pub fn sample(&self, client_id: u32) -> Option<EntityState> {
        self.tracks.get(&client_id)?.sample()
    }

    /// Interpolated states of every remote player, ordered by client ID.
    pub fn sample_all(&self) -> Vec<(u32, EntityState)> {
        self.tracks
            .keys()
            .filter_map(|client_id| self.sample(*client_id).map(|state| (*client_id, state)))
            .collect()
    }

    pub fn buffered(&self, client_id: u32) -> usize {
        self.tracks
            .get(&client_id)
            .map_or(0, |track| track.snapshots.len())
    }

    pub fn remove(&mut self, client_id: u32) -> bool {
        self.tracks.remove(&client_id).is_some()
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

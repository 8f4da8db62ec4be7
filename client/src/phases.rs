//! Client view of the replicated session state
//!
//! The server owns the phase machine; clients only observe it through
//! replicated object spawn/destroy events and the phase-change broadcast.

use log::{debug, info, warn};
use shared::{ObjectId, Packet, Phase};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct PhaseMirror {
    phase: Option<Phase>,
    objects: BTreeMap<ObjectId, String>,
}

impl PhaseMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet into the mirror. Returns `true` if the packet was a
    /// session-state packet and was consumed.
    pub fn observe(&mut self, packet: &Packet) -> bool {
        match packet {
            Packet::PhaseChanged { phase } => {
                if self.phase != Some(*phase) {
                    info!("Session phase is now {}", phase);
                }
                self.phase = Some(*phase);
                true
            }
            Packet::ObjectSpawned { object_id, prefab } => {
                debug!("Replicated object {} spawned ({})", object_id, prefab);
                self.objects.insert(*object_id, prefab.clone());
                true
            }
            Packet::ObjectDestroyed { object_id } => {
                if self.objects.remove(object_id).is_none() {
                    warn!("Destroy for unknown replicated object {}", object_id);
                }
                true
            }
            _ => false,
        }
    }

    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Prefabs of every live replicated object, ordered by object ID.
    pub fn live_prefabs(&self) -> Vec<&str> {
        self.objects.values().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.phase = None;
        self.objects.clear();
    }
}

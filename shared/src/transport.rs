//! Seams to the message channel and the replication primitive
//!
//! The prediction core never touches sockets. It sends through these traits
//! and is handed incoming messages by whoever owns the transport. The channel
//! behind them is unreliable, unordered and at-most-once.

use crate::input::InputFrame;
use crate::phase::ObjectId;
use crate::snapshot::ResultSnapshot;

/// Client side: ships locally recorded frames to the authority.
pub trait ServerLink {
    fn send_to_server(&mut self, frame: &InputFrame);
}

/// Server side: returns an authoritative result to one client.
pub trait ClientLink {
    fn send_to_client(&mut self, client_id: u32, snapshot: &ResultSnapshot);
}

/// Creates and tears down objects visible to every observer.
pub trait Replicator {
    fn spawn(&mut self, prefab: &str) -> ObjectId;
    fn destroy(&mut self, object_id: ObjectId);
}

/// In-memory [`ServerLink`] that keeps every sent frame.
#[derive(Debug, Default)]
pub struct FrameOutbox {
    pub sent: Vec<InputFrame>,
}

impl ServerLink for FrameOutbox {
    fn send_to_server(&mut self, frame: &InputFrame) {
        self.sent.push(*frame);
    }
}

/// In-memory [`ClientLink`] that keeps every sent result with its recipient.
#[derive(Debug, Default)]
pub struct SnapshotOutbox {
    pub sent: Vec<(u32, ResultSnapshot)>,
}

impl SnapshotOutbox {
    pub fn for_client(&self, client_id: u32) -> Vec<ResultSnapshot> {
        self.sent
            .iter()
            .filter(|(id, _)| *id == client_id)
            .map(|(_, snapshot)| *snapshot)
            .collect()
    }
}

impl ClientLink for SnapshotOutbox {
    fn send_to_client(&mut self, client_id: u32, snapshot: &ResultSnapshot) {
        self.sent.push((client_id, *snapshot));
    }
}

/// Replication event recorded by [`ReplicationLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationEvent {
    Spawned(ObjectId, String),
    Destroyed(ObjectId),
}

/// In-memory [`Replicator`] that hands out sequential IDs and records
/// every spawn and destroy.
#[derive(Debug, Default)]
pub struct ReplicationLog {
    next_id: u32,
    pub events: Vec<ReplicationEvent>,
}

impl ReplicationLog {
    /// Prefabs currently alive, in spawn order.
    pub fn live(&self) -> Vec<String> {
        let mut live: Vec<(ObjectId, String)> = Vec::new();
        for event in &self.events {
            match event {
                ReplicationEvent::Spawned(id, prefab) => live.push((*id, prefab.clone())),
                ReplicationEvent::Destroyed(id) => live.retain(|(live_id, _)| live_id != id),
            }
        }
        live.into_iter().map(|(_, prefab)| prefab).collect()
    }
}

impl Replicator for ReplicationLog {
    fn spawn(&mut self, prefab: &str) -> ObjectId {
        self.next_id += 1;
        let id = ObjectId(self.next_id);
        self.events
            .push(ReplicationEvent::Spawned(id, prefab.to_string()));
        id
    }

    fn destroy(&mut self, object_id: ObjectId) {
        self.events.push(ReplicationEvent::Destroyed(object_id));
    }
}

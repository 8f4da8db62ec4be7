use crate::input::InputFrame;
use crate::phase::{ObjectId, Phase};
use crate::snapshot::{EntityState, ResultSnapshot};
use serde::{Deserialize, Serialize};

/// Bumped whenever a packet layout or the movement rules change.
pub const PROTOCOL_VERSION: u32 = 3;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        frame: InputFrame,
    },
    Disconnect,

    Connected {
        client_id: u32,
        state: EntityState,
    },
    /// Authoritative result for one consumed frame, sent to its owner only
    InputResult {
        snapshot: ResultSnapshot,
    },
    Disconnected {
        reason: String,
    },
    ObjectSpawned {
        object_id: ObjectId,
        prefab: String,
    },
    ObjectDestroyed {
        object_id: ObjectId,
    },
    PhaseChanged {
        phase: Phase,
    },
    /// Another player's authoritative state, stamped with server time in
    /// seconds. Never sent to the player who owns the entity.
    RemoteState {
        client_id: u32,
        server_time: f64,
        state: EntityState,
    },
    PlayerLeft {
        client_id: u32,
    },
}

impl Packet {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

//! # Shared Netcode Core
//!
//! Types and rules that the client and the server must agree on bit for bit:
//! the input frame format, the deterministic movement step, the result
//! snapshot used to detect mispredictions, the wire packets, and the phase
//! identifiers of the session state machine.
//!
//! Nothing in here knows about sockets. Sending goes through the traits in
//! [`transport`], so both halves of the protocol can be exercised in memory.

pub mod history;
pub mod input;
pub mod math;
pub mod movement;
pub mod phase;
pub mod protocol;
pub mod snapshot;
pub mod transport;

pub use history::History;
pub use input::{InputFrame, InputSample};
pub use math::{lerp_degrees, Vec3};
pub use movement::{apply, apply_all, MovementConfig};
pub use phase::{ObjectId, Phase, TransitionId};
pub use protocol::{Packet, PROTOCOL_VERSION};
pub use snapshot::{EntityState, ResultSnapshot};
pub use transport::{ClientLink, Replicator, ServerLink};

/// Default tolerance for position and yaw comparison.
pub const DEFAULT_EPSILON: f32 = 0.001;

/// Default bound on client input and result history.
pub const MAX_HISTORY_SIZE: usize = 1000;

/// Longest delta time the server will simulate for a single input frame.
pub const MAX_FRAME_DELTA: f32 = 0.25;

/// Default simulation rate shared by client and server.
pub const DEFAULT_TICK_RATE: u32 = 60;

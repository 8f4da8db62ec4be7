//! # Predicting Client
//!
//! Client half of the netcode: local input is applied to the player's entity
//! the moment it is sampled, shipped to the authoritative server, and kept
//! until the server reports what that input actually produced.
//!
//! ## Modules
//!
//! - [`input`]: press/release buffering into one sample per tick, plus a
//!   scripted driver for headless runs
//! - [`prediction`]: sequence numbering, immediate local simulation, and the
//!   bounded input and result histories
//! - [`reconciliation`]: comparison against authoritative results and
//!   snap-and-replay on divergence
//! - [`interpolation`]: buffered, slightly delayed playback of the other
//!   players the server broadcasts
//! - [`phases`]: observer view of the server's session phase and replicated
//!   objects
//! - [`network`]: UDP socket loop tying the above together
//!
//! ## Example
//!
//! ```rust
//! use client::prediction::{ClientPredictor, ReconcileConfig};
//! use shared::transport::FrameOutbox;
//! use shared::{EntityState, InputSample, MovementConfig};
//!
//! let mut predictor = ClientPredictor::new(
//!     EntityState::default(),
//!     MovementConfig::default(),
//!     ReconcileConfig::default(),
//! );
//! let mut link = FrameOutbox::default();
//!
//! let sample = InputSample { move_z: 1.0, ..Default::default() };
//! let frame = predictor.predict(&sample, 1.0 / 60.0, &mut link);
//!
//! // The server agrees with what we predicted
//! let authoritative = *predictor.result_history().get(frame.sequence).unwrap();
//! predictor.reconcile(&authoritative);
//! assert!(predictor.input_history().is_empty());
//! ```

pub mod input;
pub mod interpolation;
pub mod network;
pub mod phases;
pub mod prediction;
pub mod reconciliation;

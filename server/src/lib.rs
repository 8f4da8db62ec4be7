//! # Authoritative Server
//!
//! Server half of the netcode. It owns the true state of every player
//! entity and of the match session, and tells clients what actually
//! happened so their predictions can be checked.
//!
//! ## Modules
//!
//! - [`client_manager`]: connection lifecycle and one FIFO input queue per
//!   client
//! - [`authority`]: applies queued frames with the shared movement rules and
//!   answers each one with a result snapshot
//! - [`phases`]: the single-flight session phase machine, replicated to all
//!   clients as spawned and destroyed objects
//! - [`session`]: match flow rules that decide when to ask for a transition
//! - [`config`]: command-line settings and the TOML phase table
//! - [`network`]: UDP transport, background tasks and the tick loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::{PhaseTable, ServerConfig};
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         ServerConfig::default(),
//!         PhaseTable::default_table(),
//!     )
//!     .await?;
//!     server.run().await
//! }
//! ```
//!
//! ## Tick Order
//!
//! Every tick drains all client queues into the authority before the phase
//! service advances, so inputs received during a phase change are still
//! simulated against the phase they were sent in.

pub mod authority;
pub mod client_manager;
pub mod config;
pub mod network;
pub mod phases;
pub mod session;

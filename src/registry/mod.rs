//! Stream registry for publish/play routing
//!
//! The registry is the only state shared between sessions. It enforces the
//! relay's invariants: at most one publisher per stream path, and a player is
//! in the idle set exactly while it waits for a publisher.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<StreamRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ sessions:     id -> Session  │
//!                  │ publishers:   path -> id     │
//!                  │ idle_players: id -> (path,   │
//!                  │                 wake sender) │
//!                  └──────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]              [Player]              [Idle Player]
//!   register_publisher()    attach via           park_player() ──► wait
//!   wakes idle players ─────publisher() ◄──────── woken on publish
//! ```
//!
//! Media never flows through the registry: publishers write to their own
//! attached players and only use the registry to resolve player ids.

pub mod error;
pub mod path;
pub mod store;

pub use error::RegistryError;
pub use path::{SessionId, StreamPath};
pub use store::{IdleWait, RegistryStats, StreamRegistry, Wake};

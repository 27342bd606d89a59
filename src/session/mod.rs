//! Publisher and player sessions
//!
//! ```text
//!   POST /live/cam  ──► Session(Publisher)
//!                          │ TagReader ─► FlvDemuxer ─► GopCache
//!                          │                  │
//!                          │            fan-out (in attachment order)
//!                          ▼                  ▼
//!   GET /live/cam   ──► Session(Player) ◄── header, metadata, sequence
//!                        (idle until          headers, GOP, then live
//!                         a publisher)
//! ```
//!
//! Sessions meet only through the [`StreamRegistry`](crate::registry::StreamRegistry)
//! carried in their [`SessionContext`].

pub mod context;
pub mod lifecycle;
mod player;
pub mod publisher;
pub mod state;

pub use context::SessionContext;
pub use lifecycle::{CompletionHook, IngestStream, Session};
pub use publisher::PublisherState;
pub use state::{Role, SessionPhase, SessionRequest, TrackSelection};

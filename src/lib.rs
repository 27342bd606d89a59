//! flv-relay: HTTP-FLV live stream relay
//!
//! One publisher uploads an FLV stream to a path; any number of players
//! download it from the same path:
//! - `POST /live/cam` publishes, `GET /live/cam.flv` plays, as a streaming
//!   response body or, when the request asks to upgrade, over a WebSocket
//!   with one binary message per FLV chunk
//! - Players arriving before the publisher wait until it shows up
//! - Late joiners get the header, metadata, sequence headers and the last
//!   GOP before live data, so they can start decoding right away
//! - `?receiveaudio=0` / `?receivevideo=0` select tracks per player
//!
//! # Example: Relay Server
//!
//! ```no_run
//! use flv_relay::{FlvServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = FlvServer::new(ServerConfig::default());
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The routes can be mounted into a larger axum application with
//! [`server::router`]. Sessions can also be driven directly over any
//! [`transport::Transport`], e.g. a socket owned by the embedding application:
//!
//! ```no_run
//! use std::sync::Arc;
//! use flv_relay::registry::StreamPath;
//! use flv_relay::session::{Session, SessionContext, SessionRequest};
//! use flv_relay::transport::MessageTransport;
//!
//! # async fn play(ctx: SessionContext) {
//! let (transport, mut messages) = MessageTransport::channel(1024);
//! let request = SessionRequest::play(StreamPath::new("live", "cam"), "receiveaudio=0");
//! let session = Session::new(ctx, request, Arc::new(transport), None, None);
//!
//! tokio::spawn(async move { while let Some(_chunk) = messages.recv().await {} });
//! let _ = session.start(None).await;
//! # }
//! ```

pub mod error;
pub mod media;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use registry::{StreamPath, StreamRegistry};
pub use server::config::ServerConfig;
pub use server::listener::FlvServer;
pub use session::{Session, SessionContext};

//! HTTP-FLV server
//!
//! `GET /{app}/{name}[.flv]` plays a stream, over a streaming response body
//! or a WebSocket; `POST` to the same path publishes one. Everything after
//! routing is handled by [`crate::session`].

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::FlvServer;
pub use routes::router;

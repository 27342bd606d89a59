//! Session transports
//!
//! A session only ever needs to write chunks, close its connection, and hear
//! about the remote side going away. [`Transport`] is that capability;
//! sessions never know which kind of connection sits behind it.
//!
//! Two adapters are provided:
//! - [`StreamTransport`]: a streaming HTTP response body
//! - [`MessageTransport`]: one message per chunk, handed to a message socket
//!   such as a WebSocket
//!
//! Both queue outgoing chunks in a bounded channel. A full queue fails the
//! write with [`TransportError::Backpressure`] instead of blocking the caller.

pub mod message;
pub mod stream;

use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

pub use message::MessageTransport;
pub use stream::{BodyStream, StreamTransport};

/// Callback invoked once when the remote side closes or the transport fails
pub type CloseHook = Box<dyn FnOnce(Option<TransportError>) + Send + 'static>;

/// Write/close capability of a connection
pub trait Transport: Send + Sync {
    /// Short label for logs ("http", "ws")
    fn kind(&self) -> &'static str;

    /// Queue a chunk for the peer
    ///
    /// Never blocks and never runs the close hook; failure is reported only
    /// through the return value.
    fn write(&self, data: Bytes) -> Result<(), TransportError>;

    /// Close the connection from our side; further writes fail
    fn close(&self);

    /// Register the close/error hook
    ///
    /// If the transport already closed, the hook runs immediately.
    fn on_close(&self, hook: CloseHook);
}

/// Error type for transport operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection is closed
    Closed,
    /// Outgoing queue is full; the peer is not keeping up
    Backpressure,
    /// Write to the underlying connection failed
    Io(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Closed => write!(f, "Transport closed"),
            TransportError::Backpressure => write!(f, "Outgoing queue full"),
            TransportError::Io(e) => write!(f, "Transport write failed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

enum CloseState {
    Open(Option<CloseHook>),
    Closed(Option<TransportError>),
}

/// Runs the close hook at most once, whichever of install/fire comes first
pub(crate) struct CloseSignal {
    state: Mutex<CloseState>,
}

impl CloseSignal {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CloseState::Open(None)),
        }
    }

    pub(crate) fn install(&self, hook: CloseHook) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match &mut *state {
            CloseState::Open(slot) => *slot = Some(hook),
            CloseState::Closed(error) => {
                let error = error.clone();
                drop(state);
                hook(error);
            }
        }
    }

    pub(crate) fn fire(&self, error: Option<TransportError>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let hook = match &mut *state {
            CloseState::Open(slot) => slot.take(),
            CloseState::Closed(_) => return,
        };
        *state = CloseState::Closed(error.clone());
        drop(state);

        if let Some(hook) = hook {
            hook(error);
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            CloseState::Closed(_)
        )
    }
}

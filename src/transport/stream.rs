//! Streaming response body transport (HTTP-FLV)

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;

use super::{CloseHook, CloseSignal, Transport, TransportError};

/// Transport feeding a streaming HTTP response body
///
/// [`channel`](Self::channel) returns the transport and the [`BodyStream`]
/// to hand to the HTTP server. The server polls the stream for body data and
/// drops it when the connection goes away, which is reported through the
/// close hook. Closing the transport ends the body once queued chunks are
/// delivered.
pub struct StreamTransport {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: Arc<CloseSignal>,
}

impl StreamTransport {
    /// Create a transport and the body stream it feeds
    pub fn channel(capacity: usize) -> (Self, BodyStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = Arc::new(CloseSignal::new());

        let transport = Self {
            tx: Mutex::new(Some(tx)),
            closed: Arc::clone(&closed),
        };
        (transport, BodyStream { rx, closed })
    }
}

impl Transport for StreamTransport {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn write(&self, data: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = tx.as_ref().ok_or(TransportError::Closed)?;

        tx.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self) {
        // Dropping the sender lets the body drain what is queued, then end
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn on_close(&self, hook: CloseHook) {
        self.closed.install(hook);
    }
}

/// Body half of a [`StreamTransport`]
///
/// Yields queued chunks in order. Dropping it, whether after the body ended
/// or because the connection failed, fires the transport's close hook.
pub struct BodyStream {
    rx: mpsc::Receiver<Bytes>,
    closed: Arc<CloseSignal>,
}

impl Stream for BodyStream {
    type Item = Result<Bytes, std::convert::Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|chunk| chunk.map(Ok))
    }
}

impl Drop for BodyStream {
    fn drop(&mut self) {
        self.closed.fire(None);
    }
}

//! Message-oriented transport (e.g. WebSocket)

use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{CloseHook, CloseSignal, Transport, TransportError};

/// Transport delivering each chunk as one message
///
/// The socket owner forwards everything from the receiver returned by
/// [`channel`](Self::channel) as binary messages and closes the socket when
/// the receiver yields `None`. It calls [`notify_closed`](Self::notify_closed)
/// when the peer disconnects.
pub struct MessageTransport {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: CloseSignal,
}

impl MessageTransport {
    /// Create a transport and the receiving end of its message queue
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let transport = Self {
            tx: Mutex::new(Some(tx)),
            closed: CloseSignal::new(),
        };
        (transport, rx)
    }

    /// Report that the peer went away or the socket failed
    pub fn notify_closed(&self, error: Option<TransportError>) {
        self.closed.fire(error);
    }
}

impl Transport for MessageTransport {
    fn kind(&self) -> &'static str {
        "ws"
    }

    fn write(&self, data: Bytes) -> Result<(), TransportError> {
        let result = {
            let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
            let tx = tx.as_ref().ok_or(TransportError::Closed)?;
            tx.try_send(data)
        };

        match result {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(TransportError::Backpressure),
            // Receiver dropped: the socket side is gone
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn on_close(&self, hook: CloseHook) {
        self.closed.install(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_messages_in_order() {
        let (transport, mut rx) = MessageTransport::channel(4);

        transport.write(Bytes::from_static(b"one")).unwrap();
        transport.write(Bytes::from_static(b"two")).unwrap();
        transport.close();

        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"one"));
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"two"));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_full_queue() {
        let (transport, _rx) = MessageTransport::channel(1);

        transport.write(Bytes::from_static(b"one")).unwrap();
        assert_eq!(
            transport.write(Bytes::from_static(b"two")),
            Err(TransportError::Backpressure)
        );
    }

    #[test]
    fn test_dropped_receiver_fails_write() {
        let (transport, rx) = MessageTransport::channel(4);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        transport.on_close(Box::new(move |_| flag.store(true, Ordering::SeqCst)));

        drop(rx);
        assert_eq!(
            transport.write(Bytes::from_static(b"one")),
            Err(TransportError::Closed)
        );
        // The hook never fires from write
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn test_notify_closed() {
        let (transport, _rx) = MessageTransport::channel(4);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        transport.on_close(Box::new(move |_| flag.store(true, Ordering::SeqCst)));

        transport.notify_closed(None);
        assert!(fired.load(Ordering::SeqCst));
    }
}

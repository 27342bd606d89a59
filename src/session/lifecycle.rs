//! Session lifecycle
//!
//! A [`Session`] is one connection acting as either a publisher or a player.
//! [`Session::start`] drives the role's protocol to completion and
//! [`Session::stop`] tears everything down exactly once, no matter how many
//! paths (remote close, ingest failure, publisher teardown) reach it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::AsyncRead;
use tokio::sync::watch;

use crate::error::{Error, ErrorCategory, Result};
use crate::registry::{SessionId, StreamPath};
use crate::transport::{Transport, TransportError};

use super::context::SessionContext;
use super::publisher::PublisherState;
use super::state::{Role, SessionPhase, SessionRequest, TrackSelection};

/// Byte stream a publisher ingests FLV from
pub type IngestStream = Box<dyn AsyncRead + Send + Unpin>;

/// Continuation run once at the end of teardown
pub type CompletionHook = Box<dyn FnOnce() + Send + 'static>;

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A publisher or player connection
pub struct Session {
    id: SessionId,
    role: Role,
    path: StreamPath,
    tracks: TrackSelection,
    peer: Option<SocketAddr>,
    pub(super) ctx: SessionContext,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) ingest: Mutex<Option<IngestStream>>,
    /// Publisher-only shared state; `Some` from registration until stop
    pub(super) publisher: Mutex<Option<PublisherState>>,
    active: AtomicBool,
    phase: AtomicU8,
    shutdown: watch::Sender<bool>,
    next: Mutex<Option<CompletionHook>>,
}

impl Session {
    /// Create a session and add it to the registry
    ///
    /// `ingest` is the request body for publishers and ignored for players.
    pub fn new(
        ctx: SessionContext,
        request: SessionRequest,
        transport: Arc<dyn Transport>,
        ingest: Option<IngestStream>,
        peer: Option<SocketAddr>,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let session = Arc::new(Self {
            id: ctx.registry.next_session_id(),
            role: request.role,
            path: request.path,
            tracks: request.tracks,
            peer,
            transport,
            ingest: Mutex::new(ingest),
            publisher: Mutex::new(None),
            active: AtomicBool::new(false),
            phase: AtomicU8::new(SessionPhase::Created.as_u8()),
            shutdown,
            next: Mutex::new(None),
            ctx,
        });

        session.ctx.registry.insert_session(Arc::clone(&session));

        tracing::debug!(
            session_id = session.id,
            role = %session.role,
            stream = %session.path,
            transport = session.transport.kind(),
            peer = ?session.peer,
            "Session created"
        );

        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn path(&self) -> &StreamPath {
        &self.path
    }

    pub fn tracks(&self) -> TrackSelection {
        self.tracks
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Check if this player is waiting for a publisher
    pub fn is_idle(&self) -> bool {
        self.ctx.registry.is_idle(self.id)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        let phase = SessionPhase::from_u8(self.phase.load(Ordering::Acquire));
        if phase == SessionPhase::Active && self.is_idle() {
            return SessionPhase::Idle;
        }
        phase
    }

    pub(super) fn set_phase(&self, phase: SessionPhase) {
        // Stopped is terminal
        let _ = self
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != SessionPhase::Stopped.as_u8()).then_some(phase.as_u8())
            });
    }

    /// Queue a chunk for this session's peer
    pub(crate) fn send(&self, data: Bytes) -> std::result::Result<(), TransportError> {
        self.transport.write(data)
    }

    /// Run the session until it stops
    ///
    /// `next` runs once after teardown, whichever path triggered it. The
    /// returned error has already been logged; callers only use it to pick a
    /// response. Teardown also runs if this future is dropped or panics.
    pub async fn start(self: Arc<Self>, next: Option<CompletionHook>) -> Result<()> {
        *lock(&self.next) = next;
        self.active.store(true, Ordering::Release);
        self.set_phase(SessionPhase::Active);
        let _guard = StopOnDrop(Arc::clone(&self));

        let weak = Arc::downgrade(&self);
        self.transport.on_close(Box::new(move |error| {
            if let Some(session) = weak.upgrade() {
                if let Some(error) = error {
                    tracing::debug!(session_id = session.id, error = %error, "Transport failed");
                }
                session.stop();
            }
        }));

        let result = match self.role {
            Role::Publisher => self.handle_publish().await,
            Role::Player => self.handle_play().await,
        };

        if let Err(e) = &result {
            self.report(e);
        }

        self.stop();
        result
    }

    fn report(&self, error: &Error) {
        match error.category() {
            ErrorCategory::Intentional => {}
            ErrorCategory::Policy => tracing::info!(
                session_id = self.id,
                stream = %self.path,
                error = %error,
                "{} rejected",
                self.role
            ),
            ErrorCategory::Protocol => tracing::warn!(
                session_id = self.id,
                stream = %self.path,
                error = %error,
                "{} protocol error",
                self.role
            ),
            ErrorCategory::Transport => tracing::debug!(
                session_id = self.id,
                stream = %self.path,
                error = %error,
                "{} connection lost",
                self.role
            ),
        }
    }

    /// Tear the session down
    ///
    /// Synchronous and idempotent; only the first call has any effect.
    pub fn stop(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        self.set_phase(SessionPhase::Stopped);

        self.transport.close();
        self.shutdown.send_replace(true);

        match self.role {
            Role::Player => self.stop_player(),
            Role::Publisher => self.stop_publisher(),
        }

        let next = lock(&self.next).take();
        if let Some(next) = next {
            next();
        }

        self.ctx.registry.remove_session(self.id);
    }

    /// Resolve once `stop` has run
    pub async fn stopped(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives as long as the session, so this only ends on stop
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    pub(super) fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::Stopped)
        }
    }
}

/// Stops the session when the driving future ends in any way
struct StopOnDrop(Arc<Session>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.stop();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("path", &self.path)
            .field("tracks", &self.tracks)
            .field("phase", &self.phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamPath;
    use crate::transport::MessageTransport;

    fn player(ctx: &SessionContext, query: &str) -> Arc<Session> {
        let (transport, _rx) = MessageTransport::channel(4);
        Session::new(
            ctx.clone(),
            SessionRequest::play(StreamPath::new("live", "cam"), query),
            Arc::new(transport),
            None,
            None,
        )
    }

    #[test]
    fn test_new_session_is_registered() {
        let ctx = SessionContext::standalone();
        let session = player(&ctx, "");

        assert_eq!(session.phase(), SessionPhase::Created);
        assert!(!session.is_active());
        assert!(ctx.registry.session(session.id()).is_some());
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let ctx = SessionContext::standalone();
        let session = player(&ctx, "");

        session.stop();
        assert_eq!(session.phase(), SessionPhase::Created);
        assert_eq!(ctx.registry.session_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_player_tears_down() {
        let ctx = SessionContext::standalone();
        let session = player(&ctx, "receiveaudio=false&receivevideo=false");

        let result = Arc::clone(&session).start(None).await;

        assert!(matches!(
            result,
            Err(Error::Session(crate::error::SessionError::NoTracksRequested))
        ));
        assert_eq!(session.phase(), SessionPhase::Stopped);
        assert_eq!(ctx.registry.session_count(), 0);
        assert_eq!(ctx.registry.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_start_future_tears_down() {
        let ctx = SessionContext::standalone();
        let session = player(&ctx, "");

        let start = Arc::clone(&session).start(None);
        // Parks as idle, then is dropped mid-wait
        let _ = tokio::time::timeout(std::time::Duration::from_millis(50), start).await;

        assert_eq!(session.phase(), SessionPhase::Stopped);
        assert_eq!(ctx.registry.idle_count(), 0);
        assert_eq!(ctx.registry.session_count(), 0);
    }
}

//! Stream registry implementation
//!
//! The process-wide table every session meets in: live sessions, the
//! publisher of each path, and players waiting for a publisher.
//!
//! Locking: the registry lock is never held while a session's publisher
//! state is locked by the same thread. A publisher may take the registry
//! lock while holding its own state lock (to resolve player ids), so the
//! reverse order would deadlock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::session::Session;

use super::error::RegistryError;
use super::path::{SessionId, StreamPath};

/// Why an idle player was woken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// A publisher registered for the player's path
    Published,
    /// The player itself is stopping
    Cancelled,
}

/// Outcome of parking a player
#[derive(Debug)]
pub enum IdleWait {
    /// A publisher already exists; attach right away
    Ready,
    /// Player is idle; resolves when woken or cancelled
    Waiting(oneshot::Receiver<Wake>),
}

struct IdleEntry {
    path: StreamPath,
    wake: oneshot::Sender<Wake>,
}

#[derive(Default)]
struct RegistryInner {
    /// Every live session by id
    sessions: HashMap<SessionId, Arc<Session>>,
    /// Publisher session id by stream path
    publishers: HashMap<StreamPath, SessionId>,
    /// Players waiting for a publisher
    idle_players: HashMap<SessionId, IdleEntry>,
}

/// Snapshot of registry sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: usize,
    pub publishers: usize,
    pub idle_players: usize,
}

/// Central registry for sessions and streams
pub struct StreamRegistry {
    inner: Mutex<RegistryInner>,
    next_session_id: AtomicU64,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_session_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a fresh session id
    pub fn next_session_id(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a session; called once when the session is created
    pub fn insert_session(&self, session: Arc<Session>) {
        self.lock().sessions.insert(session.id(), session);
    }

    /// Remove a session; called once at the end of its teardown
    pub fn remove_session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().sessions.remove(&id)
    }

    /// Look up a session by id
    pub fn session(&self, id: SessionId) -> Option<Arc<Session>> {
        self.lock().sessions.get(&id).cloned()
    }

    /// Resolve ids to sessions, keeping order and skipping unknown ids
    pub fn sessions(&self, ids: &[SessionId]) -> Vec<Arc<Session>> {
        let inner = self.lock();
        ids.iter()
            .filter_map(|id| inner.sessions.get(id).cloned())
            .collect()
    }

    /// Snapshot of every live session
    pub fn live_sessions(&self) -> Vec<Arc<Session>> {
        self.lock().sessions.values().cloned().collect()
    }

    /// Get the number of live sessions
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Check if a path has a publisher
    pub fn has_publisher(&self, path: &StreamPath) -> bool {
        self.lock().publishers.contains_key(path)
    }

    /// Get the publisher session for a path
    pub fn publisher(&self, path: &StreamPath) -> Option<Arc<Session>> {
        let inner = self.lock();
        let id = inner.publishers.get(path)?;
        inner.sessions.get(id).cloned()
    }

    /// Get the publisher session id for a path
    pub fn publisher_id(&self, path: &StreamPath) -> Option<SessionId> {
        self.lock().publishers.get(path).copied()
    }

    /// Claim a path for a publisher and wake the players waiting on it
    ///
    /// Fails without touching the registry if the path is taken. Waking
    /// happens under the same lock as the claim, so every idle player on the
    /// path is released before the publisher can broadcast anything.
    /// Returns the number of players woken.
    pub fn register_publisher(
        &self,
        path: &StreamPath,
        session_id: SessionId,
    ) -> Result<usize, RegistryError> {
        let mut inner = self.lock();

        if inner.publishers.contains_key(path) {
            return Err(RegistryError::StreamAlreadyPublishing(path.clone()));
        }
        inner.publishers.insert(path.clone(), session_id);

        let waiting: Vec<SessionId> = inner
            .idle_players
            .iter()
            .filter(|(_, entry)| &entry.path == path)
            .map(|(id, _)| *id)
            .collect();

        for id in &waiting {
            if let Some(entry) = inner.idle_players.remove(id) {
                let _ = entry.wake.send(Wake::Published);
            }
        }

        tracing::info!(
            stream = %path,
            session_id = session_id,
            woken = waiting.len(),
            "Publisher registered"
        );

        Ok(waiting.len())
    }

    /// Release a path, if it is still held by `session_id`
    pub fn unregister_publisher(&self, path: &StreamPath, session_id: SessionId) -> bool {
        let mut inner = self.lock();

        match inner.publishers.get(path) {
            Some(id) if *id == session_id => {
                inner.publishers.remove(path);
                tracing::debug!(stream = %path, session_id = session_id, "Publisher unregistered");
                true
            }
            other => {
                tracing::warn!(
                    stream = %path,
                    expected = ?other,
                    actual = session_id,
                    "Publisher unregister mismatch"
                );
                false
            }
        }
    }

    /// Park a player until a publisher exists for `path`
    ///
    /// The publisher check and the insertion into the idle set are one step,
    /// so a publisher registering concurrently either is seen here or wakes
    /// this player.
    pub fn park_player(&self, session_id: SessionId, path: &StreamPath) -> IdleWait {
        let mut inner = self.lock();

        if inner.publishers.contains_key(path) {
            return IdleWait::Ready;
        }

        let (tx, rx) = oneshot::channel();
        inner.idle_players.insert(
            session_id,
            IdleEntry {
                path: path.clone(),
                wake: tx,
            },
        );
        IdleWait::Waiting(rx)
    }

    /// Take a player out of the idle set, resolving its wait as cancelled
    ///
    /// Returns false if the player was not idle.
    pub fn cancel_idle(&self, session_id: SessionId) -> bool {
        let entry = self.lock().idle_players.remove(&session_id);
        match entry {
            Some(entry) => {
                let _ = entry.wake.send(Wake::Cancelled);
                true
            }
            None => false,
        }
    }

    /// Check if a player is waiting for a publisher
    pub fn is_idle(&self, session_id: SessionId) -> bool {
        self.lock().idle_players.contains_key(&session_id)
    }

    /// Get the number of idle players
    pub fn idle_count(&self) -> usize {
        self.lock().idle_players.len()
    }

    /// Get the number of published paths
    pub fn stream_count(&self) -> usize {
        self.lock().publishers.len()
    }

    /// Snapshot of registry sizes
    pub fn stats(&self) -> RegistryStats {
        let inner = self.lock();
        RegistryStats {
            sessions: inner.sessions.len(),
            publishers: inner.publishers.len(),
            idle_players: inner.idle_players.len(),
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(name: &str) -> StreamPath {
        StreamPath::new("live", name)
    }

    #[test]
    fn test_register_publisher() {
        let registry = StreamRegistry::new();
        let key = path("test");

        assert_eq!(registry.register_publisher(&key, 1), Ok(0));
        assert_eq!(registry.publisher_id(&key), Some(1));

        // Can't register another publisher, and the first keeps the path
        let result = registry.register_publisher(&key, 2);
        assert_eq!(result, Err(RegistryError::StreamAlreadyPublishing(key.clone())));
        assert_eq!(registry.publisher_id(&key), Some(1));
        assert_eq!(registry.stream_count(), 1);
    }

    #[test]
    fn test_unregister_checks_owner() {
        let registry = StreamRegistry::new();
        let key = path("test");
        registry.register_publisher(&key, 1).unwrap();

        assert!(!registry.unregister_publisher(&key, 2));
        assert!(registry.has_publisher(&key));

        assert!(registry.unregister_publisher(&key, 1));
        assert!(!registry.has_publisher(&key));

        // Path is free again
        assert!(registry.register_publisher(&key, 3).is_ok());
    }

    #[tokio::test]
    async fn test_publish_wakes_only_matching_idle_players() {
        let registry = StreamRegistry::new();

        let IdleWait::Waiting(rx_a) = registry.park_player(10, &path("a")) else {
            panic!("expected to wait");
        };
        let IdleWait::Waiting(mut rx_b) = registry.park_player(11, &path("b")) else {
            panic!("expected to wait");
        };
        assert!(registry.is_idle(10));
        assert_eq!(registry.idle_count(), 2);

        assert_eq!(registry.register_publisher(&path("a"), 1), Ok(1));

        assert_eq!(rx_a.await, Ok(Wake::Published));
        assert!(!registry.is_idle(10));
        assert!(registry.is_idle(11));
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn test_park_with_publisher_is_ready() {
        let registry = StreamRegistry::new();
        registry.register_publisher(&path("a"), 1).unwrap();

        assert!(matches!(
            registry.park_player(10, &path("a")),
            IdleWait::Ready
        ));
        assert!(!registry.is_idle(10));
    }

    #[tokio::test]
    async fn test_cancel_idle() {
        let registry = StreamRegistry::new();
        let IdleWait::Waiting(rx) = registry.park_player(10, &path("a")) else {
            panic!("expected to wait");
        };

        assert!(registry.cancel_idle(10));
        assert!(!registry.cancel_idle(10));
        assert_eq!(rx.await, Ok(Wake::Cancelled));
        assert_eq!(registry.idle_count(), 0);
    }

    #[test]
    fn test_session_ids_increase() {
        let registry = StreamRegistry::new();
        let a = registry.next_session_id();
        let b = registry.next_session_id();
        assert!(b > a);
    }
}

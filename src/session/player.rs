//! Player side: idle wait, attach and teardown

use std::sync::Arc;

use crate::error::{Error, Result, SessionError};
use crate::registry::{IdleWait, Wake};

use super::lifecycle::Session;
use super::state::SessionPhase;

impl Session {
    pub(super) async fn handle_play(self: &Arc<Self>) -> Result<()> {
        let tracks = self.tracks();
        if !tracks.any() {
            return Err(SessionError::NoTracksRequested.into());
        }

        let registry = &self.ctx.registry;
        tracing::info!(
            session_id = self.id(),
            stream = %self.path(),
            receive_audio = tracks.audio,
            receive_video = tracks.video,
            "New Player"
        );

        if let IdleWait::Waiting(wake) = registry.park_player(self.id(), self.path()) {
            // A stop that ran before parking could not cancel the entry
            if !self.is_active() {
                registry.cancel_idle(self.id());
                return Err(Error::Stopped);
            }

            tracing::info!(session_id = self.id(), stream = %self.path(), "Idle Player");

            let woken = tokio::select! {
                wake = wake => wake,
                _ = self.stopped() => return Err(Error::Stopped),
            };

            match woken {
                Ok(Wake::Published) => {}
                Ok(Wake::Cancelled) | Err(_) => return Err(Error::Stopped),
            }
        }

        let publisher = registry
            .publisher(self.path())
            .ok_or(SessionError::PublisherGone)?;
        publisher.attach_player(self)?;

        self.set_phase(SessionPhase::Streaming);
        tracing::info!(
            session_id = self.id(),
            stream = %self.path(),
            publisher_id = publisher.id(),
            "Start Player"
        );
        drop(publisher);

        self.stopped().await;
        Ok(())
    }

    pub(super) fn stop_player(&self) {
        let registry = &self.ctx.registry;
        registry.cancel_idle(self.id());

        // Lookup releases the registry lock before the publisher's is taken
        if let Some(publisher) = registry.publisher(self.path()) {
            publisher.detach_player(self.id());
        }

        tracing::info!(session_id = self.id(), stream = %self.path(), "Close Player");
    }
}

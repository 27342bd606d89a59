//! Publisher side: FLV ingest, GOP caching and fan-out to players

use std::sync::Arc;

use bytes::Bytes;

use crate::error::{Error, Result, SessionError};
use crate::media::flv::VideoCodec;
use crate::media::{
    encode_header, encode_tag, FlvDemuxer, FlvTagType, GopCache, MediaUnit, RawTag, TagReader,
    UnitFlag, WireTag,
};
use crate::registry::{RegistryError, SessionId};

use super::lifecycle::{lock, Session};
use super::state::SessionPhase;

/// State a publisher shares with the players attached to it
pub struct PublisherState {
    /// Declared in the FLV header
    pub has_audio: bool,
    pub has_video: bool,

    /// Attached players, in attachment order
    players: Vec<SessionId>,

    /// Late-joiner cache; `None` until a keyframe-capable sequence header
    gop: Option<GopCache>,

    demuxer: FlvDemuxer,
}

impl PublisherState {
    fn new(has_audio: bool, has_video: bool) -> Self {
        Self {
            has_audio,
            has_video,
            players: Vec::new(),
            gop: None,
            demuxer: FlvDemuxer::new(),
        }
    }
}

impl Session {
    pub(super) async fn handle_publish(self: &Arc<Self>) -> Result<()> {
        let registry = &self.ctx.registry;

        if registry.has_publisher(self.path()) {
            return Err(RegistryError::StreamAlreadyPublishing(self.path().clone()).into());
        }

        let ingest = lock(&self.ingest)
            .take()
            .ok_or(SessionError::MissingIngest)?;
        let mut reader = TagReader::new(ingest);

        let header = tokio::select! {
            header = reader.read_header() => header?,
            _ = self.stopped() => return Err(Error::Stopped),
        };

        // State goes in before the path is claimed, so woken players find it
        *lock(&self.publisher) = Some(PublisherState::new(header.has_audio, header.has_video));

        if let Err(e) = registry.register_publisher(self.path(), self.id()) {
            lock(&self.publisher).take();
            return Err(e.into());
        }

        // A stop that ran before the claim could not release it
        if !self.is_active() {
            registry.unregister_publisher(self.path(), self.id());
            return Err(Error::Stopped);
        }

        self.set_phase(SessionPhase::Streaming);
        tracing::info!(
            session_id = self.id(),
            stream = %self.path(),
            has_audio = header.has_audio,
            has_video = header.has_video,
            "Start Publisher"
        );

        loop {
            self.ensure_active()?;

            let tag = tokio::select! {
                tag = reader.read_tag() => tag?,
                _ = self.stopped() => return Err(Error::Stopped),
            };

            match tag {
                Some(tag) => self.ingest_tag(tag),
                None => {
                    tracing::debug!(session_id = self.id(), "Publisher stream ended");
                    return Ok(());
                }
            }
        }
    }

    /// Demux one tag, update the GOP cache and fan the chunk out
    fn ingest_tag(&self, tag: RawTag) {
        let failed = {
            let mut guard = lock(&self.publisher);
            let Some(state) = guard.as_mut() else {
                return;
            };

            let Some(unit) = state.demuxer.decode(tag.tag_type, tag.timestamp, tag.data) else {
                tracing::trace!(
                    session_id = self.id(),
                    tag_type = tag.tag_type,
                    "Skipping tag"
                );
                return;
            };

            let wire = match unit {
                MediaUnit::Audio {
                    dts, flag, data, ..
                } => self.on_audio(state, dts, flag, &data),
                MediaUnit::Video {
                    codec,
                    dts,
                    flag,
                    data,
                    ..
                } => self.on_video(state, codec, dts, flag, &data),
                MediaUnit::Script { data, .. } => WireTag::new(FlvTagType::Script, 0, &data),
            };

            self.broadcast(state, &wire)
        };

        // Player teardown takes our state lock, so it runs after release
        for player in failed {
            player.stop();
        }
    }

    fn on_audio(&self, state: &mut PublisherState, dts: u32, flag: UnitFlag, data: &[u8]) -> WireTag {
        let tag = WireTag::new(FlvTagType::Audio, dts, data);

        if flag == UnitFlag::Initial {
            if let Some(info) = state.demuxer.audio_info() {
                tracing::debug!(
                    session_id = self.id(),
                    stream = %self.path(),
                    codec = info.codec,
                    profile = info.profile,
                    sample_rate = info.sample_rate,
                    channels = info.channels,
                    "Audio info"
                );
            }
        }

        if let Some(gop) = state.gop.as_mut() {
            gop.push(tag.clone());
        }

        tag
    }

    fn on_video(
        &self,
        state: &mut PublisherState,
        codec: u8,
        dts: u32,
        flag: UnitFlag,
        data: &[u8],
    ) -> WireTag {
        let tag = WireTag::new(FlvTagType::Video, dts, data);

        let keyframe_capable = VideoCodec::from_byte(codec).map_or(false, |c| c.has_keyframes());
        if !keyframe_capable {
            return tag;
        }

        match flag {
            UnitFlag::Initial => {
                let config = &self.ctx.config;
                state.gop = (config.gop_cache && state.has_video)
                    .then(|| GopCache::with_max_size(config.gop_cache_max_size));

                if let Some(info) = state.demuxer.video_info() {
                    tracing::debug!(
                        session_id = self.id(),
                        stream = %self.path(),
                        codec = info.codec,
                        profile = info.profile,
                        level = %info.level,
                        width = info.width,
                        height = info.height,
                        "Video info"
                    );
                }
            }
            UnitFlag::Keyframe => {
                if let Some(gop) = state.gop.as_mut() {
                    gop.start_gop();
                    gop.push(tag.clone());
                }
            }
            UnitFlag::Frame => {
                if let Some(gop) = state.gop.as_mut() {
                    gop.push(tag.clone());
                }
            }
        }

        tag
    }

    /// Write a chunk to every attached player that wants it
    ///
    /// Returns the players whose write failed.
    fn broadcast(&self, state: &PublisherState, tag: &WireTag) -> Vec<Arc<Session>> {
        let mut failed = Vec::new();

        for player in self.ctx.registry.sessions(&state.players) {
            if !player.tracks().accepts(tag.tag_type) {
                continue;
            }
            if let Err(e) = player.send(tag.bytes.clone()) {
                tracing::warn!(
                    session_id = player.id(),
                    stream = %self.path(),
                    error = %e,
                    "Dropping player"
                );
                failed.push(player);
            }
        }

        failed
    }

    /// Send the bootstrap sequence to a player and attach it
    ///
    /// Runs under the state lock, so the player sees its whole bootstrap
    /// before any live chunk.
    pub(super) fn attach_player(&self, player: &Session) -> Result<()> {
        let mut guard = lock(&self.publisher);
        let state = guard.as_mut().ok_or(SessionError::PublisherGone)?;

        // A player stopped before this point has already detached
        player.ensure_active()?;

        let tracks = player.tracks();
        let audio = state.has_audio && tracks.audio;
        let video = state.has_video && tracks.video;

        player.send(encode_header(audio, video))?;

        if let Some(metadata) = state.demuxer.metadata() {
            player.send(encode_tag(FlvTagType::Script, 0, metadata))?;
        }
        if audio {
            if let Some(header) = state.demuxer.audio_sequence_header() {
                player.send(encode_tag(FlvTagType::Audio, 0, header))?;
            }
        }
        if video {
            if let Some(header) = state.demuxer.video_sequence_header() {
                player.send(encode_tag(FlvTagType::Video, 0, header))?;
            }
        }

        if let Some(gop) = state.gop.as_ref() {
            for tag in gop.iter().filter(|t| tracks.accepts(t.tag_type)) {
                player.send(tag.bytes.clone())?;
            }
        }

        state.players.push(player.id());

        tracing::debug!(
            session_id = player.id(),
            publisher_id = self.id(),
            receive_audio = tracks.audio,
            receive_video = tracks.video,
            players = state.players.len(),
            "Player attached"
        );

        Ok(())
    }

    /// Remove a player from the fan-out list
    pub(super) fn detach_player(&self, player_id: SessionId) {
        if let Some(state) = lock(&self.publisher).as_mut() {
            state.players.retain(|id| *id != player_id);
        }
    }

    /// Ids of the attached players, in attachment order
    pub fn player_ids(&self) -> Vec<SessionId> {
        lock(&self.publisher)
            .as_ref()
            .map(|state| state.players.clone())
            .unwrap_or_default()
    }

    /// Number of chunks in the GOP cache, if one exists
    pub fn gop_frame_count(&self) -> Option<usize> {
        lock(&self.publisher)
            .as_ref()
            .and_then(|state| state.gop.as_ref())
            .map(GopCache::frame_count)
    }

    /// Copy of the GOP cache contents, oldest first
    pub fn gop_snapshot(&self) -> Vec<Bytes> {
        lock(&self.publisher)
            .as_ref()
            .and_then(|state| state.gop.as_ref())
            .map(|gop| gop.iter().map(|tag| tag.bytes.clone()).collect())
            .unwrap_or_default()
    }

    pub(super) fn stop_publisher(&self) {
        let state = lock(&self.publisher).take();

        if let Some(state) = state {
            self.ctx.registry.unregister_publisher(self.path(), self.id());

            // GOP and demuxer are released with `state`; players stop lock-free
            for player in self.ctx.registry.sessions(&state.players) {
                player.stop();
            }
        }

        tracing::info!(session_id = self.id(), stream = %self.path(), "Close Publisher");
    }
}

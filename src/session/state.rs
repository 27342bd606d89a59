//! Session roles, phases and player track selection

use crate::media::FlvTagType;
use crate::registry::StreamPath;

/// What a session does, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Consumes a published stream
    Player,
    /// Ingests a stream for a path
    Publisher,
}

impl Role {
    /// Derive the role from the HTTP request method
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "GET" => Some(Role::Player),
            "POST" => Some(Role::Publisher),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Player => "Player",
            Role::Publisher => "Publisher",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created and registered, `start` not called yet
    Created,
    /// Started, protocol not yet running
    Active,
    /// Player waiting for a publisher
    Idle,
    /// Publisher ingesting, or player attached
    Streaming,
    /// Torn down
    Stopped,
}

impl SessionPhase {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            SessionPhase::Created => 0,
            SessionPhase::Active => 1,
            SessionPhase::Idle => 2,
            SessionPhase::Streaming => 3,
            SessionPhase::Stopped => 4,
        }
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionPhase::Created,
            1 => SessionPhase::Active,
            2 => SessionPhase::Idle,
            3 => SessionPhase::Streaming,
            _ => SessionPhase::Stopped,
        }
    }
}

/// Which tracks a player wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSelection {
    pub audio: bool,
    pub video: bool,
}

impl Default for TrackSelection {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl TrackSelection {
    /// Parse `receiveaudio` / `receivevideo` from a query string
    ///
    /// Both default to true; `0` or `false` turns a track off.
    pub fn from_query(query: &str) -> Self {
        let mut tracks = Self::default();

        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let enabled = !(value == "0" || value.eq_ignore_ascii_case("false"));
            match key {
                "receiveaudio" => tracks.audio = enabled,
                "receivevideo" => tracks.video = enabled,
                _ => {}
            }
        }

        tracks
    }

    /// Check if at least one track is requested
    pub fn any(&self) -> bool {
        self.audio || self.video
    }

    /// Check if a chunk of this tag type should be delivered
    ///
    /// Script data is structural and always delivered.
    pub fn accepts(&self, tag_type: FlvTagType) -> bool {
        match tag_type {
            FlvTagType::Audio => self.audio,
            FlvTagType::Video => self.video,
            FlvTagType::Script => true,
        }
    }
}

/// A routed request: who the session is and what it asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub role: Role,
    pub path: StreamPath,
    pub tracks: TrackSelection,
    /// Raw query string, kept for logging
    pub query: String,
}

impl SessionRequest {
    /// A player request with the given query string
    pub fn play(path: StreamPath, query: &str) -> Self {
        Self {
            role: Role::Player,
            path,
            tracks: TrackSelection::from_query(query),
            query: query.to_string(),
        }
    }

    /// A publisher request
    pub fn publish(path: StreamPath) -> Self {
        Self {
            role: Role::Publisher,
            path,
            tracks: TrackSelection::default(),
            query: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_method() {
        assert_eq!(Role::from_method("GET"), Some(Role::Player));
        assert_eq!(Role::from_method("POST"), Some(Role::Publisher));
        assert_eq!(Role::from_method("PUT"), None);
    }

    #[test]
    fn test_tracks_default() {
        let tracks = TrackSelection::from_query("");
        assert!(tracks.audio && tracks.video);
        assert!(tracks.any());
    }

    #[test]
    fn test_tracks_from_query() {
        let tracks = TrackSelection::from_query("receiveaudio=0");
        assert!(!tracks.audio);
        assert!(tracks.video);

        let tracks = TrackSelection::from_query("token=abc&receivevideo=false");
        assert!(tracks.audio);
        assert!(!tracks.video);

        let tracks = TrackSelection::from_query("receiveaudio=0&receivevideo=0");
        assert!(!tracks.any());

        // Anything other than a false-indicating value keeps the track
        let tracks = TrackSelection::from_query("receiveaudio=1&receivevideo=yes");
        assert_eq!(tracks, TrackSelection::default());
    }

    #[test]
    fn test_tracks_accepts() {
        let audio_only = TrackSelection {
            audio: true,
            video: false,
        };
        assert!(audio_only.accepts(FlvTagType::Audio));
        assert!(!audio_only.accepts(FlvTagType::Video));
        assert!(audio_only.accepts(FlvTagType::Script));
    }

    #[test]
    fn test_phase_roundtrip() {
        for phase in [
            SessionPhase::Created,
            SessionPhase::Active,
            SessionPhase::Idle,
            SessionPhase::Streaming,
            SessionPhase::Stopped,
        ] {
            assert_eq!(SessionPhase::from_u8(phase.as_u8()), phase);
        }
    }
}

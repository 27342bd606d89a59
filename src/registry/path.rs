//! Stream path and session identifier types

/// Unique identifier for a session (one per connection)
pub type SessionId = u64;

/// Identifies a published stream (app + stream name)
///
/// Rendered as `/app/name`, which is the key publishers and players meet on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamPath {
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name (e.g., "test")
    pub name: String,
}

impl StreamPath {
    /// Create a new stream path
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }

    /// Parse a request path of the form `/app/name` or `/app/name.flv`
    ///
    /// Returns `None` when either segment is missing or empty, or when there
    /// are extra segments.
    pub fn parse(path: &str) -> Option<Self> {
        let mut segments = path.strip_prefix('/')?.split('/');
        let app = segments.next()?;
        let name = segments.next()?;
        if segments.next().is_some() {
            return None;
        }
        Self::from_segments(app, name)
    }

    /// Build from already split route segments, stripping a `.flv` suffix
    pub fn from_segments(app: &str, name: &str) -> Option<Self> {
        let name = name.strip_suffix(".flv").unwrap_or(name);
        if app.is_empty() || name.is_empty() || app.contains('/') || name.contains('/') {
            return None;
        }
        Some(Self::new(app, name))
    }
}

impl std::fmt::Display for StreamPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}/{}", self.app, self.name)
    }
}

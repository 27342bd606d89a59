//! Error types
//!
//! Every fallible path in the crate returns [`Error`]. Session drivers catch
//! it at the publish/play boundary and turn it into a stop; [`Error::category`]
//! decides how loudly that stop is logged.

use std::io;

use crate::registry::RegistryError;
use crate::transport::TransportError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure
    Io(io::Error),
    /// Malformed FLV input or request body framing
    Protocol(ProtocolError),
    /// Malformed codec payload
    Media(MediaError),
    /// Registry invariant violation
    Registry(RegistryError),
    /// Session policy violation
    Session(SessionError),
    /// Transport write/close failure
    Transport(TransportError),
    /// Session was stopped on purpose while its driver was still running
    Stopped,
}

/// How a session-ending error should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input from the peer
    Protocol,
    /// Request refused by relay policy
    Policy,
    /// Connection went away
    Transport,
    /// Self-initiated termination
    Intentional,
}

/// FLV framing and request body errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// FLV header does not start with "FLV"
    InvalidSignature([u8; 3]),
    /// Trailing PreviousTagSize does not match the tag that precedes it
    TagSizeMismatch { expected: u32, actual: u32 },
    /// Stream ended in the middle of a header or tag
    UnexpectedEof,
    /// Request body framing error (bad chunked encoding)
    InvalidChunk,
}

/// Codec payload errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaError {
    /// AAC packet too short or unknown packet type
    InvalidAacPacket,
    /// AVC packet or decoder configuration malformed
    InvalidAvcPacket,
    /// SPS truncated or uses an unsupported layout
    InvalidSps,
}

/// Session policy errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Player suppressed both audio and video
    NoTracksRequested,
    /// Publisher session was created without an ingest stream
    MissingIngest,
    /// Player was woken but the publisher stopped before attach
    PublisherGone,
}

impl Error {
    /// Classify the error for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Protocol(_) | Error::Media(_) => ErrorCategory::Protocol,
            Error::Registry(_) | Error::Session(_) => ErrorCategory::Policy,
            Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => ErrorCategory::Protocol,
            Error::Io(_) | Error::Transport(_) => ErrorCategory::Transport,
            Error::Stopped => ErrorCategory::Intentional,
        }
    }

    /// Check if this is the intentional-stop sentinel
    pub fn is_stopped(&self) -> bool {
        matches!(self, Error::Stopped)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::Registry(e) => write!(f, "{}", e),
            Error::Session(e) => write!(f, "{}", e),
            Error::Transport(e) => write!(f, "Transport error: {}", e),
            Error::Stopped => write!(f, "Session stopped"),
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::InvalidSignature(sig) => {
                write!(f, "Not a valid FLV stream (signature {:02x?})", sig)
            }
            ProtocolError::TagSizeMismatch { expected, actual } => write!(
                f,
                "FLV tag parser error: previous tag size {} != {}",
                actual, expected
            ),
            ProtocolError::UnexpectedEof => write!(f, "Stream ended mid-tag"),
            ProtocolError::InvalidChunk => write!(f, "Invalid chunked body"),
        }
    }
}

impl std::fmt::Display for MediaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaError::InvalidAacPacket => write!(f, "Invalid AAC packet"),
            MediaError::InvalidAvcPacket => write!(f, "Invalid AVC packet"),
            MediaError::InvalidSps => write!(f, "Invalid SPS"),
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NoTracksRequested => write!(f, "Must receive at least one stream"),
            SessionError::MissingIngest => write!(f, "Publisher has no ingest stream"),
            SessionError::PublisherGone => write!(f, "Publisher went away before attach"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}
impl std::error::Error for MediaError {}
impl std::error::Error for SessionError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        // Body readers carry framing errors inside io::Error
        if let Some(protocol) = e
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<ProtocolError>())
        {
            return Error::Protocol(protocol.clone());
        }
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Session(e)
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamPath;

    #[test]
    fn test_categories() {
        assert_eq!(
            Error::from(ProtocolError::UnexpectedEof).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            Error::from(RegistryError::StreamAlreadyPublishing(StreamPath::new("live", "a")))
                .category(),
            ErrorCategory::Policy
        );
        assert_eq!(
            Error::from(SessionError::NoTracksRequested).category(),
            ErrorCategory::Policy
        );
        assert_eq!(
            Error::from(TransportError::Closed).category(),
            ErrorCategory::Transport
        );
        assert_eq!(Error::Stopped.category(), ErrorCategory::Intentional);
        assert!(Error::Stopped.is_stopped());
    }

    #[test]
    fn test_protocol_error_inside_io_error() {
        let io_err = io::Error::new(io::ErrorKind::InvalidData, ProtocolError::InvalidChunk);
        let e = Error::from(io_err);
        assert!(matches!(e, Error::Protocol(ProtocolError::InvalidChunk)));
        assert_eq!(e.category(), ErrorCategory::Protocol);

        let e = Error::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(e.category(), ErrorCategory::Transport);
    }

    #[test]
    fn test_messages() {
        let e = Error::from(SessionError::NoTracksRequested);
        assert_eq!(e.to_string(), "Must receive at least one stream");

        let e = Error::from(ProtocolError::TagSizeMismatch {
            expected: 15,
            actual: 99,
        });
        assert!(e.to_string().contains("previous tag size 99 != 15"));

        let e = Error::from(RegistryError::StreamAlreadyPublishing(StreamPath::new(
            "live", "test",
        )));
        assert_eq!(e.to_string(), "Already has a stream publish to /live/test");
    }
}

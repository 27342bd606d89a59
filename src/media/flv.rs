//! FLV framing
//!
//! An HTTP-FLV stream is a 13-byte file header followed by tags. Every tag is
//! an 11-byte header, the payload, and a 4-byte trailer repeating the tag size:
//!
//! ```text
//! File header (13 bytes):
//! +-----------+---------+-------+---------------+--------------------+
//! | "FLV" (3) | Ver (1) | Flags | HeaderLen (4) | PreviousTagSize0(4)|
//! +-----------+---------+-------+---------------+--------------------+
//!                         bit 2 = audio, bit 0 = video
//!
//! Tag:
//! +--------+-------------+--------+--------+-------------+---------+-----------+
//! | Type(1)| DataSize(3) | TS (3) | TSX (1)| StreamID(3) | Data(N) | PrevSz(4) |
//! +--------+-------------+--------+--------+-------------+---------+-----------+
//! ```
//!
//! `TSX` holds the upper 8 bits of the 32-bit timestamp.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ProtocolError, Result};

/// Size of the FLV file header, including PreviousTagSize0
pub const FLV_HEADER_SIZE: usize = 13;

/// Size of an FLV tag header
pub const TAG_HEADER_SIZE: usize = 11;

/// Size of the PreviousTagSize trailer
pub const TAG_TRAILER_SIZE: usize = 4;

/// "FLV" as a big-endian 24-bit integer
pub const FLV_SIGNATURE: u32 = 0x464C56;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio = 8,
    Video = 9,
    Script = 18,
}

impl FlvTagType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            8 => Some(FlvTagType::Audio),
            9 => Some(FlvTagType::Video),
            18 => Some(FlvTagType::Script),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
    /// Disposable inter frame (H.263 only)
    DisposableInterFrame = 3,
    /// Generated keyframe (reserved for server use)
    GeneratedKeyframe = 4,
    /// Video info/command frame
    VideoInfoFrame = 5,
}

impl VideoFrameType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            1 => Some(VideoFrameType::Keyframe),
            2 => Some(VideoFrameType::InterFrame),
            3 => Some(VideoFrameType::DisposableInterFrame),
            4 => Some(VideoFrameType::GeneratedKeyframe),
            5 => Some(VideoFrameType::VideoInfoFrame),
            _ => None,
        }
    }
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// Sorenson H.263
    SorensonH263 = 2,
    /// Screen video
    ScreenVideo = 3,
    /// VP6
    Vp6 = 4,
    /// VP6 with alpha
    Vp6Alpha = 5,
    /// Screen video v2
    ScreenVideoV2 = 6,
    /// AVC (H.264)
    Avc = 7,
    /// HEVC (H.265), legacy FLV extension
    Hevc = 12,
}

impl VideoCodec {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x0F {
            2 => Some(VideoCodec::SorensonH263),
            3 => Some(VideoCodec::ScreenVideo),
            4 => Some(VideoCodec::Vp6),
            5 => Some(VideoCodec::Vp6Alpha),
            6 => Some(VideoCodec::ScreenVideoV2),
            7 => Some(VideoCodec::Avc),
            12 => Some(VideoCodec::Hevc),
            _ => None,
        }
    }

    /// Codecs whose packets carry a sequence header / keyframe distinction
    pub fn has_keyframes(&self) -> bool {
        matches!(self, VideoCodec::Avc | VideoCodec::Hevc)
    }

    pub fn name(&self) -> &'static str {
        match self {
            VideoCodec::SorensonH263 => "Sorenson-H263",
            VideoCodec::ScreenVideo => "Screen Video",
            VideoCodec::Vp6 => "On2-VP6",
            VideoCodec::Vp6Alpha => "On2-VP6-Alpha",
            VideoCodec::ScreenVideoV2 => "Screen Video v2",
            VideoCodec::Avc => "H264",
            VideoCodec::Hevc => "H265",
        }
    }
}

/// Audio format (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    LinearPcmPlatform = 0,
    Adpcm = 1,
    Mp3 = 2,
    LinearPcmLe = 3,
    Nellymoser16kMono = 4,
    Nellymoser8kMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Aac = 10,
    Speex = 11,
    Opus = 13,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl AudioFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match (b >> 4) & 0x0F {
            0 => Some(AudioFormat::LinearPcmPlatform),
            1 => Some(AudioFormat::Adpcm),
            2 => Some(AudioFormat::Mp3),
            3 => Some(AudioFormat::LinearPcmLe),
            4 => Some(AudioFormat::Nellymoser16kMono),
            5 => Some(AudioFormat::Nellymoser8kMono),
            6 => Some(AudioFormat::Nellymoser),
            7 => Some(AudioFormat::G711ALaw),
            8 => Some(AudioFormat::G711MuLaw),
            10 => Some(AudioFormat::Aac),
            11 => Some(AudioFormat::Speex),
            13 => Some(AudioFormat::Opus),
            14 => Some(AudioFormat::Mp38k),
            15 => Some(AudioFormat::DeviceSpecific),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::LinearPcmPlatform | AudioFormat::LinearPcmLe => "PCM",
            AudioFormat::Adpcm => "ADPCM",
            AudioFormat::Mp3 | AudioFormat::Mp38k => "MP3",
            AudioFormat::Nellymoser16kMono
            | AudioFormat::Nellymoser8kMono
            | AudioFormat::Nellymoser => "Nellymoser",
            AudioFormat::G711ALaw => "G.711 A-law",
            AudioFormat::G711MuLaw => "G.711 mu-law",
            AudioFormat::Aac => "AAC",
            AudioFormat::Speex => "Speex",
            AudioFormat::Opus => "OPUS",
            AudioFormat::DeviceSpecific => "Device-specific",
        }
    }
}

/// Sample rate from the 2-bit SoundRate field
pub fn sound_rate_hz(b: u8) -> u32 {
    match (b >> 2) & 0x03 {
        0 => 5512,
        1 => 11025,
        2 => 22050,
        _ => 44100,
    }
}

/// Channel count from the SoundType bit
pub fn sound_channels(b: u8) -> u8 {
    (b & 0x01) + 1
}

/// Parsed 13-byte FLV file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
}

impl FlvHeader {
    /// Validate the signature and extract the track flags
    pub fn parse(buf: &[u8; FLV_HEADER_SIZE]) -> Result<Self> {
        let signature = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
        if signature != FLV_SIGNATURE {
            return Err(ProtocolError::InvalidSignature([buf[0], buf[1], buf[2]]).into());
        }

        Ok(Self {
            version: buf[3],
            has_audio: buf[4] & 0x04 != 0,
            has_video: buf[4] & 0x01 != 0,
        })
    }
}

/// Parsed 11-byte tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    /// Raw tag type byte (unknown types are passed through)
    pub tag_type: u8,
    /// Payload length in bytes
    pub data_size: u32,
    /// Timestamp in milliseconds, extension byte already folded in
    pub timestamp: u32,
}

impl TagHeader {
    pub fn parse(buf: &[u8; TAG_HEADER_SIZE]) -> Self {
        let data_size = u32::from_be_bytes([0, buf[1], buf[2], buf[3]]);
        let timestamp = u32::from_be_bytes([0, buf[4], buf[5], buf[6]]) | ((buf[7] as u32) << 24);

        Self {
            tag_type: buf[0],
            data_size,
            timestamp,
        }
    }

    /// Value the trailing PreviousTagSize must carry
    pub fn expected_trailer(&self) -> u32 {
        self.data_size + TAG_HEADER_SIZE as u32
    }
}

/// One tag read off an ingest stream
#[derive(Debug, Clone)]
pub struct RawTag {
    pub tag_type: u8,
    pub timestamp: u32,
    pub data: Bytes,
}

/// A wire-framed tag, ready to be written to a player as-is
#[derive(Debug, Clone)]
pub struct WireTag {
    pub tag_type: FlvTagType,
    pub bytes: Bytes,
}

impl WireTag {
    /// Frame a payload into header + data + trailer
    pub fn new(tag_type: FlvTagType, timestamp: u32, data: &[u8]) -> Self {
        Self {
            tag_type,
            bytes: encode_tag(tag_type, timestamp, data),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Build the 13-byte FLV header for the tracks a player will receive
pub fn encode_header(has_audio: bool, has_video: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(FLV_HEADER_SIZE);
    buf.put_slice(b"FLV");
    buf.put_u8(1);
    buf.put_u8(((has_audio as u8) << 2) | has_video as u8);
    buf.put_u32(9);
    buf.put_u32(0);
    buf.freeze()
}

/// Frame a payload as a complete FLV tag
pub fn encode_tag(tag_type: FlvTagType, timestamp: u32, data: &[u8]) -> Bytes {
    let size = data.len() as u32;
    let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + data.len() + TAG_TRAILER_SIZE);

    buf.put_u8(tag_type.as_byte());
    buf.put_uint(size as u64, 3);
    buf.put_uint((timestamp & 0x00FF_FFFF) as u64, 3);
    buf.put_u8((timestamp >> 24) as u8);
    buf.put_uint(0, 3); // stream id
    buf.put_slice(data);
    buf.put_u32(size + TAG_HEADER_SIZE as u32);

    buf.freeze()
}

/// Reads the FLV header and tags from a publisher's byte stream
pub struct TagReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> TagReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read and validate the 13-byte file header
    pub async fn read_header(&mut self) -> Result<FlvHeader> {
        let mut buf = [0u8; FLV_HEADER_SIZE];
        self.read_exact(&mut buf).await?;
        FlvHeader::parse(&buf)
    }

    /// Read one tag and verify its trailing size field
    ///
    /// Returns `None` when the stream ends cleanly on a tag boundary.
    pub async fn read_tag(&mut self) -> Result<Option<RawTag>> {
        let mut buf = [0u8; TAG_HEADER_SIZE];
        if self.inner.read(&mut buf[..1]).await? == 0 {
            return Ok(None);
        }
        self.read_exact(&mut buf[1..]).await?;
        let header = TagHeader::parse(&buf);

        let mut data = vec![0u8; header.data_size as usize];
        self.read_exact(&mut data).await?;

        let mut trailer = [0u8; TAG_TRAILER_SIZE];
        self.read_exact(&mut trailer).await?;
        let actual = u32::from_be_bytes(trailer);
        if actual != header.expected_trailer() {
            return Err(ProtocolError::TagSizeMismatch {
                expected: header.expected_trailer(),
                actual,
            }
            .into());
        }

        Ok(Some(RawTag {
            tag_type: header.tag_type,
            timestamp: header.timestamp,
            data: Bytes::from(data),
        }))
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.inner.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ProtocolError::UnexpectedEof.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

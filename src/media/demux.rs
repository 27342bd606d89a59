//! FLV tag demuxer
//!
//! Turns raw tag payloads into typed media units and keeps the one-time
//! stream state (metadata, sequence headers, codec info) that a player
//! joining later must receive before anything else.

use bytes::Bytes;

use super::aac::{AacPacketType, AudioSpecificConfig};
use super::flv::{self, AudioFormat, FlvTagType, VideoCodec, VideoFrameType};
use super::h264::{self, AvcConfig, AvcPacketType, HevcConfig};

/// Position of a unit within its stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFlag {
    /// Sequence header / decoder configuration
    Initial,
    /// Video keyframe
    Keyframe,
    /// Any other frame
    Frame,
}

/// A decoded media unit
#[derive(Debug, Clone)]
pub enum MediaUnit {
    Audio {
        /// SoundFormat id
        codec: u8,
        pts: u32,
        dts: u32,
        flag: UnitFlag,
        /// Complete tag body, re-framed as-is for players
        data: Bytes,
    },
    Video {
        /// CodecID
        codec: u8,
        pts: u32,
        dts: u32,
        flag: UnitFlag,
        data: Bytes,
    },
    Script {
        time: u32,
        data: Bytes,
    },
}

/// Human readable audio track description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioInfo {
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u8,
    pub profile: &'static str,
}

/// Human readable video track description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub codec: &'static str,
    pub width: u32,
    pub height: u32,
    pub profile: &'static str,
    pub level: String,
}

/// Per-publisher FLV demuxer
#[derive(Debug, Default)]
pub struct FlvDemuxer {
    metadata: Option<Bytes>,
    audio_sequence_header: Option<Bytes>,
    video_sequence_header: Option<Bytes>,
    audio_info: Option<AudioInfo>,
    video_info: Option<VideoInfo>,
}

impl FlvDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one tag
    ///
    /// Returns `None` for unknown tag types and empty payloads.
    pub fn decode(&mut self, tag_type: u8, timestamp: u32, data: Bytes) -> Option<MediaUnit> {
        if data.is_empty() {
            return None;
        }

        match FlvTagType::from_byte(tag_type)? {
            FlvTagType::Audio => Some(self.decode_audio(timestamp, data)),
            FlvTagType::Video => Some(self.decode_video(timestamp, data)),
            FlvTagType::Script => Some(self.decode_script(timestamp, data)),
        }
    }

    fn decode_audio(&mut self, timestamp: u32, data: Bytes) -> MediaUnit {
        let codec = data[0] >> 4;
        let format = AudioFormat::from_byte(data[0]);
        let mut flag = UnitFlag::Frame;

        if format == Some(AudioFormat::Aac)
            && data.len() >= 2
            && AacPacketType::from_byte(data[1]) == Some(AacPacketType::SequenceHeader)
        {
            flag = UnitFlag::Initial;
            self.audio_sequence_header = Some(data.clone());

            let info = match AudioSpecificConfig::parse(&data[2..]) {
                Ok(config) => AudioInfo {
                    codec: "AAC",
                    sample_rate: config.sampling_frequency,
                    channels: config.channels(),
                    profile: config.profile_name(),
                },
                Err(e) => {
                    tracing::debug!(error = %e, "Unparseable AAC sequence header");
                    self.fallback_audio_info(data[0])
                }
            };
            self.audio_info = Some(info);
        } else if self.audio_info.is_none() {
            self.audio_info = Some(self.fallback_audio_info(data[0]));
        }

        MediaUnit::Audio {
            codec,
            pts: timestamp,
            dts: timestamp,
            flag,
            data,
        }
    }

    fn fallback_audio_info(&self, b: u8) -> AudioInfo {
        AudioInfo {
            codec: AudioFormat::from_byte(b).map(|f| f.name()).unwrap_or(""),
            sample_rate: flv::sound_rate_hz(b),
            channels: flv::sound_channels(b),
            profile: "",
        }
    }

    fn decode_video(&mut self, timestamp: u32, data: Bytes) -> MediaUnit {
        let codec_id = data[0] & 0x0F;
        let codec = VideoCodec::from_byte(data[0]);
        let frame_type = VideoFrameType::from_byte(data[0]);

        let mut flag = match frame_type {
            Some(VideoFrameType::Keyframe) | Some(VideoFrameType::GeneratedKeyframe) => {
                UnitFlag::Keyframe
            }
            _ => UnitFlag::Frame,
        };
        let mut pts = timestamp;

        if let Some(codec) = codec.filter(|c| c.has_keyframes()) {
            if data.len() >= 2
                && AvcPacketType::from_byte(data[1]) == Some(AvcPacketType::SequenceHeader)
            {
                flag = UnitFlag::Initial;
                self.video_sequence_header = Some(data.clone());
                self.video_info = Some(Self::parse_video_info(codec, &data));
            } else {
                // Only coded frames open a GOP; end-of-sequence never does
                if flag == UnitFlag::Keyframe
                    && data.get(1).copied().and_then(AvcPacketType::from_byte)
                        != Some(AvcPacketType::Nalu)
                {
                    flag = UnitFlag::Frame;
                }
                pts = timestamp.wrapping_add_signed(h264::composition_time(&data));
            }
        } else if self.video_info.is_none() {
            self.video_info = codec.map(|c| VideoInfo {
                codec: c.name(),
                width: 0,
                height: 0,
                profile: "",
                level: String::new(),
            });
        }

        MediaUnit::Video {
            codec: codec_id,
            pts,
            dts: timestamp,
            flag,
            data,
        }
    }

    fn parse_video_info(codec: VideoCodec, data: &[u8]) -> VideoInfo {
        let record = data.get(5..).unwrap_or_default();
        let mut info = VideoInfo {
            codec: codec.name(),
            width: 0,
            height: 0,
            profile: "",
            level: String::new(),
        };

        match codec {
            VideoCodec::Avc => match AvcConfig::parse(record) {
                Ok(config) => {
                    let (width, height) = config.dimensions.unwrap_or((0, 0));
                    info.width = width;
                    info.height = height;
                    info.profile = config.profile_name();
                    info.level = config.level_string();
                }
                Err(e) => tracing::debug!(error = %e, "Unparseable AVC sequence header"),
            },
            VideoCodec::Hevc => match HevcConfig::parse(record) {
                Ok(config) => {
                    info.profile = config.profile_name();
                    info.level = format!("{}", config.level as f32 / 30.0);
                }
                Err(e) => tracing::debug!(error = %e, "Unparseable HEVC sequence header"),
            },
            _ => {}
        }

        info
    }

    fn decode_script(&mut self, timestamp: u32, data: Bytes) -> MediaUnit {
        match script_name(&data) {
            Some("onMetaData") | Some("@setDataFrame") => {
                self.metadata = Some(data.clone());
            }
            name => tracing::trace!(name = ?name, "Ignoring script tag for metadata"),
        }

        MediaUnit::Script {
            time: timestamp,
            data,
        }
    }

    /// Latest `onMetaData` script body
    pub fn metadata(&self) -> Option<&Bytes> {
        self.metadata.as_ref()
    }

    /// Audio sequence header tag body (AAC only)
    pub fn audio_sequence_header(&self) -> Option<&Bytes> {
        self.audio_sequence_header.as_ref()
    }

    /// Video sequence header tag body (AVC/HEVC only)
    pub fn video_sequence_header(&self) -> Option<&Bytes> {
        self.video_sequence_header.as_ref()
    }

    pub fn audio_info(&self) -> Option<&AudioInfo> {
        self.audio_info.as_ref()
    }

    pub fn video_info(&self) -> Option<&VideoInfo> {
        self.video_info.as_ref()
    }
}

/// Name of an AMF0 script tag (the leading string value)
fn script_name(data: &[u8]) -> Option<&str> {
    if data.len() < 3 || data[0] != 0x02 {
        return None;
    }
    let len = u16::from_be_bytes([data[1], data[2]]) as usize;
    std::str::from_utf8(data.get(3..3 + len)?).ok()
}

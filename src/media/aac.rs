//! AAC sequence header parsing
//!
//! FLV carries AAC without ADTS headers. The first AAC packet of a stream is
//! the sequence header, whose body is an AudioSpecificConfig:
//!
//! ```text
//! +----------+----------+----------+----------+---------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AACType | AACData
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  | (1 byte)|
//! +----------+----------+----------+----------+---------+
//! ```
//!
//! AACPacketType 0 is the sequence header, 1 a raw frame.

use crate::error::{MediaError, Result};

/// AAC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader = 0,
    /// Raw AAC frame data
    Raw = 1,
}

impl AacPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AacPacketType::SequenceHeader),
            1 => Some(AacPacketType::Raw),
            _ => None,
        }
    }
}

/// AudioSpecificConfig (from sequence header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (profile)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration (1=mono, 2=stereo, etc.)
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Parse from the bytes following the AACPacketType byte
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(MediaError::InvalidAacPacket.into());
        }

        // audioObjectType: 5 bits, samplingFrequencyIndex: 4 bits,
        // [explicit frequency: 24 bits], channelConfiguration: 4 bits
        let audio_object_type = (data[0] >> 3) & 0x1F;
        let sampling_frequency_index = ((data[0] & 0x07) << 1) | (data[1] >> 7);

        let (sampling_frequency, channel_configuration) = if sampling_frequency_index == 0x0F {
            if data.len() < 5 {
                return Err(MediaError::InvalidAacPacket.into());
            }
            let freq = ((data[1] as u32 & 0x7F) << 17)
                | ((data[2] as u32) << 9)
                | ((data[3] as u32) << 1)
                | (data[4] as u32 >> 7);
            (freq, (data[4] >> 3) & 0x0F)
        } else {
            let freq = Self::SAMPLING_FREQUENCIES
                .get(sampling_frequency_index as usize)
                .copied()
                .ok_or(MediaError::InvalidAacPacket)?;
            (freq, (data[1] >> 3) & 0x0F)
        };

        Ok(AudioSpecificConfig {
            audio_object_type,
            sampling_frequency_index,
            sampling_frequency,
            channel_configuration,
        })
    }

    /// Get channel count
    pub fn channels(&self) -> u8 {
        match self.channel_configuration {
            7 => 8, // 7.1
            c @ 1..=6 => c,
            _ => 0,
        }
    }

    /// Human readable profile name
    pub fn profile_name(&self) -> &'static str {
        match self.audio_object_type {
            1 => "Main",
            2 => "LC",
            3 => "SSR",
            4 => "LTP",
            5 => "HE",
            29 => "HEv2",
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_specific_config_parse() {
        // AAC-LC, 44100 Hz, Stereo
        let config = AudioSpecificConfig::parse(&[0x12, 0x10]).unwrap();
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.sampling_frequency_index, 4);
        assert_eq!(config.sampling_frequency, 44100);
        assert_eq!(config.channels(), 2);
        assert_eq!(config.profile_name(), "LC");
    }

    #[test]
    fn test_audio_specific_config_48k_mono() {
        // AAC-LC (2), index 3 (48000), mono: 00010 0011 0001 000
        let config = AudioSpecificConfig::parse(&[0x11, 0x88]).unwrap();
        assert_eq!(config.sampling_frequency, 48000);
        assert_eq!(config.channels(), 1);
    }

    #[test]
    fn test_audio_specific_config_too_short() {
        assert!(AudioSpecificConfig::parse(&[0x12]).is_err());
        assert!(AudioSpecificConfig::parse(&[]).is_err());
    }

    #[test]
    fn test_audio_specific_config_reserved_index() {
        // index 13 is reserved
        let b0 = (2 << 3) | (13 >> 1);
        let b1 = (13 & 1) << 7 | (2 << 3);
        assert!(AudioSpecificConfig::parse(&[b0, b1]).is_err());
    }

    #[test]
    fn test_aac_packet_type() {
        assert_eq!(
            AacPacketType::from_byte(0),
            Some(AacPacketType::SequenceHeader)
        );
        assert_eq!(AacPacketType::from_byte(1), Some(AacPacketType::Raw));
        assert_eq!(AacPacketType::from_byte(2), None);
    }
}

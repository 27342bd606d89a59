//! H.264/AVC and H.265/HEVC sequence header parsing
//!
//! FLV video packets for AVC and HEVC share one layout:
//!
//! ```text
//! +----------+----------+------------+-----------------+---------+
//! | FrameType| CodecID  | PacketType | CompositionTime | Data... |
//! | (4 bits) | (4 bits) | (1 byte)   | (3 bytes, SI24) |         |
//! +----------+----------+------------+-----------------+---------+
//! ```
//!
//! PacketType 0 carries the decoder configuration record. Only the parts
//! needed to describe the stream (profile, level, dimensions) are parsed.

use crate::error::{MediaError, Result};

/// AVC/HEVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// Decoder configuration record
    SequenceHeader = 0,
    /// Coded frame data
    Nalu = 1,
    /// End of sequence
    EndOfSequence = 2,
}

impl AvcPacketType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AvcPacketType::SequenceHeader),
            1 => Some(AvcPacketType::Nalu),
            2 => Some(AvcPacketType::EndOfSequence),
            _ => None,
        }
    }
}

/// Signed 24-bit composition time offset from a video packet
pub fn composition_time(data: &[u8]) -> i32 {
    if data.len() < 5 {
        return 0;
    }
    let raw = i32::from_be_bytes([0, data[2], data[3], data[4]]);
    (raw << 8) >> 8
}

/// AVC decoder configuration (from sequence header)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
    /// Dimensions from the first SPS, if it could be parsed
    pub dimensions: Option<(u32, u32)>,
}

impl AvcConfig {
    /// Parse an AVCDecoderConfigurationRecord
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 6 || data[0] != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        let profile = data[1];
        let level = data[3];
        let num_sps = (data[5] & 0x1F) as usize;

        let mut dimensions = None;
        if num_sps > 0 {
            if data.len() < 8 {
                return Err(MediaError::InvalidAvcPacket.into());
            }
            let sps_len = u16::from_be_bytes([data[6], data[7]]) as usize;
            let sps = data
                .get(8..8 + sps_len)
                .ok_or(MediaError::InvalidAvcPacket)?;
            dimensions = SpsInfo::parse(sps).ok().map(|s| (s.width, s.height));
        }

        Ok(AvcConfig {
            profile,
            level,
            dimensions,
        })
    }

    /// Get profile name
    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            66 => "Baseline",
            77 => "Main",
            88 => "Extended",
            100 => "High",
            110 => "High 10",
            122 => "High 4:2:2",
            244 => "High 4:4:4",
            _ => "Unknown",
        }
    }

    /// Get level as string (e.g., "3.1")
    pub fn level_string(&self) -> String {
        format!("{}.{}", self.level / 10, self.level % 10)
    }
}

/// HEVC decoder configuration (only the general profile is extracted)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcConfig {
    pub profile: u8,
    pub level: u8,
}

impl HevcConfig {
    /// Parse an HEVCDecoderConfigurationRecord
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 13 || data[0] != 1 {
            return Err(MediaError::InvalidAvcPacket.into());
        }

        Ok(HevcConfig {
            profile: data[1] & 0x1F,
            level: data[12],
        })
    }

    pub fn profile_name(&self) -> &'static str {
        match self.profile {
            1 => "Main",
            2 => "Main 10",
            3 => "Main Still Picture",
            _ => "Unknown",
        }
    }
}

/// Fields decoded from a sequence parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpsInfo {
    pub profile: u8,
    pub level: u8,
    pub width: u32,
    pub height: u32,
}

impl SpsInfo {
    /// Parse a SPS NAL unit (including its one-byte NAL header)
    pub fn parse(nalu: &[u8]) -> Result<Self> {
        let rbsp = strip_emulation_prevention(nalu.get(1..).ok_or(MediaError::InvalidSps)?);
        let mut r = BitReader::new(&rbsp);

        let profile = r.read_bits(8)? as u8;
        r.skip(8)?; // constraint flags
        let level = r.read_bits(8)? as u8;
        r.read_ue()?; // seq_parameter_set_id

        let mut chroma_format_idc = 1;
        if matches!(
            profile,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            chroma_format_idc = r.read_ue()?;
            if chroma_format_idc == 3 {
                r.skip(1)?; // separate_colour_plane_flag
            }
            r.read_ue()?; // bit_depth_luma_minus8
            r.read_ue()?; // bit_depth_chroma_minus8
            r.skip(1)?; // qpprime_y_zero_transform_bypass_flag
            if r.read_bit()? {
                let lists = if chroma_format_idc != 3 { 8 } else { 12 };
                for i in 0..lists {
                    if r.read_bit()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        r.read_ue()?; // log2_max_frame_num_minus4
        match r.read_ue()? {
            0 => {
                r.read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                r.skip(1)?; // delta_pic_order_always_zero_flag
                r.read_se()?; // offset_for_non_ref_pic
                r.read_se()?; // offset_for_top_to_bottom_field
                for _ in 0..r.read_ue()? {
                    r.read_se()?;
                }
            }
            _ => {}
        }
        r.read_ue()?; // max_num_ref_frames
        r.skip(1)?; // gaps_in_frame_num_value_allowed_flag

        let width_mbs = r.read_ue()? + 1;
        let height_map_units = r.read_ue()? + 1;
        let frame_mbs_only = r.read_bit()?;
        if !frame_mbs_only {
            r.skip(1)?; // mb_adaptive_frame_field_flag
        }
        r.skip(1)?; // direct_8x8_inference_flag

        let (mut crop_left, mut crop_right, mut crop_top, mut crop_bottom) = (0, 0, 0, 0);
        if r.read_bit()? {
            crop_left = r.read_ue()?;
            crop_right = r.read_ue()?;
            crop_top = r.read_ue()?;
            crop_bottom = r.read_ue()?;
        }

        let (crop_unit_x, crop_unit_y) = match chroma_format_idc {
            0 | 3 => (1, 2 - frame_mbs_only as u32),
            2 => (2, 2 - frame_mbs_only as u32),
            _ => (2, 2 * (2 - frame_mbs_only as u32)),
        };

        let width = coded_size(width_mbs, 1, crop_left, crop_right, crop_unit_x)?;
        let height = coded_size(
            height_map_units,
            2 - frame_mbs_only as u32,
            crop_top,
            crop_bottom,
            crop_unit_y,
        )?;

        Ok(SpsInfo {
            profile,
            level,
            width,
            height,
        })
    }
}

/// Luma samples along one axis after cropping
///
/// Every factor comes straight from the bitstream, so overflow means a
/// corrupt SPS.
fn coded_size(units: u32, fields: u32, crop_a: u32, crop_b: u32, crop_unit: u32) -> Result<u32> {
    let coded = units
        .checked_mul(16)
        .and_then(|v| v.checked_mul(fields))
        .ok_or(MediaError::InvalidSps)?;
    let crop = crop_a
        .checked_add(crop_b)
        .and_then(|v| v.checked_mul(crop_unit))
        .ok_or(MediaError::InvalidSps)?;
    Ok(coded.saturating_sub(crop))
}

fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale: i32 = 8;
    let mut next_scale: i32 = 8;
    for _ in 0..size {
        if next_scale != 0 {
            let delta = r.read_se()?;
            if !(-128..=127).contains(&delta) {
                return Err(MediaError::InvalidSps.into());
            }
            next_scale = (last_scale + delta + 256) % 256;
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

/// Remove 0x03 emulation prevention bytes from a NAL payload
fn strip_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &b in data {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if b == 0 { zeros + 1 } else { 0 };
        out.push(b);
    }
    out
}

/// MSB-first bit reader with Exp-Golomb support
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bit(&mut self) -> Result<bool> {
        let byte = *self
            .data
            .get(self.pos / 8)
            .ok_or(MediaError::InvalidSps)?;
        let bit = (byte >> (7 - (self.pos % 8))) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    fn read_bits(&mut self, n: u32) -> Result<u32> {
        let mut value = 0;
        for _ in 0..n {
            value = (value << 1) | self.read_bit()? as u32;
        }
        Ok(value)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() * 8 {
            return Err(MediaError::InvalidSps.into());
        }
        self.pos += n;
        Ok(())
    }

    fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_bit()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(MediaError::InvalidSps.into());
            }
        }
        Ok((1u32 << leading_zeros) - 1 + self.read_bits(leading_zeros)?)
    }

    fn read_se(&mut self) -> Result<i32> {
        let k = self.read_ue()?;
        if k % 2 == 1 {
            Ok(((k + 1) / 2) as i32)
        } else {
            Ok(-((k / 2) as i32))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds SPS bitstreams for tests
    struct BitWriter {
        bytes: Vec<u8>,
        bits: usize,
    }

    impl BitWriter {
        fn new() -> Self {
            Self {
                bytes: Vec::new(),
                bits: 0,
            }
        }

        fn bit(&mut self, b: bool) {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }
            if b {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 1 << (7 - (self.bits % 8));
            }
            self.bits += 1;
        }

        fn bits(&mut self, value: u32, n: u32) {
            for i in (0..n).rev() {
                self.bit((value >> i) & 1 == 1);
            }
        }

        fn ue(&mut self, value: u32) {
            let x = value + 1;
            let n = 32 - x.leading_zeros();
            self.bits(0, n - 1);
            self.bits(x, n);
        }

        fn finish(mut self) -> Vec<u8> {
            // rbsp_stop_one_bit
            self.bit(true);
            self.bytes
        }
    }

    fn baseline_sps(width_mbs: u32, height_mbs: u32, crop_bottom: Option<u32>) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.bits(66, 8); // profile_idc
        w.bits(0xC0, 8); // constraint flags
        w.bits(31, 8); // level_idc
        w.ue(0); // sps_id
        w.ue(0); // log2_max_frame_num_minus4
        w.ue(0); // pic_order_cnt_type
        w.ue(0); // log2_max_pic_order_cnt_lsb_minus4
        w.ue(1); // max_num_ref_frames
        w.bit(false); // gaps
        w.ue(width_mbs - 1);
        w.ue(height_mbs - 1);
        w.bit(true); // frame_mbs_only
        w.bit(true); // direct_8x8
        match crop_bottom {
            Some(bottom) => {
                w.bit(true);
                w.ue(0);
                w.ue(0);
                w.ue(0);
                w.ue(bottom);
            }
            None => w.bit(false),
        }
        w.bit(false); // vui_parameters_present_flag

        let mut nalu = vec![0x67];
        nalu.extend(w.finish());
        nalu
    }

    #[test]
    fn test_sps_720p() {
        let sps = baseline_sps(80, 45, None);
        let info = SpsInfo::parse(&sps).unwrap();
        assert_eq!(info.profile, 66);
        assert_eq!(info.level, 31);
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
    }

    #[test]
    fn test_sps_1080p_cropped() {
        // 1088 coded lines cropped by 4 * 2 to 1080
        let sps = baseline_sps(120, 68, Some(4));
        let info = SpsInfo::parse(&sps).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.height, 1080);
    }

    #[test]
    fn test_sps_truncated() {
        assert!(SpsInfo::parse(&[0x67, 66]).is_err());
        assert!(SpsInfo::parse(&[]).is_err());
    }

    #[test]
    fn test_sps_oversized_dimensions() {
        // 2^28 macroblocks wide overflows the sample count
        let sps = baseline_sps(1 << 28, 45, None);
        assert!(SpsInfo::parse(&sps).is_err());

        let sps = baseline_sps(80, u32::MAX - 1, None);
        assert!(SpsInfo::parse(&sps).is_err());

        // Crop offsets that overflow when scaled
        let sps = baseline_sps(80, 45, Some(u32::MAX - 1));
        assert!(SpsInfo::parse(&sps).is_err());
    }

    #[test]
    fn test_sps_scaling_delta_out_of_range() {
        let mut w = BitWriter::new();
        w.bits(100, 8); // High profile reads scaling lists
        w.bits(0, 8);
        w.bits(40, 8);
        w.ue(0); // sps_id
        w.ue(1); // chroma_format_idc
        w.ue(0);
        w.ue(0);
        w.bit(false);
        w.bit(true); // seq_scaling_matrix_present_flag
        w.bit(true); // first list present
        w.ue(u32::MAX - 1); // delta_scale far outside -128..=127
        let mut nalu = vec![0x67];
        nalu.extend(w.finish());

        assert!(SpsInfo::parse(&nalu).is_err());
    }

    #[test]
    fn test_avc_config_hostile_sps_still_parses() {
        let sps = baseline_sps(1 << 28, 45, None);
        let mut record = vec![1, 100, 0, 40, 0xFF, 0xE1];
        record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        record.extend_from_slice(&sps);

        let config = AvcConfig::parse(&record).unwrap();
        assert_eq!(config.profile_name(), "High");
        assert_eq!(config.dimensions, None);
    }

    #[test]
    fn test_emulation_prevention() {
        assert_eq!(
            strip_emulation_prevention(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03]),
            vec![0x00, 0x00, 0x01, 0x00, 0x00]
        );
    }

    #[test]
    fn test_avc_config_with_sps() {
        let sps = baseline_sps(80, 45, None);
        let mut record = vec![1, 66, 0xC0, 31, 0xFF, 0xE1];
        record.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        record.extend_from_slice(&sps);
        record.extend_from_slice(&[1, 0, 4, 0x68, 0xCE, 0x3C, 0x80]);

        let config = AvcConfig::parse(&record).unwrap();
        assert_eq!(config.profile_name(), "Baseline");
        assert_eq!(config.level_string(), "3.1");
        assert_eq!(config.dimensions, Some((1280, 720)));
    }

    #[test]
    fn test_avc_config_invalid() {
        assert!(AvcConfig::parse(&[0, 66, 0, 31, 0xFF, 0xE1]).is_err());
        assert!(AvcConfig::parse(&[1, 66]).is_err());
        // SPS length runs past the end
        assert!(AvcConfig::parse(&[1, 66, 0, 31, 0xFF, 0xE1, 0x00, 0x20, 0x67]).is_err());
    }

    #[test]
    fn test_hevc_config() {
        let mut record = vec![1, 0x01, 0x60, 0, 0, 0, 0x90, 0, 0, 0, 0, 0, 93];
        record.extend_from_slice(&[0xF0, 0x00]);
        let config = HevcConfig::parse(&record).unwrap();
        assert_eq!(config.profile_name(), "Main");
        assert_eq!(config.level, 93);
        assert!(HevcConfig::parse(&record[..5]).is_err());
    }

    #[test]
    fn test_composition_time() {
        assert_eq!(composition_time(&[0x17, 0x01, 0x00, 0x00, 0x42]), 0x42);
        assert_eq!(composition_time(&[0x17, 0x01, 0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(composition_time(&[0x17, 0x01]), 0);
    }
}

//! Media handling for FLV streams
//!
//! This module provides:
//! - FLV header/tag framing and the ingest tag reader
//! - Tag demuxing into audio/video/script units
//! - AAC and AVC/HEVC sequence header parsing for stream info
//! - GOP caching for late-joiner support

pub mod aac;
pub mod demux;
pub mod flv;
pub mod gop;
pub mod h264;

pub use demux::{AudioInfo, FlvDemuxer, MediaUnit, UnitFlag, VideoInfo};
pub use flv::{encode_header, encode_tag, FlvHeader, FlvTagType, RawTag, TagReader, WireTag};
pub use gop::GopCache;

//! GOP (Group of Pictures) cache for late-joiner support
//!
//! A player joining mid-stream needs the most recent keyframe and every
//! chunk after it, or its decoder shows nothing until the next keyframe.
//! The cache keeps exactly that window, already wire-framed, so a joining
//! player can be bootstrapped with plain writes.
//!
//! Audio chunks are interleaved in the same window, so a bootstrapped player
//! gets the audio that belongs to the buffered pictures as well.

use std::collections::VecDeque;

use super::flv::WireTag;

/// Default byte budget for one GOP (4MB)
pub const DEFAULT_GOP_CACHE_SIZE: usize = 4 * 1024 * 1024;

/// Wire-framed chunks since the last keyframe
#[derive(Debug)]
pub struct GopCache {
    /// Maximum cache size in bytes
    max_size: usize,
    /// Current cache size in bytes
    current_size: usize,
    /// Chunks in append order, starting with a keyframe
    frames: VecDeque<WireTag>,
    /// Whether a keyframe has opened the current window
    has_complete_gop: bool,
}

impl GopCache {
    /// Create an empty cache with the default byte budget
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_GOP_CACHE_SIZE)
    }

    /// Create an empty cache with the given byte budget
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            current_size: 0,
            frames: VecDeque::new(),
            has_complete_gop: false,
        }
    }

    /// Drop the current window and open a new one at a keyframe
    ///
    /// The keyframe itself is appended by the caller with [`push`](Self::push).
    pub fn start_gop(&mut self) {
        self.clear();
        self.has_complete_gop = true;
    }

    /// Append a chunk to the current window
    ///
    /// Chunks arriving before the first keyframe are ignored. If the window
    /// outgrows the byte budget it is discarded until the next keyframe.
    /// Returns true if the chunk was retained.
    pub fn push(&mut self, tag: WireTag) -> bool {
        if !self.has_complete_gop {
            return false;
        }

        if self.current_size + tag.len() > self.max_size {
            tracing::debug!(
                size = self.current_size,
                max_size = self.max_size,
                "GOP exceeds cache budget, waiting for next keyframe"
            );
            self.clear();
            return false;
        }

        self.current_size += tag.len();
        self.frames.push_back(tag);
        true
    }

    /// Drop every chunk and wait for the next keyframe
    pub fn clear(&mut self) {
        self.frames.clear();
        self.current_size = 0;
        self.has_complete_gop = false;
    }

    /// Iterate chunks in append order
    pub fn iter(&self) -> impl Iterator<Item = &WireTag> {
        self.frames.iter()
    }

    /// Check if a keyframe has opened the current window
    pub fn has_complete_gop(&self) -> bool {
        self.has_complete_gop
    }

    /// Get the number of cached chunks
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Get the current cache size in bytes
    pub fn size(&self) -> usize {
        self.current_size
    }

    /// Get cache utilization as a percentage
    pub fn utilization(&self) -> f32 {
        if self.max_size > 0 {
            (self.current_size as f32 / self.max_size as f32) * 100.0
        } else {
            0.0
        }
    }
}

impl Default for GopCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::flv::FlvTagType;

    fn video(timestamp: u32, keyframe: bool, size: usize) -> WireTag {
        let mut data = vec![0u8; size];
        data[0] = if keyframe { 0x17 } else { 0x27 };
        WireTag::new(FlvTagType::Video, timestamp, &data)
    }

    /// Mirrors the publisher's bookkeeping for one video chunk
    fn feed(cache: &mut GopCache, tag: WireTag, keyframe: bool) {
        if keyframe {
            cache.start_gop();
        }
        cache.push(tag);
    }

    fn timestamps(cache: &GopCache) -> Vec<u32> {
        cache
            .iter()
            .map(|t| u32::from_be_bytes([t.bytes[7], t.bytes[4], t.bytes[5], t.bytes[6]]))
            .collect()
    }

    #[test]
    fn test_keyframe_resets_window() {
        let mut cache = GopCache::new();

        feed(&mut cache, video(0, true, 50), true); // A
        feed(&mut cache, video(33, false, 20), false); // B
        feed(&mut cache, video(66, true, 50), true); // C
        feed(&mut cache, video(99, false, 20), false); // D

        assert_eq!(timestamps(&cache), vec![66, 99]);
        assert_eq!(cache.frame_count(), 2);
    }

    #[test]
    fn test_ignores_chunks_before_first_keyframe() {
        let mut cache = GopCache::new();

        assert!(!cache.push(video(0, false, 20)));
        assert!(!cache.push(WireTag::new(FlvTagType::Audio, 0, &[0xAF, 0x01])));
        assert_eq!(cache.frame_count(), 0);
        assert!(!cache.has_complete_gop());

        feed(&mut cache, video(33, true, 20), true);
        assert!(cache.push(WireTag::new(FlvTagType::Audio, 40, &[0xAF, 0x01])));
        assert_eq!(cache.frame_count(), 2);
    }

    #[test]
    fn test_append_order_preserved() {
        let mut cache = GopCache::new();

        feed(&mut cache, video(0, true, 10), true);
        cache.push(WireTag::new(FlvTagType::Audio, 5, &[0xAF, 0x01]));
        feed(&mut cache, video(10, false, 10), false);

        let types: Vec<_> = cache.iter().map(|t| t.tag_type).collect();
        assert_eq!(
            types,
            vec![FlvTagType::Video, FlvTagType::Audio, FlvTagType::Video]
        );
    }

    #[test]
    fn test_over_budget_waits_for_next_keyframe() {
        let tag_overhead = 15;
        let mut cache = GopCache::with_max_size(2 * (100 + tag_overhead));

        feed(&mut cache, video(0, true, 100), true);
        feed(&mut cache, video(33, false, 100), false);
        assert_eq!(cache.frame_count(), 2);

        // Third chunk overflows: the truncated GOP is dropped
        assert!(!cache.push(video(66, false, 100)));
        assert_eq!(cache.frame_count(), 0);
        assert_eq!(cache.size(), 0);

        // Inter frames stay out until a keyframe arrives
        assert!(!cache.push(video(99, false, 10)));
        feed(&mut cache, video(133, true, 10), true);
        assert_eq!(timestamps(&cache), vec![133]);
    }

    #[test]
    fn test_size_and_utilization() {
        let mut cache = GopCache::with_max_size(1000);
        assert_eq!(cache.utilization(), 0.0);

        feed(&mut cache, video(0, true, 485), true);
        assert_eq!(cache.size(), 500);
        assert!((cache.utilization() - 50.0).abs() < 0.01);
    }

    #[test]
    fn test_clear() {
        let mut cache = GopCache::default();
        feed(&mut cache, video(0, true, 10), true);
        cache.clear();

        assert_eq!(cache.frame_count(), 0);
        assert_eq!(cache.size(), 0);
        assert!(!cache.has_complete_gop());
    }
}

// SPDX-License-Identifier: MPL-2.0
//! FIFO frame cache backing sequential playback and short seeks.
//!
//! # Design
//!
//! - **FIFO eviction**: frames leave in insertion order, regardless of
//!   access pattern. Playback consumes frames in order, so the oldest
//!   frame is also the least likely to be asked for again
//! - **Frame-count bounded**: capacity counts frames, not bytes; entries
//!   share pixel data through `Arc`, so lookups are cheap clones
//! - **Index-keyed**: frames are addressed by absolute frame index
//! - **Externally synchronized**: no internal locking; the owning session
//!   serializes access
//!
//! # Usage
//!
//! ```
//! use stepframe::engine::frame_cache::FrameCache;
//! use stepframe::engine::frame::VideoFrame;
//!
//! let mut cache = FrameCache::new(4);
//! cache.put(VideoFrame::solid(7, 8, 8, [255, 0, 0]));
//! assert!(cache.get(7).is_some());
//! assert!(cache.get(8).is_none());
//! ```

use std::collections::{HashMap, VecDeque};

use super::frame::VideoFrame;

/// Statistics about cache performance.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of cache hits (frame found).
    pub hits: u64,

    /// Number of cache misses (frame not found).
    pub misses: u64,

    /// Number of frames evicted due to capacity.
    pub evictions: u64,

    /// Number of frames inserted.
    pub insertions: u64,
}

impl CacheStats {
    /// Returns the cache hit rate as a percentage (0.0 - 100.0).
    // Allow cast_precision_loss: cache statistics - exact precision not required
    // for percentages. Hit/miss counts are unlikely to exceed f64 mantissa (2^52).
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Bounded FIFO cache of decoded frames.
///
/// `get` never changes the eviction order. Re-inserting an index that is
/// already present is a no-op and keeps the original entry and its
/// insertion-order position.
pub struct FrameCache {
    /// Frame indices in insertion order; the front is evicted first.
    order: VecDeque<u64>,

    /// Cached frames keyed by frame index.
    frames: HashMap<u64, VideoFrame>,

    /// Maximum number of frames held at once.
    capacity: usize,

    /// Performance statistics.
    stats: CacheStats,
}

impl FrameCache {
    /// Creates a cache holding at most `capacity` frames. A capacity of
    /// zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            frames: HashMap::with_capacity(capacity),
            capacity,
            stats: CacheStats::default(),
        }
    }

    /// Inserts a frame, evicting the oldest entry when full.
    ///
    /// Returns `true` if the frame was inserted, `false` when its index
    /// was already cached (the existing entry is kept untouched).
    pub fn put(&mut self, frame: VideoFrame) -> bool {
        if self.frames.contains_key(&frame.index) {
            return false;
        }

        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.frames.remove(&oldest);
                self.stats.evictions += 1;
            }
        }

        self.order.push_back(frame.index);
        self.frames.insert(frame.index, frame);
        self.stats.insertions += 1;
        true
    }

    /// Looks up a frame by index without touching the eviction order.
    pub fn get(&mut self, index: u64) -> Option<VideoFrame> {
        match self.frames.get(&index) {
            Some(frame) => {
                self.stats.hits += 1;
                Some(frame.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Checks whether a frame index is cached. Does not count as a hit
    /// or miss.
    #[must_use]
    pub fn contains(&self, index: u64) -> bool {
        self.frames.contains_key(&index)
    }

    /// Changes the capacity. When shrinking, the oldest entries are
    /// evicted until the cache fits.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.frames.remove(&oldest);
                self.stats.evictions += 1;
            }
        }
    }

    /// Removes all cached frames. Statistics are preserved.
    pub fn clear(&mut self) {
        self.order.clear();
        self.frames.clear();
    }

    /// Returns the current capacity in frames.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current number of cached frames.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("len", &self.order.len())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish()
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Frame-accurate video source session.
//!
//! [`VideoSource`] ties a decoder, the FIFO frame cache, and the seek
//! planner into one sequential session with absolute frame addressing.
//!
//! # Design Notes
//!
//! - The session tracks a logical read position that can diverge from the
//!   decoder after a cache-served seek; the decoder realigns lazily right
//!   before the next physical read
//! - Every decoded frame enters the cache, including pre-roll frames from
//!   lookback walks, so repeated seeks into the same region get cheaper
//! - The session does no locking of its own; the playback controller
//!   wraps it in a mutex

use std::path::Path;

use crate::codec::ffmpeg::FfmpegDecoder;
use crate::codec::{probe_fast_seek, DecoderBackend, FrameDecoder, StreamProperties};
use crate::config::EngineConfig;
use crate::engine::frame::VideoFrame;
use crate::engine::frame_cache::{CacheStats, FrameCache};
use crate::engine::seek::{self, SeekContext, SeekPlan};
use crate::error::{Error, Result, SeekError};
use tracing::debug;

/// A single open video stream with positional reads, planned seeks, and
/// a frame cache.
///
/// All operations take `&mut self`; concurrent use is serialized by the
/// owner.
pub struct VideoSource {
    decoder: Option<Box<dyn FrameDecoder>>,
    cache: FrameCache,
    properties: StreamProperties,

    /// Index of the frame the next sequential read delivers.
    position: u64,

    /// Last frame index actually produced by the decoder.
    last_decoded: Option<u64>,

    /// Whether the stream tolerates exact positioning without a pre-roll.
    is_fast_seek: bool,

    /// Pre-roll depth (in frames) for streams that need one.
    lookback: u64,

    active_backend: DecoderBackend,
}

impl VideoSource {
    /// Opens `path` with FFmpeg and probes its random-access behavior.
    ///
    /// The fast-seek probe can be overridden through
    /// `config.assume_fast_seek` for streams the heuristic misjudges.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::Open`] from the decoder.
    pub fn open(path: &Path, config: &EngineConfig) -> Result<Self> {
        let decoder = FfmpegDecoder::open(path, config.backend, config.hardware_accel)?;
        let active_backend = decoder.active_backend();
        let is_fast_seek = config
            .assume_fast_seek
            .unwrap_or_else(|| probe_fast_seek(&decoder.properties().codec, path));

        debug!(
            path = %path.display(),
            codec = %decoder.properties().codec,
            frames = decoder.properties().total_frames,
            fast_seek = is_fast_seek,
            backend = %active_backend,
            "opened video source"
        );

        let mut source = Self::from_decoder(Box::new(decoder), is_fast_seek, config);
        source.active_backend = active_backend;
        Ok(source)
    }

    /// Builds a session around an existing decoder.
    ///
    /// This is how deterministic sources get injected in tests and
    /// benchmarks.
    #[must_use]
    pub fn from_decoder(
        decoder: Box<dyn FrameDecoder>,
        is_fast_seek: bool,
        config: &EngineConfig,
    ) -> Self {
        let properties = decoder.properties().clone();
        Self {
            decoder: Some(decoder),
            cache: FrameCache::new(config.cache_capacity as usize),
            properties,
            position: 0,
            last_decoded: None,
            is_fast_seek,
            lookback: u64::from(config.seek_lookback),
            active_backend: DecoderBackend::Software,
        }
    }

    /// Returns the next sequential frame, or `None` at the end of the
    /// stream. The frame is cached before it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] after [`close`](Self::close), or a decode
    /// error from the backend.
    pub fn read_next(&mut self) -> Result<Option<VideoFrame>> {
        self.read_aligned()
    }

    /// Delivers the frame at `target` (clamped into the stream), choosing
    /// the cheapest route: cache hit, short sequential advance, direct
    /// positioning, or a lookback walk.
    ///
    /// On success the next [`read_next`](Self::read_next) returns
    /// `target + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::EndOfStream`] wrapped in [`Error::Seek`] when
    /// the stream ends before the target frame appears, and
    /// [`Error::Closed`] on a closed session.
    pub fn seek(&mut self, target: u64) -> Result<VideoFrame> {
        if self.decoder.is_none() {
            return Err(Error::Closed);
        }

        let clamped = seek::clamp_target(target, self.properties.total_frames);
        let cached = self.cache.get(clamped);
        let plan = seek::plan(clamped, cached.is_some(), &self.seek_context());
        debug!(target, clamped, ?plan, "seek");

        match plan {
            SeekPlan::UseCache { frame } => match cached {
                Some(hit) => {
                    self.position = frame + 1;
                    Ok(hit)
                }
                // The entry left the cache between lookup and planning;
                // decode it like any cold target.
                None => self.walk_to(frame.saturating_sub(self.lookback), frame),
            },
            SeekPlan::SequentialAdvance { steps } => self.advance(clamped, steps),
            SeekPlan::DirectSeek { frame } => self.walk_to(frame, frame),
            SeekPlan::LookbackSeek { start, frame } => self.walk_to(start, frame),
        }
    }

    /// Releases the decoder and its OS resources. Safe to call more than
    /// once; subsequent reads and seeks fail with [`Error::Closed`].
    pub fn close(&mut self) {
        if self.decoder.take().is_some() {
            debug!("video source closed");
        }
        self.cache.clear();
    }

    /// Whether the session still holds a decoder.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.decoder.is_some()
    }

    /// Stream properties captured at open time.
    #[must_use]
    pub fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    /// Index of the frame the next sequential read returns.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Last frame index the decoder actually produced, if any.
    #[must_use]
    pub fn last_decoded(&self) -> Option<u64> {
        self.last_decoded
    }

    /// Whether seeks position directly instead of walking a pre-roll.
    #[must_use]
    pub fn is_fast_seek(&self) -> bool {
        self.is_fast_seek
    }

    /// Current pre-roll depth in frames.
    #[must_use]
    pub fn lookback(&self) -> u64 {
        self.lookback
    }

    /// Backend that is actually decoding this stream.
    #[must_use]
    pub fn active_backend(&self) -> DecoderBackend {
        self.active_backend
    }

    /// Frame cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of frames currently cached.
    #[must_use]
    pub fn cached_frames(&self) -> usize {
        self.cache.len()
    }

    /// Applies the live-updatable tuning values. Shrinking the cache
    /// evicts its oldest entries immediately.
    pub fn apply(&mut self, cache_capacity: u32, seek_lookback: u32) {
        self.cache.resize(cache_capacity as usize);
        self.lookback = u64::from(seek_lookback);
    }

    fn seek_context(&self) -> SeekContext {
        SeekContext {
            position: self.position,
            total_frames: self.properties.total_frames,
            is_fast_seek: self.is_fast_seek,
            lookback: self.lookback,
        }
    }

    /// One physical read at the logical position, realigning the decoder
    /// first when a cache-served seek left it elsewhere.
    fn read_aligned(&mut self) -> Result<Option<VideoFrame>> {
        let position = self.position;
        let decoder = self.decoder.as_mut().ok_or(Error::Closed)?;
        if decoder.position() != position {
            decoder.seek(position)?;
        }
        let Some(frame) = decoder.decode_next()? else {
            return Ok(None);
        };
        self.note_decoded(&frame);
        Ok(Some(frame))
    }

    /// Reaches `target` by plain sequential reads.
    fn advance(&mut self, target: u64, steps: u64) -> Result<VideoFrame> {
        let mut delivered = None;
        for _ in 0..steps {
            match self.read_aligned()? {
                Some(frame) => delivered = Some(frame),
                None => {
                    return Err(Error::Seek(SeekError::EndOfStream {
                        target,
                        last_decoded: self.last_decoded,
                    }))
                }
            }
        }
        delivered.ok_or_else(|| {
            Error::Seek(SeekError::Rejected("zero-step advance".to_string()))
        })
    }

    /// Positions the decoder at `start` and decodes forward until
    /// `target` appears, caching every frame on the way.
    fn walk_to(&mut self, start: u64, target: u64) -> Result<VideoFrame> {
        self.decoder
            .as_mut()
            .ok_or(Error::Closed)?
            .seek(start)?;
        self.position = start;

        loop {
            let decoder = self.decoder.as_mut().ok_or(Error::Closed)?;
            let Some(frame) = decoder.decode_next()? else {
                return Err(Error::Seek(SeekError::EndOfStream {
                    target,
                    last_decoded: self.last_decoded,
                }));
            };
            self.note_decoded(&frame);
            if frame.index >= target {
                return Ok(frame);
            }
        }
    }

    /// Bookkeeping shared by every path that produces a frame.
    fn note_decoded(&mut self, frame: &VideoFrame) {
        self.cache.put(frame.clone());
        self.last_decoded = Some(frame.index);
        self.position = frame.index + 1;
    }
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("open", &self.is_open())
            .field("position", &self.position)
            .field("fast_seek", &self.is_fast_seek)
            .field("lookback", &self.lookback)
            .field("cached_frames", &self.cache.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::synthetic::{stamp_color, SyntheticDecoder, SyntheticOps};

    fn test_config(cache_capacity: u32, seek_lookback: u32) -> EngineConfig {
        EngineConfig {
            cache_capacity,
            seek_lookback,
            ..EngineConfig::default()
        }
    }

    fn slow_source(total: u64) -> (VideoSource, SyntheticOps) {
        let decoder = SyntheticDecoder::new(total, 30.0);
        let ops = decoder.ops();
        let source = VideoSource::from_decoder(Box::new(decoder), false, &test_config(100, 20));
        (source, ops)
    }

    fn fast_source(total: u64) -> (VideoSource, SyntheticOps) {
        let decoder = SyntheticDecoder::new(total, 30.0).with_codec("mjpeg");
        let ops = decoder.ops();
        let source = VideoSource::from_decoder(Box::new(decoder), true, &test_config(100, 20));
        (source, ops)
    }

    #[test]
    fn sequential_reads_walk_the_stream() {
        let (mut source, ops) = slow_source(10);

        for expected in 0..3 {
            let frame = source.read_next().unwrap().unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!(frame.pixel(0, 0), stamp_color(expected));
        }

        assert_eq!(source.position(), 3);
        assert_eq!(source.last_decoded(), Some(2));
        assert_eq!(ops.decodes(), 3);
        assert_eq!(ops.seeks(), 0);
        assert_eq!(source.cached_frames(), 3);
    }

    #[test]
    fn read_past_end_returns_none_repeatedly() {
        let (mut source, _) = slow_source(3);

        for _ in 0..3 {
            assert!(source.read_next().unwrap().is_some());
        }
        assert!(source.read_next().unwrap().is_none());
        assert!(source.read_next().unwrap().is_none());
        assert_eq!(source.position(), 3);
    }

    #[test]
    fn seek_to_cached_frame_costs_no_decodes() {
        let (mut source, ops) = slow_source(100);
        for _ in 0..5 {
            source.read_next().unwrap();
        }
        assert_eq!(ops.decodes(), 5);

        let frame = source.seek(2).unwrap();
        assert_eq!(frame.index, 2);
        assert_eq!(frame.pixel(0, 0), stamp_color(2));
        assert_eq!(ops.decodes(), 5);
        assert_eq!(ops.seeks(), 0);
        assert_eq!(source.position(), 3);
    }

    #[test]
    fn read_after_cache_hit_realigns_decoder() {
        let (mut source, ops) = slow_source(100);
        for _ in 0..5 {
            source.read_next().unwrap();
        }

        source.seek(2).unwrap();
        let frame = source.read_next().unwrap().unwrap();

        assert_eq!(frame.index, 3);
        assert_eq!(ops.seeks(), 1);
        assert_eq!(ops.decodes(), 6);
    }

    #[test]
    fn short_forward_seek_advances_sequentially() {
        let (mut source, ops) = slow_source(100);
        source.read_next().unwrap();

        let frame = source.seek(8).unwrap();
        assert_eq!(frame.index, 8);
        assert_eq!(ops.decodes(), 9);
        assert_eq!(ops.seeks(), 0);
        assert_eq!(source.position(), 9);
    }

    #[test]
    fn fast_seek_decodes_exactly_one_frame() {
        let (mut source, ops) = fast_source(100);

        let frame = source.seek(50).unwrap();
        assert_eq!(frame.index, 50);
        assert_eq!(ops.decodes(), 1);
        assert_eq!(ops.seeks(), 1);
    }

    #[test]
    fn lookback_seek_decodes_the_preroll_window() {
        let (mut source, ops) = slow_source(200);

        let frame = source.seek(50).unwrap();
        assert_eq!(frame.index, 50);
        assert_eq!(ops.decodes(), 21);
        assert_eq!(ops.seeks(), 1);

        // The walk populated the cache for the whole window.
        for index in 30..=50 {
            let hit = source.seek(index).unwrap();
            assert_eq!(hit.index, index);
        }
        assert_eq!(ops.decodes(), 21);
    }

    #[test]
    fn lookback_clamps_at_stream_head() {
        let (mut source, ops) = slow_source(200);

        let frame = source.seek(10).unwrap();
        assert_eq!(frame.index, 10);
        assert_eq!(ops.decodes(), 11);
    }

    #[test]
    fn seek_clamps_to_final_frame() {
        let (mut source, _) = slow_source(100);

        let frame = source.seek(500).unwrap();
        assert_eq!(frame.index, 99);
        assert_eq!(source.position(), 100);
    }

    #[test]
    fn end_of_stream_during_walk_is_an_error() {
        let decoder = SyntheticDecoder::new(90, 30.0).with_reported_total(100);
        let mut source =
            VideoSource::from_decoder(Box::new(decoder), false, &test_config(100, 20));

        let result = source.seek(95);
        match result {
            Err(Error::Seek(SeekError::EndOfStream {
                target,
                last_decoded,
            })) => {
                assert_eq!(target, 95);
                assert_eq!(last_decoded, Some(89));
            }
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }

    #[test]
    fn close_makes_operations_fail() {
        let (mut source, _) = slow_source(10);
        source.read_next().unwrap();

        source.close();
        source.close();

        assert!(!source.is_open());
        assert!(matches!(source.read_next(), Err(Error::Closed)));
        assert!(matches!(source.seek(0), Err(Error::Closed)));
    }

    #[test]
    fn apply_shrinks_cache_and_updates_lookback() {
        let (mut source, _) = slow_source(100);
        for _ in 0..10 {
            source.read_next().unwrap();
        }
        assert_eq!(source.cached_frames(), 10);

        source.apply(4, 50);
        assert_eq!(source.cached_frames(), 4);
        assert_eq!(source.lookback(), 50);

        // Oldest entries went first; the newest survive.
        assert!(source.seek(6).is_ok());
        let stats_before = source.cache_stats().hits;
        source.seek(9).unwrap();
        assert!(source.cache_stats().hits > stats_before);
    }
}

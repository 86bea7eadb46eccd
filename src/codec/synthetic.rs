// SPDX-License-Identifier: MPL-2.0
//! Deterministic in-memory frame source.
//!
//! Produces index-stamped frames without touching FFmpeg or the
//! filesystem. Used by unit tests, the integration suite, and benches to
//! exercise seek planning and playback with exact decode-operation counts;
//! also handy as a development source when no media is at hand.

use super::{FrameDecoder, StreamProperties};
use crate::engine::frame::VideoFrame;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared operation counters for a [`SyntheticDecoder`].
///
/// Clone this before handing the decoder to the engine; counts stay
/// observable after the decoder has been boxed and moved.
#[derive(Debug, Clone, Default)]
pub struct SyntheticOps {
    decodes: Arc<AtomicU64>,
    seeks: Arc<AtomicU64>,
}

impl SyntheticOps {
    /// Number of frames actually decoded so far.
    #[must_use]
    pub fn decodes(&self) -> u64 {
        self.decodes.load(Ordering::Relaxed)
    }

    /// Number of positional seeks issued so far.
    #[must_use]
    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::Relaxed)
    }
}

/// Deterministic frame source with a fixed frame count and rate.
///
/// Every frame is a solid color encoding its own index (see
/// [`stamp_color`]), so consumers can verify they received exactly the
/// frame they asked for.
#[derive(Debug)]
pub struct SyntheticDecoder {
    properties: StreamProperties,
    /// Frames the stream really produces; may be fewer than the count
    /// reported in `properties` (see [`Self::with_reported_total`]).
    actual_frames: u64,
    position: u64,
    ops: SyntheticOps,
    fail_after: Option<u64>,
}

/// Solid RGB color encoding a frame index (little-endian bytes).
#[must_use]
pub fn stamp_color(index: u64) -> [u8; 3] {
    [index as u8, (index >> 8) as u8, (index >> 16) as u8]
}

impl SyntheticDecoder {
    /// Creates a source with `total_frames` frames at `fps`, 8x8 pixels.
    #[must_use]
    pub fn new(total_frames: u64, fps: f64) -> Self {
        Self {
            properties: StreamProperties {
                width: 8,
                height: 8,
                fps,
                total_frames,
                codec: "synthetic".to_string(),
            },
            actual_frames: total_frames,
            position: 0,
            ops: SyntheticOps::default(),
            fail_after: None,
        }
    }

    /// Overrides the reported codec name (e.g. `"mjpeg"` to exercise the
    /// fast-seek probe).
    #[must_use]
    pub fn with_codec(mut self, codec: &str) -> Self {
        self.properties.codec = codec.to_string();
        self
    }

    /// Overrides the frame dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.properties.width = width;
        self.properties.height = height;
        self
    }

    /// Makes every decode past the first `decodes` fail, for error-path
    /// tests.
    #[must_use]
    pub fn with_failure_after(mut self, decodes: u64) -> Self {
        self.fail_after = Some(decodes);
        self
    }

    /// Reports `reported` frames in the stream properties while the
    /// stream keeps its real length. Mimics containers whose metadata
    /// overstates the frame count.
    #[must_use]
    pub fn with_reported_total(mut self, reported: u64) -> Self {
        self.properties.total_frames = reported;
        self
    }

    /// Shared operation counters; clone before moving the decoder.
    #[must_use]
    pub fn ops(&self) -> SyntheticOps {
        self.ops.clone()
    }
}

impl FrameDecoder for SyntheticDecoder {
    fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>> {
        if let Some(limit) = self.fail_after {
            if self.ops.decodes() >= limit {
                return Err(Error::Decode("injected decode failure".to_string()));
            }
        }
        if self.position >= self.actual_frames {
            return Ok(None);
        }
        let index = self.position;
        self.position += 1;
        self.ops.decodes.fetch_add(1, Ordering::Relaxed);
        Ok(Some(VideoFrame::solid(
            index,
            self.properties.width,
            self.properties.height,
            stamp_color(index),
        )))
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        self.ops.seeks.fetch_add(1, Ordering::Relaxed);
        self.position = frame_index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stamped_frames_in_order() {
        let mut decoder = SyntheticDecoder::new(3, 30.0);
        for expected in 0..3 {
            let frame = decoder.decode_next().unwrap().unwrap();
            assert_eq!(frame.index, expected);
            assert_eq!(frame.pixel(0, 0), stamp_color(expected));
        }
        assert!(decoder.decode_next().unwrap().is_none());
    }

    #[test]
    fn seek_repositions_next_decode() {
        let mut decoder = SyntheticDecoder::new(100, 30.0);
        decoder.seek(42).unwrap();
        let frame = decoder.decode_next().unwrap().unwrap();
        assert_eq!(frame.index, 42);
        assert_eq!(decoder.position(), 43);
    }

    #[test]
    fn seek_past_end_yields_end_of_stream() {
        let mut decoder = SyntheticDecoder::new(10, 30.0);
        decoder.seek(10).unwrap();
        assert!(decoder.decode_next().unwrap().is_none());
    }

    #[test]
    fn counters_survive_boxing() {
        let decoder = SyntheticDecoder::new(5, 30.0);
        let ops = decoder.ops();
        let mut boxed: Box<dyn FrameDecoder> = Box::new(decoder);
        boxed.decode_next().unwrap();
        boxed.decode_next().unwrap();
        boxed.seek(0).unwrap();
        assert_eq!(ops.decodes(), 2);
        assert_eq!(ops.seeks(), 1);
    }

    #[test]
    fn injected_failure_surfaces_as_decode_error() {
        let mut decoder = SyntheticDecoder::new(10, 30.0).with_failure_after(1);
        assert!(decoder.decode_next().is_ok());
        assert!(matches!(decoder.decode_next(), Err(Error::Decode(_))));
    }

    #[test]
    fn reported_total_can_overstate_real_length() {
        let mut decoder = SyntheticDecoder::new(3, 30.0).with_reported_total(10);
        assert_eq!(decoder.properties().total_frames, 10);
        for _ in 0..3 {
            assert!(decoder.decode_next().unwrap().is_some());
        }
        assert!(decoder.decode_next().unwrap().is_none());
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Decode and encode port definitions.
//!
//! This module defines the [`FrameDecoder`] and [`FrameSink`] traits that
//! decouple the engine from any concrete media backend, plus the small
//! enums describing backend and proxy codec choices. The FFmpeg adapters
//! live in [`ffmpeg`]; a deterministic in-memory source lives in
//! [`synthetic`].
//!
//! # Design Notes
//!
//! - Decoders are **stateful**: they track the next frame index to decode
//! - Frames are addressed by absolute index, not timestamps; adapters own
//!   the index-to-timestamp mapping
//! - Methods are not `async` - the engine drives decoders from its own
//!   worker thread
//! - Implementations must be `Send` (they cross into worker threads) but
//!   not `Sync`

pub mod ffmpeg;
pub mod synthetic;

use crate::engine::frame::VideoFrame;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// =============================================================================
// Stream properties
// =============================================================================

/// Properties of an opened video stream, read once at open time.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProperties {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate. Greater than zero for any playable stream.
    pub fps: f64,
    /// Total frame count, or 0 when the container does not report one.
    pub total_frames: u64,
    /// Short codec name as reported by the backend (e.g. `mjpeg`, `h264`).
    pub codec: String,
}

impl StreamProperties {
    /// Duration in seconds derived from frame count and rate, when both
    /// are known.
    #[must_use]
    pub fn duration_secs(&self) -> Option<f64> {
        if self.total_frames > 0 && self.fps > 0.0 {
            Some(self.total_frames as f64 / self.fps)
        } else {
            None
        }
    }
}

// =============================================================================
// FrameDecoder port
// =============================================================================

/// Port for index-addressed frame decoding.
///
/// Implementations maintain a position pointer: the index of the frame the
/// next [`decode_next`](FrameDecoder::decode_next) call will produce.
/// Positional seeks move only the pointer; whatever demuxer work is needed
/// to make the next read exact is the adapter's concern.
pub trait FrameDecoder: Send {
    /// Stream properties captured at open time.
    fn properties(&self) -> &StreamProperties;

    /// Decodes the frame at the current position and advances the pointer.
    ///
    /// Returns `Ok(None)` once the end of the stream is reached.
    ///
    /// # Errors
    ///
    /// Returns an error if decoding fails mid-stream.
    fn decode_next(&mut self) -> Result<Option<VideoFrame>>;

    /// Moves the position pointer so the next decode produces
    /// `frame_index`. Seeking at or past the end of a bounded stream is
    /// allowed; the next decode then reports end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the reposition request.
    fn seek(&mut self, frame_index: u64) -> Result<()>;

    /// Index of the frame the next decode will produce.
    fn position(&self) -> u64;
}

// =============================================================================
// FrameSink port
// =============================================================================

/// Port for writing frames to an output container.
///
/// Sinks are created for a fixed output geometry; rescaling the incoming
/// frames to that geometry is the sink's concern. `finish` must be called
/// for the container to be playable; dropping an unfinished sink leaves a
/// partial file for the caller to clean up.
pub trait FrameSink: Send {
    /// Encodes and writes one frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the container write fails.
    fn write(&mut self, frame: &VideoFrame) -> Result<()>;

    /// Flushes the encoder and finalizes the container. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the trailer cannot be written.
    fn finish(&mut self) -> Result<()>;
}

// =============================================================================
// Backend selection
// =============================================================================

/// Preferred decoder backend.
///
/// `Auto` lets the adapter choose: hardware families are probed only when
/// the hardware-acceleration flag is set, and the software decoder is the
/// final rung of every ladder. Substitutions are logged and reported in the
/// source info, never silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderBackend {
    #[default]
    Auto,
    Software,
    Cuda,
    QuickSync,
}

impl DecoderBackend {
    /// FFmpeg decoder-name suffix for hardware families
    /// (e.g. `h264` + `_cuvid` = `h264_cuvid`).
    #[must_use]
    pub fn decoder_suffix(self) -> Option<&'static str> {
        match self {
            DecoderBackend::Auto | DecoderBackend::Software => None,
            DecoderBackend::Cuda => Some("_cuvid"),
            DecoderBackend::QuickSync => Some("_qsv"),
        }
    }

    /// Hardware families probed, in order, when this preference is active.
    #[must_use]
    pub fn hardware_candidates(self, hardware_accel: bool) -> &'static [DecoderBackend] {
        match self {
            DecoderBackend::Auto if hardware_accel => {
                &[DecoderBackend::Cuda, DecoderBackend::QuickSync]
            }
            DecoderBackend::Cuda => &[DecoderBackend::Cuda],
            DecoderBackend::QuickSync => &[DecoderBackend::QuickSync],
            _ => &[],
        }
    }
}

impl fmt::Display for DecoderBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecoderBackend::Auto => "auto",
            DecoderBackend::Software => "software",
            DecoderBackend::Cuda => "cuda",
            DecoderBackend::QuickSync => "quicksync",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Proxy codec
// =============================================================================

/// Codec family for generated proxy files.
///
/// The container extension follows the codec: MJPEG proxies go into `.avi`
/// (every frame is a keyframe, which is what makes proxies scrub well),
/// everything else into `.mp4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyCodec {
    #[default]
    Mjpeg,
    Mpeg4,
    H264,
    Hevc,
}

impl ProxyCodec {
    /// Container extension for this codec family.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ProxyCodec::Mjpeg => "avi",
            ProxyCodec::Mpeg4 | ProxyCodec::H264 | ProxyCodec::Hevc => "mp4",
        }
    }

    /// Next rung of the writer fallback ladder. MPEG-4 part 2 is the
    /// broadly-available default; when that itself was requested, MJPEG is
    /// the terminal fallback.
    #[must_use]
    pub fn fallback(self) -> ProxyCodec {
        match self {
            ProxyCodec::Mpeg4 => ProxyCodec::Mjpeg,
            _ => ProxyCodec::Mpeg4,
        }
    }

    /// Whether every frame of this codec is independently decodable,
    /// making positional seeks frame-accurate.
    #[must_use]
    pub fn is_intra_only(self) -> bool {
        matches!(self, ProxyCodec::Mjpeg)
    }
}

impl fmt::Display for ProxyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProxyCodec::Mjpeg => "mjpeg",
            ProxyCodec::Mpeg4 => "mpeg4",
            ProxyCodec::H264 => "h264",
            ProxyCodec::Hevc => "hevc",
        };
        write!(f, "{}", name)
    }
}

// =============================================================================
// Fast-seek probe
// =============================================================================

/// Heuristic for frame-accurate positional seek support: intra-only MJPEG
/// streams and AVI containers qualify. This misclassifies some wrappings
/// (MJPEG-in-MP4 reads as slow-seek), which costs seek latency but never
/// correctness; the lookback depth is the safety net for the opposite
/// direction.
#[must_use]
pub fn probe_fast_seek(codec: &str, path: &Path) -> bool {
    if codec.eq_ignore_ascii_case("mjpeg") {
        return true;
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("avi"))
}

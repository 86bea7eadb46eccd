// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` adapters implementing the [`FrameDecoder`] and [`FrameSink`]
//! port traits.
//!
//! # Design Notes
//!
//! - Frame indices map to timestamps through the stream's average frame
//!   rate; positional seeks land on the preceding keyframe and the adapter
//!   decodes forward until the requested index so reads stay frame-accurate
//! - Hardware decoder families are probed by name (`h264_cuvid`,
//!   `hevc_qsv`, ...) with the software decoder as the final rung; every
//!   substitution is logged
//! - The adapters maintain internal state and are `Send` but not `Sync`
//!
//! [`FrameDecoder`]: super::FrameDecoder
//! [`FrameSink`]: super::FrameSink

use std::path::{Path, PathBuf};
use std::sync::Once;

use super::{DecoderBackend, FrameDecoder, FrameSink, ProxyCodec, StreamProperties};
use crate::engine::frame::{VideoFrame, FRAME_CHANNELS};
use crate::error::{Error, OpenError, Result, SeekError, TranscodeError};
use tracing::{debug, warn};

static FFMPEG_INIT: Once = Once::new();

/// Initializes the global `FFmpeg` state.
///
/// Safe to call from multiple threads; the actual initialization will only
/// happen once thanks to `std::sync::Once`. Sets the FFmpeg log level to
/// ERROR to suppress warning spam from probing.
pub fn init_ffmpeg() -> Result<()> {
    let mut init_result: Result<()> = Ok(());

    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            init_result = Err(Error::Io(format!("FFmpeg initialization failed: {e}")));
            return;
        }

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_ERROR);
        }
    });

    init_result
}

/// Internal decoder state that holds `FFmpeg` contexts.
///
/// Kept separate to manage the non-Send `FFmpeg` types properly. The state
/// is created fresh for each file and dropped when the adapter closes.
struct DecoderState {
    input_context: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    time_base_f64: f64,
}

// SAFETY: DecoderState contains FFmpeg types with internal raw pointers.
// These are safe to send between threads because:
// 1. FFmpeg's decoder/format contexts are thread-safe for single-threaded access per instance
// 2. We maintain exclusive access through Rust's ownership model
// 3. The decoder is only used from one thread at a time (move semantics)
unsafe impl Send for DecoderState {}

/// `FFmpeg`-based decoder implementing the [`FrameDecoder`] trait with
/// absolute frame addressing.
pub struct FfmpegDecoder {
    state: DecoderState,
    properties: StreamProperties,
    /// Index of the frame the next decode will produce.
    position: u64,
    /// After a positional seek, frames below this index are decoded and
    /// discarded so the next delivered frame is exact.
    pending_target: Option<u64>,
    /// Set once the demuxer ran dry and the decoder was told so; cleared
    /// by seeks. Repeated reads past the end stay `Ok(None)`.
    eof_sent: bool,
    requested_backend: DecoderBackend,
    active_backend: DecoderBackend,
}

impl FfmpegDecoder {
    /// Opens `path` with the preferred backend, falling back to the
    /// software decoder when a hardware family is unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`OpenError`] variants wrapped in [`Error::Open`]: `NotFound`
    /// for missing files, `NoVideoStream` when the container has no video,
    /// `UnsupportedBackend` when a requested hardware backend and the
    /// software fallback both fail, `CannotOpen`/`CorruptedFile` otherwise.
    pub fn open(path: &Path, backend: DecoderBackend, hardware_accel: bool) -> Result<Self> {
        init_ffmpeg()?;

        if !path.exists() {
            return Err(OpenError::NotFound(path.display().to_string()).into());
        }

        let input_context = ffmpeg_next::format::input(path)
            .map_err(|e| Error::Open(OpenError::from_message(&e.to_string())))?;

        let video_stream = input_context
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or(Error::Open(OpenError::NoVideoStream))?;

        let video_stream_index = video_stream.index();
        let parameters = video_stream.parameters();
        let codec_id = parameters.id();
        let codec_name = ffmpeg_next::decoder::find(codec_id)
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| format!("{codec_id:?}").to_lowercase());

        let frame_rate = video_stream.avg_frame_rate();
        let fps = if frame_rate.denominator() != 0 && frame_rate.numerator() != 0 {
            f64::from(frame_rate.numerator()) / f64::from(frame_rate.denominator())
        } else {
            30.0 // Default fallback
        };

        let time_base = video_stream.time_base();
        let time_base_f64 = f64::from(time_base.numerator()) / f64::from(time_base.denominator());

        let total_frames = Self::probe_total_frames(&input_context, &video_stream, fps);

        let (decoder, active_backend) =
            Self::open_decoder(&video_stream, &codec_name, backend, hardware_accel)?;

        let width = decoder.width();
        let height = decoder.height();
        if width == 0 || height == 0 {
            return Err(Error::Open(OpenError::CorruptedFile));
        }

        let scaler = Self::create_scaler(decoder.format(), width, height)?;

        Ok(Self {
            state: DecoderState {
                input_context,
                decoder,
                scaler,
                video_stream_index,
                time_base_f64,
            },
            properties: StreamProperties {
                width,
                height,
                fps,
                total_frames,
                codec: codec_name,
            },
            position: 0,
            pending_target: None,
            eof_sent: false,
            requested_backend: backend,
            active_backend,
        })
    }

    /// Backend the caller asked for.
    #[must_use]
    pub fn requested_backend(&self) -> DecoderBackend {
        self.requested_backend
    }

    /// Backend actually decoding; differs from the request after a
    /// fallback.
    #[must_use]
    pub fn active_backend(&self) -> DecoderBackend {
        self.active_backend
    }

    fn probe_total_frames(
        input_context: &ffmpeg_next::format::context::Input,
        stream: &ffmpeg_next::Stream<'_>,
        fps: f64,
    ) -> u64 {
        let reported = stream.frames();
        if reported > 0 {
            return reported as u64;
        }
        // Estimate from container duration when the stream does not
        // report a frame count (common for MKV).
        if input_context.duration() > 0 && fps > 0.0 {
            let duration_secs =
                input_context.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE);
            return (duration_secs * fps).round() as u64;
        }
        0
    }

    /// Walks the backend ladder: requested hardware families first, then
    /// the software decoder.
    fn open_decoder(
        stream: &ffmpeg_next::Stream<'_>,
        codec_name: &str,
        backend: DecoderBackend,
        hardware_accel: bool,
    ) -> Result<(ffmpeg_next::decoder::Video, DecoderBackend)> {
        let mut hardware_failed = false;

        for family in backend.hardware_candidates(hardware_accel) {
            let name = format!(
                "{}{}",
                codec_name,
                family.decoder_suffix().unwrap_or_default()
            );
            let Some(codec) = ffmpeg_next::decoder::find_by_name(&name) else {
                warn!(decoder = %name, "hardware decoder not present in this FFmpeg build");
                hardware_failed = true;
                continue;
            };
            let context =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| Error::Open(OpenError::from_message(&e.to_string())))?;
            match context.decoder().open_as(codec).and_then(|o| o.video()) {
                Ok(decoder) => {
                    debug!(decoder = %name, backend = %family, "opened hardware decoder");
                    return Ok((decoder, *family));
                }
                Err(e) => {
                    warn!(decoder = %name, error = %e, "hardware decoder failed to open, trying next");
                    hardware_failed = true;
                }
            }
        }

        let context = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| Error::Open(OpenError::from_message(&e.to_string())))?;
        match context.decoder().video() {
            Ok(decoder) => {
                if hardware_failed {
                    warn!(requested = %backend, "falling back to software decoding");
                }
                Ok((decoder, DecoderBackend::Software))
            }
            Err(e) => {
                if hardware_failed {
                    Err(Error::Open(OpenError::UnsupportedBackend {
                        requested: backend.to_string(),
                    }))
                } else {
                    Err(Error::Open(OpenError::from_message(&e.to_string())))
                }
            }
        }
    }

    /// Creates the packed-RGB scaler used for every delivered frame.
    fn create_scaler(
        src_format: ffmpeg_next::format::Pixel,
        width: u32,
        height: u32,
    ) -> Result<ffmpeg_next::software::scaling::Context> {
        ffmpeg_next::software::scaling::Context::get(
            src_format,
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| Error::Decode(format!("Failed to create scaler: {e}")))
    }

    /// Extracts packed RGB data from a scaled frame, handling stride
    /// correctly.
    #[allow(clippy::cast_possible_truncation)] // stride is always < u32::MAX for video frames
    fn extract_rgb_data(frame: &ffmpeg_next::frame::Video) -> Vec<u8> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let data = frame.data(0);
        let stride = frame.stride(0);

        let mut rgb_bytes = Vec::with_capacity(width * height * FRAME_CHANNELS);
        for y in 0..height {
            let row_start = y * stride;
            let row_end = row_start + width * FRAME_CHANNELS;
            rgb_bytes.extend_from_slice(&data[row_start..row_end]);
        }

        rgb_bytes
    }

    /// Frame index for a decoded frame, derived from its best-effort
    /// timestamp; falls back to the running position when the stream
    /// carries no timestamps.
    fn frame_index(&self, decoded: &ffmpeg_next::frame::Video) -> u64 {
        match decoded.timestamp() {
            Some(pts) => {
                let secs = pts as f64 * self.state.time_base_f64;
                (secs * self.properties.fps).round().max(0.0) as u64
            }
            None => self.position,
        }
    }

    /// Pulls the next raw frame out of the decoder, feeding packets as
    /// needed. Returns `None` at end of stream.
    fn receive_raw_frame(&mut self) -> Result<Option<ffmpeg_next::frame::Video>> {
        let mut decoded = ffmpeg_next::frame::Video::empty();

        // First try to receive a buffered frame
        if self.state.decoder.receive_frame(&mut decoded).is_ok() {
            return Ok(Some(decoded));
        }

        // Process packets until we get a frame or reach end of stream
        loop {
            let stream_index = self.state.video_stream_index;
            let packet = self
                .state
                .input_context
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);

            match packet {
                Some(packet) => {
                    self.state
                        .decoder
                        .send_packet(&packet)
                        .map_err(|e| Error::Decode(format!("Packet send failed: {e}")))?;
                    if self.state.decoder.receive_frame(&mut decoded).is_ok() {
                        return Ok(Some(decoded));
                    }
                }
                None => {
                    // Drain whatever the decoder still buffers after the
                    // demuxer runs dry.
                    if !self.eof_sent {
                        self.state
                            .decoder
                            .send_eof()
                            .map_err(|e| Error::Decode(format!("EOF signal failed: {e}")))?;
                        self.eof_sent = true;
                    }
                    if self.state.decoder.receive_frame(&mut decoded).is_ok() {
                        return Ok(Some(decoded));
                    }
                    return Ok(None);
                }
            }
        }
    }
}

impl FrameDecoder for FfmpegDecoder {
    fn properties(&self) -> &StreamProperties {
        &self.properties
    }

    fn decode_next(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            let Some(decoded) = self.receive_raw_frame()? else {
                self.pending_target = None;
                return Ok(None);
            };

            let index = self.frame_index(&decoded);

            // Discard pre-roll frames between the landed keyframe and the
            // seek target.
            if let Some(target) = self.pending_target {
                if index < target {
                    continue;
                }
                self.pending_target = None;
            }

            let mut rgb_frame = ffmpeg_next::frame::Video::empty();
            self.state
                .scaler
                .run(&decoded, &mut rgb_frame)
                .map_err(|e| Error::Decode(format!("Scaling failed: {e}")))?;

            let data = Self::extract_rgb_data(&rgb_frame);
            self.position = index + 1;
            return Ok(Some(VideoFrame::new(
                index,
                self.properties.width,
                self.properties.height,
                data,
            )));
        }
    }

    fn seek(&mut self, frame_index: u64) -> Result<()> {
        let fps = self.properties.fps;
        let target_secs = if fps > 0.0 {
            frame_index as f64 / fps
        } else {
            0.0
        };

        #[allow(clippy::cast_possible_truncation)]
        let timestamp = (target_secs * f64::from(ffmpeg_next::ffi::AV_TIME_BASE)) as i64;

        // Backward-inclusive range so the demuxer lands on the keyframe at
        // or before the target.
        self.state
            .input_context
            .seek(timestamp, ..timestamp)
            .map_err(|e| Error::Seek(SeekError::Rejected(e.to_string())))?;
        self.state.decoder.flush();

        self.position = frame_index;
        self.pending_target = Some(frame_index);
        self.eof_sent = false;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Internal writer state, split out for the same Send reasoning as
/// [`DecoderState`].
struct WriterState {
    output_context: ffmpeg_next::format::context::Output,
    encoder: ffmpeg_next::encoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    encoder_time_base: ffmpeg_next::Rational,
    stream_time_base: ffmpeg_next::Rational,
}

// SAFETY: same argument as DecoderState; the writer is owned by exactly one
// transcode worker at a time.
unsafe impl Send for WriterState {}

/// `FFmpeg`-based proxy writer implementing the [`FrameSink`] trait.
///
/// Scales incoming packed-RGB frames to the target geometry and encodes
/// them with the codec chosen at creation time. [`FrameSink::finish`] must
/// run for the container to be playable.
pub struct FfmpegWriter {
    state: WriterState,
    output_path: PathBuf,
    src_width: u32,
    src_height: u32,
    next_pts: i64,
    finished: bool,
}

impl FfmpegWriter {
    /// Creates a writer for `path`. `src` dimensions describe the incoming
    /// frames; `dst` dimensions must already be even.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::WriterUnavailable`] when the codec has no
    /// encoder in this FFmpeg build or the container rejects the stream.
    pub fn create(
        path: &Path,
        codec: ProxyCodec,
        src: (u32, u32),
        dst: (u32, u32),
        fps: u32,
    ) -> Result<Self> {
        init_ffmpeg()?;

        let codec_id = codec_id_for(codec);
        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            Error::Transcode(TranscodeError::WriterUnavailable(format!(
                "no encoder for {codec}"
            )))
        })?;

        let mut output_context = ffmpeg_next::format::output(&path)
            .map_err(|e| Error::Transcode(TranscodeError::WriterUnavailable(e.to_string())))?;

        let global_header = output_context
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER);

        let context = ffmpeg_next::codec::context::Context::new_with_codec(encoder_codec);
        let mut encoder = context
            .encoder()
            .video()
            .map_err(|e| Error::Transcode(TranscodeError::WriterUnavailable(e.to_string())))?;

        let encoder_time_base = ffmpeg_next::Rational::new(1, fps as i32);
        encoder.set_width(dst.0);
        encoder.set_height(dst.1);
        encoder.set_format(pixel_format_for(codec));
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(ffmpeg_next::Rational::new(fps as i32, 1)));
        if global_header {
            encoder.set_flags(ffmpeg_next::codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = ffmpeg_next::Dictionary::new();
        match codec {
            ProxyCodec::Mjpeg => {
                // MJPEG is quality-driven; clamp the quantizer range.
                opts.set("qmin", "2");
                opts.set("qmax", "8");
            }
            ProxyCodec::Mpeg4 => {
                encoder.set_bit_rate(dst.0 as usize * dst.1 as usize * 4);
            }
            ProxyCodec::H264 | ProxyCodec::Hevc => {
                encoder.set_bit_rate(0); // CRF controls quality
                opts.set("crf", "23");
                opts.set("preset", "medium");
                // Dense keyframes keep the proxy scrubbable.
                opts.set("g", "12");
            }
        }

        let opened = encoder
            .open_with(opts)
            .map_err(|e| Error::Transcode(TranscodeError::WriterUnavailable(e.to_string())))?;

        let mut stream = output_context
            .add_stream(encoder_codec)
            .map_err(|e| Error::Transcode(TranscodeError::WriterUnavailable(e.to_string())))?;
        stream.set_time_base(encoder_time_base);
        stream.set_parameters(&opened);

        output_context
            .write_header()
            .map_err(|e| Error::Transcode(TranscodeError::WriterUnavailable(e.to_string())))?;

        let stream_time_base = output_context
            .stream(0)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        let scaler = ffmpeg_next::software::scaling::Context::get(
            ffmpeg_next::format::Pixel::RGB24,
            src.0,
            src.1,
            pixel_format_for(codec),
            dst.0,
            dst.1,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| Error::Transcode(TranscodeError::WriterUnavailable(e.to_string())))?;

        Ok(Self {
            state: WriterState {
                output_context,
                encoder: opened,
                scaler,
                encoder_time_base,
                stream_time_base,
            },
            output_path: path.to_path_buf(),
            src_width: src.0,
            src_height: src.1,
            next_pts: 0,
            finished: false,
        })
    }

    /// Path this writer produces.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    fn drain_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg_next::Packet::empty();
        while self.state.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(0);
            packet.rescale_ts(self.state.encoder_time_base, self.state.stream_time_base);
            packet
                .write_interleaved(&mut self.state.output_context)
                .map_err(|e| Error::Transcode(TranscodeError::WriteFailed(e.to_string())))?;
        }
        Ok(())
    }
}

impl FrameSink for FfmpegWriter {
    fn write(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.src_width || frame.height != self.src_height {
            return Err(Error::Transcode(TranscodeError::WriteFailed(format!(
                "frame geometry {}x{} does not match writer input {}x{}",
                frame.width, frame.height, self.src_width, self.src_height
            ))));
        }

        let mut src = ffmpeg_next::frame::Video::new(
            ffmpeg_next::format::Pixel::RGB24,
            self.src_width,
            self.src_height,
        );
        let stride = src.stride(0);
        let row_bytes = self.src_width as usize * FRAME_CHANNELS;
        {
            let plane = src.data_mut(0);
            for y in 0..self.src_height as usize {
                let src_row = y * row_bytes;
                let dst_row = y * stride;
                plane[dst_row..dst_row + row_bytes]
                    .copy_from_slice(&frame.data[src_row..src_row + row_bytes]);
            }
        }

        let mut scaled = ffmpeg_next::frame::Video::empty();
        self.state
            .scaler
            .run(&src, &mut scaled)
            .map_err(|e| Error::Transcode(TranscodeError::WriteFailed(e.to_string())))?;
        scaled.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.state
            .encoder
            .send_frame(&scaled)
            .map_err(|e| Error::Transcode(TranscodeError::WriteFailed(e.to_string())))?;
        self.drain_packets()
    }

    fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.state
            .encoder
            .send_eof()
            .map_err(|e| Error::Transcode(TranscodeError::WriteFailed(e.to_string())))?;
        self.drain_packets()?;
        self.state
            .output_context
            .write_trailer()
            .map_err(|e| Error::Transcode(TranscodeError::WriteFailed(e.to_string())))?;
        self.finished = true;
        Ok(())
    }
}

/// FFmpeg codec id for a proxy codec family.
fn codec_id_for(codec: ProxyCodec) -> ffmpeg_next::codec::Id {
    match codec {
        ProxyCodec::Mjpeg => ffmpeg_next::codec::Id::MJPEG,
        ProxyCodec::Mpeg4 => ffmpeg_next::codec::Id::MPEG4,
        ProxyCodec::H264 => ffmpeg_next::codec::Id::H264,
        ProxyCodec::Hevc => ffmpeg_next::codec::Id::HEVC,
    }
}

/// Encoder pixel format per codec. MJPEG expects full-range YUV.
fn pixel_format_for(codec: ProxyCodec) -> ffmpeg_next::format::Pixel {
    match codec {
        ProxyCodec::Mjpeg => ffmpeg_next::format::Pixel::YUVJ420P,
        ProxyCodec::Mpeg4 | ProxyCodec::H264 | ProxyCodec::Hevc => {
            ffmpeg_next::format::Pixel::YUV420P
        }
    }
}

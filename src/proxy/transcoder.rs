// SPDX-License-Identifier: MPL-2.0
//! Background proxy transcoding.
//!
//! A transcode reads the source stream start-to-end on its own worker
//! thread, rescales every frame to the proxy resolution, and writes the
//! output container. No seeking is involved, so codec random-access
//! limitations never matter here.
//!
//! # Contract
//!
//! - Progress is reported as a percentage of source frames processed.
//! - Cancellation is cooperative, checked once per frame; a cancelled or
//!   failed run always removes its partial output file.
//! - When the requested codec has no usable writer, the job falls back
//!   one rung ([`ProxyCodec::fallback`]) and swaps the container
//!   extension to match. The substitution is logged and visible in the
//!   finished event's output path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use crate::codec::ffmpeg::{FfmpegDecoder, FfmpegWriter};
use crate::codec::{DecoderBackend, FrameDecoder, FrameSink, ProxyCodec};
use crate::config::{
    FALLBACK_WRITER_FPS, MAX_WRITER_FPS, MIN_WRITER_FPS, PROGRESS_INTERVAL_FRAMES,
};
use crate::error::Result;
use crate::proxy::safe_delete;

/// Parameters of one proxy transcode.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    /// Source file, read sequentially.
    pub input: PathBuf,
    /// Requested output path. The actual output may differ in extension
    /// when the codec fallback engages.
    pub output: PathBuf,
    /// Requested output codec.
    pub codec: ProxyCodec,
    /// Proxy height in pixels; the source is never upscaled.
    pub target_height: u32,
}

/// Notifications sent by a running transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeEvent {
    /// Share of source frames processed, 0 to 100.
    Progress(u8),

    /// Terminal event. `output` is the written file on success, `None`
    /// after a failure or cancellation (partial output already removed).
    Finished {
        success: bool,
        output: Option<PathBuf>,
    },
}

/// Output dimensions for a proxy: scaled down to `target_height`
/// preserving aspect ratio, never upscaled, each side rounded up to an
/// even value as block-based codecs require.
#[must_use]
pub fn proxy_dimensions(width: u32, height: u32, target_height: u32) -> (u32, u32) {
    let (w, h) = if target_height > 0 && height > target_height {
        let ratio = f64::from(target_height) / f64::from(height);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled_width = (f64::from(width) * ratio) as u32;
        (scaled_width, target_height)
    } else {
        (width, height)
    };
    (w + (w & 1), h + (h & 1))
}

/// Writer frame rate derived from the source rate: rounded to an
/// integer, clamped to the container-friendly range, with a fixed
/// fallback when the source reports no usable rate.
#[must_use]
pub fn writer_fps(source_fps: f64) -> u32 {
    let rounded = source_fps.round();
    if rounded <= 0.0 {
        return FALLBACK_WRITER_FPS;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let fps = rounded as u32;
    fps.clamp(MIN_WRITER_FPS, MAX_WRITER_FPS)
}

/// Creates frame sinks for the transcode loop.
///
/// The indirection keeps the loop independent of FFmpeg so the ladder
/// and cleanup logic are testable with in-memory sinks.
pub(crate) trait SinkOpener: Send {
    fn open(
        &mut self,
        path: &Path,
        codec: ProxyCodec,
        src: (u32, u32),
        dst: (u32, u32),
        fps: u32,
    ) -> Result<Box<dyn FrameSink>>;
}

struct FfmpegSinkOpener;

impl SinkOpener for FfmpegSinkOpener {
    fn open(
        &mut self,
        path: &Path,
        codec: ProxyCodec,
        src: (u32, u32),
        dst: (u32, u32),
        fps: u32,
    ) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegWriter::create(path, codec, src, dst, fps)?))
    }
}

/// Handle to a running transcode.
///
/// Dropping the handle requests cancellation; the worker removes its
/// partial output and exits on its own.
pub struct TranscodeJob {
    cancel: Arc<AtomicBool>,
    events: UnboundedReceiver<TranscodeEvent>,
    handle: Option<JoinHandle<()>>,
}

impl TranscodeJob {
    /// Starts a transcode on a worker thread.
    ///
    /// The source is opened on the worker; an unreadable source surfaces
    /// as a failed [`TranscodeEvent::Finished`], not as an error here.
    ///
    /// # Errors
    ///
    /// Returns an error only when the worker thread cannot be spawned.
    pub fn spawn(request: TranscodeRequest) -> Result<Self> {
        Self::spawn_worker(request, None)
    }

    /// Starts a transcode over an already-opened decoder. Used by tests
    /// to drive the loop with synthetic streams.
    pub(crate) fn spawn_with(
        request: TranscodeRequest,
        decoder: Box<dyn FrameDecoder>,
        opener: Box<dyn SinkOpener>,
    ) -> Result<Self> {
        Self::spawn_worker(request, Some((decoder, opener)))
    }

    fn spawn_worker(
        request: TranscodeRequest,
        ports: Option<(Box<dyn FrameDecoder>, Box<dyn SinkOpener>)>,
    ) -> Result<Self> {
        let cancel = Arc::new(AtomicBool::new(false));
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();

        let flag = Arc::clone(&cancel);
        let handle = std::thread::Builder::new()
            .name("stepframe-transcode".to_string())
            .spawn(move || match ports {
                Some((mut decoder, mut opener)) => {
                    transcode_stream(decoder.as_mut(), opener.as_mut(), &request, &flag, &events_tx);
                }
                None => match FfmpegDecoder::open(&request.input, DecoderBackend::Auto, false) {
                    Ok(mut decoder) => {
                        transcode_stream(
                            &mut decoder,
                            &mut FfmpegSinkOpener,
                            &request,
                            &flag,
                            &events_tx,
                        );
                    }
                    Err(e) => {
                        warn!(
                            path = %request.input.display(),
                            error = %e,
                            "transcode source unreadable"
                        );
                        let _ = events_tx.send(TranscodeEvent::Finished {
                            success: false,
                            output: None,
                        });
                    }
                },
            })?;

        Ok(Self {
            cancel,
            events: events_rx,
            handle: Some(handle),
        })
    }

    /// Requests cancellation. The worker honors it at the next frame
    /// boundary and removes the partial output before finishing.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Receives the next event, blocking until one arrives. Returns
    /// `None` once the worker has exited and all events were drained.
    pub fn next_event(&mut self) -> Option<TranscodeEvent> {
        self.events.blocking_recv()
    }

    /// Whether the worker thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_some_and(JoinHandle::is_finished)
    }

    /// Drains events until the terminal one and joins the worker.
    /// Returns the success flag and the output path, if any.
    #[must_use]
    pub fn wait(mut self) -> (bool, Option<PathBuf>) {
        let mut outcome = (false, None);
        while let Some(event) = self.events.blocking_recv() {
            if let TranscodeEvent::Finished { success, output } = event {
                outcome = (success, output);
                break;
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        outcome
    }
}

impl Drop for TranscodeJob {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

fn transcode_stream(
    decoder: &mut dyn FrameDecoder,
    opener: &mut dyn SinkOpener,
    request: &TranscodeRequest,
    cancel: &AtomicBool,
    events: &UnboundedSender<TranscodeEvent>,
) {
    let props = decoder.properties().clone();
    let src = (props.width, props.height);
    let dst = proxy_dimensions(props.width, props.height, request.target_height);
    let fps = writer_fps(props.fps);

    let (mut sink, output) = match opener.open(&request.output, request.codec, src, dst, fps) {
        Ok(sink) => (sink, request.output.clone()),
        Err(e) => {
            discard_partial(&request.output);
            let fallback = request.codec.fallback();
            let fallback_path = request.output.with_extension(fallback.extension());
            warn!(
                requested = %request.codec,
                fallback = %fallback,
                error = %e,
                "proxy writer unavailable, falling back"
            );
            match opener.open(&fallback_path, fallback, src, dst, fps) {
                Ok(sink) => (sink, fallback_path),
                Err(e) => {
                    discard_partial(&fallback_path);
                    warn!(error = %e, "fallback writer unavailable, aborting transcode");
                    let _ = events.send(TranscodeEvent::Finished {
                        success: false,
                        output: None,
                    });
                    return;
                }
            }
        }
    };

    debug!(
        input = %request.input.display(),
        output = %output.display(),
        width = dst.0,
        height = dst.1,
        fps,
        "transcode started"
    );

    let total = props.total_frames;
    let mut written: u64 = 0;
    let mut cancelled = false;
    let mut failed = false;

    loop {
        if cancel.load(Ordering::SeqCst) {
            cancelled = true;
            break;
        }
        match decoder.decode_next() {
            Ok(Some(frame)) => {
                if let Err(e) = sink.write(&frame) {
                    warn!(frame = frame.index, error = %e, "proxy write failed");
                    failed = true;
                    break;
                }
                written += 1;
                if total > 0 && written % PROGRESS_INTERVAL_FRAMES == 0 {
                    let _ = events.send(TranscodeEvent::Progress(percent_of(written, total)));
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "source read failed mid-transcode");
                failed = true;
                break;
            }
        }
    }

    // A stop requested after the last frame still counts as a
    // cancellation; the output must not survive it.
    if cancel.load(Ordering::SeqCst) {
        cancelled = true;
    }

    if !cancelled && !failed {
        if let Err(e) = sink.finish() {
            warn!(error = %e, "finalizing proxy failed");
            failed = true;
        }
    }
    drop(sink);

    if cancelled || failed {
        discard_partial(&output);
        debug!(frames = written, cancelled, "transcode abandoned");
        let _ = events.send(TranscodeEvent::Finished {
            success: false,
            output: None,
        });
    } else {
        debug!(frames = written, "transcode finished");
        let _ = events.send(TranscodeEvent::Finished {
            success: true,
            output: Some(output),
        });
    }
}

#[allow(clippy::cast_possible_truncation)] // bounded to 100 before the cast
fn percent_of(done: u64, total: u64) -> u8 {
    ((done * 100) / total).min(100) as u8
}

fn discard_partial(path: &Path) {
    if let Err(e) = safe_delete(path) {
        warn!(path = %path.display(), error = %e, "could not remove partial proxy");
    }
}

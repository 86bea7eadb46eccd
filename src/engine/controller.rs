// SPDX-License-Identifier: MPL-2.0
//! Paced playback over a shared video source.
//!
//! The controller runs a dedicated worker thread that reads frames from
//! the session and emits them as events at the stream's native rate,
//! scaled by the playback speed.
//!
//! # Pacing Strategy
//!
//! The loop derives each frame's deadline from one wall-clock baseline:
//! frame `n` is due at `baseline + n / (fps * speed)`. When delivery
//! drifts behind by more than a small slack, the baseline shifts forward
//! instead of rushing frames to catch up, so a slow consumer gets steady
//! late video rather than a burst.
//!
//! # Stop Semantics
//!
//! `stop()` raises a flag and waits a bounded time for the worker to
//! acknowledge. A worker stuck in a long decode is detached, not joined;
//! its run flag and channels are dead, so it cannot touch a later run.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::{RESYNC_SLACK_MS, STOP_WAIT_MS};
use crate::engine::frame::VideoFrame;
use crate::engine::source::VideoSource;
use crate::engine::speed::PlaybackSpeed;
use crate::error::{Error, Result};
use tracing::{debug, warn};

/// Events emitted by a playback run.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A decoded frame, due for display now.
    Frame(VideoFrame),

    /// The stream ended; the run is over.
    Finished,

    /// Reading or decoding failed; the run is over.
    PlaybackError(String),
}

/// Frame events buffered between the worker and the consumer. Small on
/// purpose; a stalled consumer should throttle decoding, not queue video.
const EVENT_CAPACITY: usize = 8;

/// Upper bound on one uninterrupted sleep, so a stop request never waits
/// on a full frame interval.
const SLEEP_SLICE: Duration = Duration::from_millis(25);

/// What the pacing clock wants before the next read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceAction {
    /// The next read is due now.
    OnSchedule,

    /// The next frame is not due yet.
    Wait(Duration),

    /// Delivery drifted behind by `backlog` beyond the allowed slack;
    /// shift the baseline forward by that much instead of catching up.
    FellBehind { backlog: Duration },
}

/// Pacing decision after `frames_played` deliveries.
///
/// `rate` is the target delivery rate in frames per second (stream fps
/// times playback speed); `elapsed` is wall time since the baseline.
#[must_use]
pub fn pace_action(frames_played: u64, rate: f64, elapsed: Duration) -> PaceAction {
    if rate <= 0.0 {
        return PaceAction::OnSchedule;
    }

    #[allow(clippy::cast_precision_loss)] // frame counts stay far below 2^52
    let expected = Duration::from_secs_f64(frames_played as f64 / rate);

    if elapsed < expected {
        return PaceAction::Wait(expected - elapsed);
    }

    let backlog = elapsed - expected;
    if backlog > Duration::from_millis(RESYNC_SLACK_MS) {
        PaceAction::FellBehind { backlog }
    } else {
        PaceAction::OnSchedule
    }
}

/// Lock-free state shared between one playback run and its controller.
///
/// A fresh instance is created per run; flags of an abandoned run can
/// never affect a later one.
#[derive(Debug)]
struct PlaybackShared {
    running: AtomicBool,

    /// Playback speed as `f64` bits, so speed changes apply mid-run
    /// without a lock.
    speed_bits: AtomicU64,
}

impl PlaybackShared {
    fn new(speed: f64) -> Self {
        Self {
            running: AtomicBool::new(true),
            speed_bits: AtomicU64::new(speed.to_bits()),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::SeqCst))
    }

    fn set_speed(&self, speed: f64) {
        self.speed_bits.store(speed.to_bits(), Ordering::SeqCst);
    }
}

struct Worker {
    shared: Arc<PlaybackShared>,
    ack: std::sync::mpsc::Receiver<()>,
    handle: JoinHandle<()>,
}

/// Drives paced playback of a [`VideoSource`] on a worker thread.
///
/// At most one run is active at a time; starting a new run stops the
/// previous one first.
pub struct PlaybackController {
    source: Arc<Mutex<VideoSource>>,
    worker: Option<Worker>,
}

impl PlaybackController {
    /// Creates a controller over the shared session.
    #[must_use]
    pub fn new(source: Arc<Mutex<VideoSource>>) -> Self {
        Self {
            source,
            worker: None,
        }
    }

    /// Starts a playback run from the session's current position.
    ///
    /// Returns the event stream for this run. Dropping the receiver ends
    /// the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] when the session has no open source.
    pub fn play(
        &mut self,
        speed: PlaybackSpeed,
    ) -> Result<tokio::sync::mpsc::Receiver<EngineEvent>> {
        self.stop();

        let fps = {
            let guard = self
                .source
                .lock()
                .map_err(|_| Error::Io("playback state lock poisoned".to_string()))?;
            if !guard.is_open() {
                return Err(Error::Closed);
            }
            guard.properties().fps
        };

        let (events_tx, events_rx) = tokio::sync::mpsc::channel(EVENT_CAPACITY);
        let (ack_tx, ack_rx) = std::sync::mpsc::channel();
        let shared = Arc::new(PlaybackShared::new(speed.value()));

        let source = Arc::clone(&self.source);
        let loop_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("stepframe-playback".to_string())
            .spawn(move || {
                playback_loop(&source, &loop_shared, &events_tx, fps);
                let _ = ack_tx.send(());
            })?;

        debug!(fps, speed = speed.value(), "playback started");
        self.worker = Some(Worker {
            shared,
            ack: ack_rx,
            handle,
        });
        Ok(events_rx)
    }

    /// Stops the active run, waiting a bounded time for the worker to
    /// acknowledge.
    ///
    /// Returns `true` when the worker confirmed the stop (or had already
    /// finished), `false` when it had to be detached.
    pub fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return true;
        };

        worker.shared.request_stop();
        match worker.ack.recv_timeout(Duration::from_millis(STOP_WAIT_MS)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                debug!("playback stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    wait_ms = STOP_WAIT_MS,
                    "playback worker did not acknowledge stop, detaching"
                );
                false
            }
        }
    }

    /// Changes the playback speed of the active run. The worker rebases
    /// its clock when it observes the change.
    pub fn set_speed(&self, speed: PlaybackSpeed) {
        if let Some(worker) = &self.worker {
            worker.shared.set_speed(speed.value());
        }
    }

    /// Whether a run is currently delivering frames.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| w.shared.is_running() && !w.handle.is_finished())
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn playback_loop(
    source: &Mutex<VideoSource>,
    shared: &PlaybackShared,
    events: &tokio::sync::mpsc::Sender<EngineEvent>,
    fps: f64,
) {
    let mut baseline = Instant::now();
    let mut frames_played: u64 = 0;
    let mut speed = shared.speed();

    'playback: while shared.is_running() {
        let observed = shared.speed();
        if (observed - speed).abs() > f64::EPSILON {
            debug!(from = speed, to = observed, "speed changed, rebasing clock");
            speed = observed;
            baseline = Instant::now();
            frames_played = 0;
        }

        // Read under the session lock, send outside it; a slow consumer
        // must not hold up control operations.
        let read = match source.lock() {
            Ok(mut session) => session.read_next(),
            Err(_) => {
                let _ = events.blocking_send(EngineEvent::PlaybackError(
                    "playback state lock poisoned".to_string(),
                ));
                break;
            }
        };

        match read {
            Ok(Some(frame)) => {
                if events.blocking_send(EngineEvent::Frame(frame)).is_err() {
                    break;
                }
            }
            Ok(None) => {
                let _ = events.blocking_send(EngineEvent::Finished);
                break;
            }
            Err(e) => {
                let _ = events.blocking_send(EngineEvent::PlaybackError(e.to_string()));
                break;
            }
        }
        frames_played += 1;

        loop {
            if !shared.is_running() {
                break 'playback;
            }
            match pace_action(frames_played, fps * speed, baseline.elapsed()) {
                PaceAction::Wait(remaining) => std::thread::sleep(remaining.min(SLEEP_SLICE)),
                PaceAction::FellBehind { backlog } => {
                    baseline += backlog;
                    break;
                }
                PaceAction::OnSchedule => break,
            }
        }
    }
}

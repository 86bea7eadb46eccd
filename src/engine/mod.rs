// SPDX-License-Identifier: MPL-2.0
//! Frame-accurate video playback engine.
//!
//! The engine owns one open video session at a time: a decoder wrapped in
//! a [`VideoSource`] with its frame cache and seek planning, plus a
//! [`PlaybackController`] that paces frame delivery on a worker thread.
//!
//! # Design
//!
//! - **One session object.** All playback state lives in the session
//!   created by `open`; nothing is ambient. Reopening or closing swaps
//!   the whole session.
//! - **Serialized access.** Control calls and the playback loop share the
//!   source behind one mutex; the loop releases it between frames, so no
//!   caller waits longer than one decode.
//! - **Atomic settings.** [`VideoEngine::apply_settings`] swaps tunables
//!   under the same lock, never tearing a read or seek in progress.
//!   Decoder-level options (backend, proxy quality) take effect on the
//!   next `open`.
//! - **Transparent proxies.** When enabled, `open` substitutes a valid
//!   proxy file for the original; the original path stays the session's
//!   identity while the reported properties describe the active stream.

pub mod controller;
pub mod frame;
pub mod frame_cache;
pub mod seek;
pub mod source;
pub mod speed;

pub use controller::{pace_action, EngineEvent, PaceAction, PlaybackController};
pub use frame::VideoFrame;
pub use frame_cache::{CacheStats, FrameCache};
pub use seek::{clamp_target, plan, SeekContext, SeekPlan};
pub use source::VideoSource;
pub use speed::PlaybackSpeed;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::codec::{DecoderBackend, FrameDecoder, StreamProperties};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::proxy::transcoder::TranscodeJob;
use crate::proxy::ProxyManager;

/// Description of the active session, reported once per `open`.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// The file the caller asked for; the session's identity.
    pub original_path: PathBuf,
    /// The file actually being decoded (a proxy when substitution hit).
    pub active_path: PathBuf,
    /// Whether a proxy was substituted for the original.
    pub proxy_active: bool,
    /// Properties of the active stream.
    pub properties: StreamProperties,
    /// Whether the active stream supports frame-accurate positional
    /// seeks.
    pub is_fast_seek: bool,
    /// Decoder backend actually in use, after any fallback.
    pub backend: DecoderBackend,
}

struct EngineSession {
    source: Arc<Mutex<VideoSource>>,
    controller: PlaybackController,
    info: SourceInfo,
}

/// The playback engine facade.
///
/// State machine: closed -> open -> closed. Every operation that needs a
/// stream reports [`Error::Closed`] outside the open state.
pub struct VideoEngine {
    config: EngineConfig,
    speed: PlaybackSpeed,
    session: Option<EngineSession>,
}

impl VideoEngine {
    /// Creates an engine with the given configuration, normalized into
    /// valid ranges.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: config.normalized(),
            speed: PlaybackSpeed::default(),
            session: None,
        }
    }

    /// Opens a video file, substituting a proxy when one is enabled and
    /// available. Any previous session is closed first.
    ///
    /// A proxy that exists but fails to open is skipped with a warning;
    /// the original is then opened directly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Open`] when the file (and any substitute) cannot
    /// be opened. The engine is left closed in that case.
    pub fn open(&mut self, path: &Path) -> Result<SourceInfo> {
        self.close();

        let (target, via_proxy) = resolve_playback_target(&self.config, path);
        let opened = if via_proxy {
            match VideoSource::open(&target, &self.config) {
                Ok(source) => Some((source, target, true)),
                Err(e) => {
                    warn!(
                        proxy = %target.display(),
                        error = %e,
                        "proxy unusable, opening the original"
                    );
                    None
                }
            }
        } else {
            None
        };

        let (source, active_path, proxy_active) = match opened {
            Some(parts) => parts,
            None => (
                VideoSource::open(path, &self.config)?,
                path.to_path_buf(),
                false,
            ),
        };

        let info = SourceInfo {
            original_path: path.to_path_buf(),
            active_path,
            proxy_active,
            properties: source.properties().clone(),
            is_fast_seek: source.is_fast_seek(),
            backend: source.active_backend(),
        };
        debug!(
            path = %info.active_path.display(),
            proxy = info.proxy_active,
            frames = info.properties.total_frames,
            fps = info.properties.fps,
            "source opened"
        );
        self.install(source, info.clone());
        Ok(info)
    }

    /// Opens a session over an already-constructed decoder. `path` only
    /// labels the session; no file is touched.
    pub fn open_with_decoder(
        &mut self,
        path: &Path,
        decoder: Box<dyn FrameDecoder>,
        is_fast_seek: bool,
    ) -> SourceInfo {
        self.close();
        let source = VideoSource::from_decoder(decoder, is_fast_seek, &self.config);
        let info = SourceInfo {
            original_path: path.to_path_buf(),
            active_path: path.to_path_buf(),
            proxy_active: false,
            properties: source.properties().clone(),
            is_fast_seek: source.is_fast_seek(),
            backend: source.active_backend(),
        };
        self.install(source, info.clone());
        info
    }

    fn install(&mut self, source: VideoSource, info: SourceInfo) {
        let source = Arc::new(Mutex::new(source));
        let controller = PlaybackController::new(Arc::clone(&source));
        self.session = Some(EngineSession {
            source,
            controller,
            info,
        });
    }

    /// Stops playback and releases the decoder. Safe to call repeatedly;
    /// after return no OS file handle is held by the engine, so the
    /// underlying file can be deleted or overwritten.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.controller.stop();
            match session.source.try_lock() {
                Ok(mut source) => source.close(),
                Err(_) => warn!("source still held by a detached worker, released on its exit"),
            }
        }
    }

    /// Whether a session is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Info for the open session.
    #[must_use]
    pub fn info(&self) -> Option<&SourceInfo> {
        self.session.as_ref().map(|session| &session.info)
    }

    /// Seeks to `target` (clamped to the stream) and returns that frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] without a session, or [`Error::Seek`]
    /// when the stream ends before the target.
    pub fn seek(&mut self, target: u64) -> Result<VideoFrame> {
        let session = self.session.as_ref().ok_or(Error::Closed)?;
        let mut source = lock_source(&session.source)?;
        source.seek(target)
    }

    /// Decodes the next frame in sequence, or `None` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] without a session, or a decode error.
    pub fn read_next(&mut self) -> Result<Option<VideoFrame>> {
        let session = self.session.as_ref().ok_or(Error::Closed)?;
        let mut source = lock_source(&session.source)?;
        source.read_next()
    }

    /// Starts paced playback from the current position, returning the
    /// event stream for the run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] without a session.
    pub fn play(&mut self) -> Result<tokio::sync::mpsc::Receiver<EngineEvent>> {
        let speed = self.speed;
        match &mut self.session {
            Some(session) => session.controller.play(speed),
            None => Err(Error::Closed),
        }
    }

    /// Stops playback. Returns `true` when the loop confirmed the stop
    /// within the bounded wait (or nothing was playing).
    pub fn stop(&mut self) -> bool {
        self.session
            .as_mut()
            .is_none_or(|session| session.controller.stop())
    }

    /// Whether the playback loop is currently delivering frames.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|session| session.controller.is_playing())
    }

    /// Sets the playback speed, applied immediately to a running loop
    /// and kept for later runs.
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        self.speed = speed;
        if let Some(session) = &self.session {
            session.controller.set_speed(speed);
        }
    }

    /// Current playback speed.
    #[must_use]
    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    /// Applies a new configuration. Cache capacity and seek lookback
    /// take effect immediately, swapped under the playback lock so no
    /// read or seek observes a half-applied change; decoder-level
    /// options apply on the next `open`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the playback lock is poisoned.
    pub fn apply_settings(&mut self, config: EngineConfig) -> Result<()> {
        let config = config.normalized();
        if let Some(session) = &self.session {
            let mut source = lock_source(&session.source)?;
            source.apply(config.cache_capacity, config.seek_lookback);
        }
        debug!(
            cache_capacity = config.cache_capacity,
            seek_lookback = config.seek_lookback,
            "settings applied"
        );
        self.config = config;
        Ok(())
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Next-read position of the open session.
    #[must_use]
    pub fn position(&self) -> Option<u64> {
        let session = self.session.as_ref()?;
        session.source.lock().ok().map(|source| source.position())
    }

    /// Cache statistics of the open session.
    #[must_use]
    pub fn cache_stats(&self) -> Option<CacheStats> {
        let session = self.session.as_ref()?;
        session
            .source
            .lock()
            .ok()
            .map(|source| source.cache_stats())
    }

    /// Starts background proxy generation for `original`.
    ///
    /// If the active session is reading `original` or the proxy about to
    /// be written, it is closed first; the transcoder must be the only
    /// holder of those files.
    ///
    /// # Errors
    ///
    /// Returns an error when the proxies directory is unavailable or the
    /// worker cannot be spawned.
    pub fn generate_proxy(&mut self, original: &Path) -> Result<TranscodeJob> {
        let manager = ProxyManager::new(&self.config)?;
        let output = manager.resolve_proxy(original);
        let involved = self.session.as_ref().is_some_and(|session| {
            session.info.active_path.as_path() == original
                || session.info.active_path == output
        });
        if involved {
            self.close();
        }
        manager.generate(original)
    }

    /// Deletes a proxy file, closing the session first when it is the
    /// active stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ResourceLock`] when the file stays locked through
    /// every retry.
    pub fn delete_proxy(&mut self, proxy: &Path) -> Result<()> {
        let active = self
            .session
            .as_ref()
            .is_some_and(|session| session.info.active_path.as_path() == proxy);
        if active {
            self.close();
        }
        crate::proxy::safe_delete(proxy)
    }
}

impl Default for VideoEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn lock_source(source: &Mutex<VideoSource>) -> Result<std::sync::MutexGuard<'_, VideoSource>> {
    source
        .lock()
        .map_err(|_| Error::Io("playback state lock poisoned".to_string()))
}

/// Decides which file `open` should actually read: a valid proxy when
/// substitution is enabled and one exists, the original otherwise.
fn resolve_playback_target(config: &EngineConfig, original: &Path) -> (PathBuf, bool) {
    if !config.use_proxy {
        return (original.to_path_buf(), false);
    }
    match ProxyManager::new(config) {
        Ok(manager) => match manager.find_existing(original) {
            Some(proxy) => (proxy, true),
            None => (original.to_path_buf(), false),
        },
        Err(e) => {
            warn!(error = %e, "proxies directory unavailable, using the original");
            (original.to_path_buf(), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::synthetic::{SyntheticDecoder, SyntheticOps};
    use crate::error::OpenError;
    use tempfile::tempdir;

    fn test_config() -> EngineConfig {
        EngineConfig {
            use_proxy: false,
            ..EngineConfig::default()
        }
    }

    fn open_synthetic(
        engine: &mut VideoEngine,
        total: u64,
        fps: f64,
        is_fast_seek: bool,
    ) -> (SourceInfo, SyntheticOps) {
        let decoder = SyntheticDecoder::new(total, fps);
        let ops = decoder.ops();
        let info = engine.open_with_decoder(
            Path::new("synthetic.avi"),
            Box::new(decoder),
            is_fast_seek,
        );
        (info, ops)
    }

    #[test]
    fn facade_reports_stream_info() {
        let mut engine = VideoEngine::new(test_config());
        let (info, _) = open_synthetic(&mut engine, 100, 30.0, true);

        assert_eq!(info.properties.total_frames, 100);
        assert!(info.is_fast_seek);
        assert!(!info.proxy_active);
        assert_eq!(info.original_path, info.active_path);
        assert!(engine.is_open());
        assert_eq!(engine.position(), Some(0));
    }

    #[test]
    fn seek_then_read_follow_frame_order() {
        let mut engine = VideoEngine::new(test_config());
        let _ = open_synthetic(&mut engine, 100, 30.0, true);

        assert_eq!(engine.seek(10).unwrap().index, 10);
        assert_eq!(engine.read_next().unwrap().unwrap().index, 11);
    }

    #[test]
    fn operations_on_a_closed_engine_are_rejected() {
        let mut engine = VideoEngine::new(test_config());

        assert!(matches!(engine.seek(0), Err(Error::Closed)));
        assert!(matches!(engine.read_next(), Err(Error::Closed)));
        assert!(matches!(engine.play(), Err(Error::Closed)));
        assert!(engine.stop());
        assert!(engine.info().is_none());
    }

    #[test]
    fn reopening_replaces_the_session() {
        let mut engine = VideoEngine::new(test_config());
        let _ = open_synthetic(&mut engine, 100, 30.0, true);
        engine.seek(50).unwrap();

        let (info, _) = open_synthetic(&mut engine, 20, 24.0, false);

        assert_eq!(info.properties.total_frames, 20);
        assert_eq!(engine.position(), Some(0));
    }

    #[test]
    fn close_is_idempotent_and_final() {
        let mut engine = VideoEngine::new(test_config());
        let _ = open_synthetic(&mut engine, 10, 30.0, true);

        engine.close();
        engine.close();

        assert!(!engine.is_open());
        assert!(matches!(engine.seek(0), Err(Error::Closed)));
    }

    #[test]
    fn apply_settings_changes_seek_behavior_immediately() {
        let mut engine = VideoEngine::new(test_config());
        let (_, ops) = open_synthetic(&mut engine, 200, 30.0, false);

        engine.seek(150).unwrap();
        let lookback_cost = ops.decodes();
        assert_eq!(lookback_cost, 21);

        let direct = EngineConfig {
            seek_lookback: 0,
            ..test_config()
        };
        engine.apply_settings(direct).unwrap();

        engine.seek(50).unwrap();
        assert_eq!(ops.decodes() - lookback_cost, 1);
    }

    #[test]
    fn playback_round_trip_through_the_facade() {
        let mut engine = VideoEngine::new(test_config());
        let _ = open_synthetic(&mut engine, 1000, 100.0, true);

        let mut events = engine.play().unwrap();
        assert!(matches!(
            events.blocking_recv(),
            Some(EngineEvent::Frame(_))
        ));
        assert!(engine.stop());
        assert!(!engine.is_playing());
    }

    #[test]
    fn speed_persists_across_sessions() {
        let mut engine = VideoEngine::new(test_config());
        engine.set_speed(PlaybackSpeed::new(2.0));

        let _ = open_synthetic(&mut engine, 10, 30.0, true);
        engine.close();

        assert!((engine.speed().value() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn open_missing_file_leaves_the_engine_closed() {
        let mut engine = VideoEngine::new(test_config());

        let result = engine.open(Path::new("/nonexistent/video.mov"));

        assert!(matches!(
            result,
            Err(Error::Open(OpenError::NotFound(_)))
        ));
        assert!(!engine.is_open());
    }

    #[test]
    fn target_resolution_substitutes_a_valid_proxy() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            use_proxy: true,
            proxies_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        let proxy = dir.path().join("match_proxy_540p.avi");
        std::fs::write(&proxy, vec![0u8; 4096]).unwrap();

        let (target, via_proxy) = resolve_playback_target(&config, Path::new("match.mov"));

        assert!(via_proxy);
        assert_eq!(target, proxy);
    }

    #[test]
    fn target_resolution_skips_truncated_proxies() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            use_proxy: true,
            proxies_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        std::fs::write(dir.path().join("match_proxy_540p.avi"), vec![0u8; 10]).unwrap();

        let (target, via_proxy) = resolve_playback_target(&config, Path::new("match.mov"));

        assert!(!via_proxy);
        assert_eq!(target, Path::new("match.mov"));
    }

    #[test]
    fn target_resolution_respects_the_proxy_switch() {
        let dir = tempdir().unwrap();
        let config = EngineConfig {
            use_proxy: false,
            proxies_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };
        std::fs::write(dir.path().join("match_proxy_540p.avi"), vec![0u8; 4096]).unwrap();

        let (_, via_proxy) = resolve_playback_target(&config, Path::new("match.mov"));

        assert!(!via_proxy);
    }
}

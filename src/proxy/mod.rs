// SPDX-License-Identifier: MPL-2.0
//! Proxy discovery, naming, and lifecycle.
//!
//! A proxy is a lower-resolution stand-in for an original video, kept in
//! one shared directory and named deterministically from the original's
//! file stem plus the generation quality: `{stem}_proxy_{quality}p.{ext}`.
//! The deterministic name is what makes proxies rediscoverable across
//! sessions without any database.
//!
//! # Design
//!
//! - **Discovery is permissive.** A proxy generated at a different
//!   quality or in a different container than currently configured is
//!   still a valid substitute; discovery checks the exact expected path
//!   first, then sibling containers, then any quality.
//! - **Size threshold.** Files at or below [`MIN_PROXY_BYTES`] are
//!   treated as truncated leftovers of interrupted transcodes and never
//!   substituted.
//! - **Deletion retries.** Freshly closed video files can stay locked by
//!   the OS for a moment; deletion retries with a short delay before
//!   reporting [`Error::ResourceLock`].

pub mod transcoder;

pub use transcoder::{TranscodeEvent, TranscodeJob, TranscodeRequest};

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::codec::ProxyCodec;
use crate::config::{EngineConfig, DELETE_RETRIES, DELETE_RETRY_DELAY_MS, MIN_PROXY_BYTES};
use crate::error::{Error, Result};

/// Removes a file, retrying while the OS still holds it locked.
///
/// Missing files count as already deleted.
///
/// # Errors
///
/// Returns [`Error::ResourceLock`] when the file stays locked through
/// every retry, or [`Error::Io`] for any other filesystem failure.
pub fn safe_delete(path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }
    for attempt in 1..=DELETE_RETRIES {
        match fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                debug!(path = %path.display(), attempt, "file locked, retrying delete");
                std::thread::sleep(Duration::from_millis(DELETE_RETRY_DELAY_MS));
            }
            Err(e) => return Err(Error::Io(e.to_string())),
        }
    }
    Err(Error::ResourceLock {
        path: path.to_path_buf(),
        attempts: DELETE_RETRIES,
    })
}

/// Whether `path` is a usable proxy file: present, regular, and larger
/// than the truncation threshold.
#[must_use]
pub fn is_valid_proxy(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > MIN_PROXY_BYTES)
        .unwrap_or(false)
}

/// Names, finds, and regenerates proxy files for original videos.
#[derive(Debug, Clone)]
pub struct ProxyManager {
    proxies_dir: PathBuf,
    quality: u32,
    codec: ProxyCodec,
}

impl ProxyManager {
    /// Creates a manager over the configured proxies directory, creating
    /// the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no proxies directory can be
    /// resolved, or [`Error::Io`] when it cannot be created.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let proxies_dir = config.resolve_proxies_dir().ok_or_else(|| {
            Error::Config("no proxies directory configured and no cache directory".to_string())
        })?;
        fs::create_dir_all(&proxies_dir)?;
        Ok(Self {
            proxies_dir,
            quality: config.proxy_quality,
            codec: config.proxy_codec,
        })
    }

    /// Directory all proxies live in.
    #[must_use]
    pub fn proxies_dir(&self) -> &Path {
        &self.proxies_dir
    }

    /// Deterministic proxy path for `original` at the configured quality
    /// and codec. Repeated calls with the same input yield the same path.
    #[must_use]
    pub fn resolve_proxy(&self, original: &Path) -> PathBuf {
        self.proxies_dir.join(format!(
            "{}_proxy_{}p.{}",
            file_stem_of(original),
            self.quality,
            self.codec.extension()
        ))
    }

    /// Finds a usable proxy for `original`, regardless of the quality or
    /// container it was generated with.
    ///
    /// The expected path wins; otherwise the same name in a sibling
    /// container, otherwise any quality found in the directory.
    #[must_use]
    pub fn find_existing(&self, original: &Path) -> Option<PathBuf> {
        let expected = self.resolve_proxy(original);
        let candidates = [
            expected.clone(),
            expected.with_extension("avi"),
            expected.with_extension("mp4"),
        ];
        for candidate in candidates {
            if is_valid_proxy(&candidate) {
                return Some(candidate);
            }
        }

        let prefix = format!("{}_proxy_", file_stem_of(original));
        let mut matches: Vec<PathBuf> = fs::read_dir(&self.proxies_dir)
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| matches_proxy_name(path, &prefix))
            .collect();
        matches.sort();
        matches.into_iter().find(|path| is_valid_proxy(path))
    }

    /// Starts a background transcode producing this manager's proxy for
    /// `original`.
    ///
    /// Any source holding `original` open must be closed first; the
    /// worker reads the file independently. Completion and progress
    /// arrive through the returned job's events.
    ///
    /// # Errors
    ///
    /// Returns an error when the worker thread cannot be spawned.
    pub fn generate(&self, original: &Path) -> Result<TranscodeJob> {
        let output = self.resolve_proxy(original);
        debug!(
            input = %original.display(),
            output = %output.display(),
            "proxy generation requested"
        );
        TranscodeJob::spawn(TranscodeRequest {
            input: original.to_path_buf(),
            output,
            codec: self.codec,
            target_height: self.quality,
        })
    }

    /// Deletes one proxy file, retrying while the OS releases its lock.
    ///
    /// # Errors
    ///
    /// Same as [`safe_delete`].
    pub fn delete_proxy(&self, proxy: &Path) -> Result<()> {
        safe_delete(proxy)
    }

    /// Removes every proxy previously generated for `original`, across
    /// all qualities and containers. Returns how many were removed;
    /// files that stay locked are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the proxies directory cannot be read.
    pub fn cleanup_old(&self, original: &Path) -> Result<usize> {
        let prefix = format!("{}_proxy_", file_stem_of(original));
        let mut removed = 0;
        for entry in fs::read_dir(&self.proxies_dir)? {
            let path = entry?.path();
            if !matches_proxy_name(&path, &prefix) {
                continue;
            }
            match safe_delete(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "stale proxy not removed"),
            }
        }
        Ok(removed)
    }

    /// Removes every file in the proxies directory. Returns how many
    /// were removed; files that stay locked are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the proxies directory cannot be read.
    pub fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.proxies_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            match safe_delete(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "proxy not removed"),
            }
        }
        Ok(removed)
    }
}

fn file_stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn matches_proxy_name(path: &Path, prefix: &str) -> bool {
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return false;
    };
    let container_ok = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("avi") || ext.eq_ignore_ascii_case("mp4"));
    name.starts_with(prefix) && container_ok
}

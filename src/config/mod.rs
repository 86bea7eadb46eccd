// SPDX-License-Identifier: MPL-2.0
//! Engine configuration as plain key/value settings.
//!
//! This module is the settings collaborator that sits outside the engine:
//! it owns loading and saving `engine.toml` and produces the [`EngineConfig`]
//! value that callers hand to [`VideoEngine::apply_settings`]. The engine
//! itself never reads configuration files.
//!
//! [`VideoEngine::apply_settings`]: crate::engine::VideoEngine::apply_settings
//!
//! # Examples
//!
//! ```no_run
//! use stepframe::config::{self, EngineConfig};
//!
//! // Load existing configuration (defaults when absent)
//! let mut config = config::load().unwrap_or_default();
//!
//! // Modify a setting
//! config.use_proxy = false;
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//! ```

pub mod defaults;

pub use defaults::*;

use crate::codec::{DecoderBackend, ProxyCodec};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "engine.toml";
const APP_NAME: &str = "stepframe";

/// Tunable engine parameters, applied atomically via
/// `VideoEngine::apply_settings`.
///
/// All numeric fields are clamped to their documented bounds by
/// [`EngineConfig::normalized`]; deserialization accepts out-of-range
/// values and relies on normalization rather than rejecting the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounded frame cache capacity, in frames.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u32,

    /// Keyframe lookback depth for slow-seek codecs, in frames.
    #[serde(default = "default_seek_lookback")]
    pub seek_lookback: u32,

    /// Whether loading prefers an existing proxy over the original file.
    #[serde(default = "default_use_proxy")]
    pub use_proxy: bool,

    /// Proxy target height in pixels.
    #[serde(default = "default_proxy_quality")]
    pub proxy_quality: u32,

    /// Codec requested for generated proxies.
    #[serde(default)]
    pub proxy_codec: ProxyCodec,

    /// Preferred decoder backend.
    #[serde(default)]
    pub backend: DecoderBackend,

    /// Whether a hardware-accelerated decoder is preferred when available.
    #[serde(default)]
    pub hardware_accel: bool,

    /// Overrides the fast-seek probe: `Some(true)` forces frame-accurate
    /// positional seeks, `Some(false)` forces lookback seeks, `None` keeps
    /// the codec/container heuristic.
    #[serde(default)]
    pub assume_fast_seek: Option<bool>,

    /// Directory for generated proxy files. `None` selects the per-user
    /// cache directory.
    #[serde(default)]
    pub proxies_dir: Option<PathBuf>,
}

fn default_cache_capacity() -> u32 {
    DEFAULT_CACHE_CAPACITY
}

fn default_seek_lookback() -> u32 {
    DEFAULT_SEEK_LOOKBACK
}

fn default_use_proxy() -> bool {
    true
}

fn default_proxy_quality() -> u32 {
    DEFAULT_PROXY_QUALITY
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            seek_lookback: DEFAULT_SEEK_LOOKBACK,
            use_proxy: true,
            proxy_quality: DEFAULT_PROXY_QUALITY,
            proxy_codec: ProxyCodec::default(),
            backend: DecoderBackend::default(),
            hardware_accel: false,
            assume_fast_seek: None,
            proxies_dir: None,
        }
    }
}

impl EngineConfig {
    /// Returns a copy with every numeric field clamped to its valid range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.cache_capacity = self
            .cache_capacity
            .clamp(MIN_CACHE_CAPACITY, MAX_CACHE_CAPACITY);
        self.seek_lookback = self
            .seek_lookback
            .clamp(MIN_SEEK_LOOKBACK, MAX_SEEK_LOOKBACK);
        self.proxy_quality = self
            .proxy_quality
            .clamp(MIN_PROXY_QUALITY, MAX_PROXY_QUALITY);
        self
    }

    /// Resolves the proxies directory, falling back to the per-user cache
    /// location when none is configured.
    #[must_use]
    pub fn resolve_proxies_dir(&self) -> Option<PathBuf> {
        self.proxies_dir.clone().or_else(default_proxies_dir)
    }
}

fn default_proxies_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push("proxies");
        path
    })
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<EngineConfig> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(EngineConfig::default())
}

pub fn save(config: &EngineConfig) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<EngineConfig> {
    let content = fs::read_to_string(path)?;
    let config: EngineConfig = toml::from_str(&content).unwrap_or_default();
    Ok(config.normalized())
}

pub fn save_to_path(config: &EngineConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn save_and_load_round_trip_preserves_settings() {
        let config = EngineConfig {
            cache_capacity: 250,
            seek_lookback: 100,
            use_proxy: false,
            proxy_quality: 720,
            proxy_codec: ProxyCodec::Mpeg4,
            backend: DecoderBackend::Software,
            hardware_accel: true,
            assume_fast_seek: Some(true),
            proxies_dir: Some(PathBuf::from("/tmp/proxies")),
        };
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("engine.toml");

        save_to_path(&config, &config_path).expect("failed to save config");
        let loaded = load_from_path(&config_path).expect("failed to load config");

        assert_eq!(loaded, config);
    }

    #[test]
    fn load_from_path_returns_default_on_invalid_toml() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("engine.toml");
        fs::write(&config_path, "not = valid = toml").expect("failed to write invalid toml");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert_eq!(loaded, EngineConfig::default());
    }

    #[test]
    fn load_from_path_clamps_out_of_range_values() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let config_path = temp_dir.path().join("engine.toml");
        fs::write(
            &config_path,
            "cache_capacity = 999999\nseek_lookback = 5000\nproxy_quality = 10\n",
        )
        .expect("failed to write config");

        let loaded = load_from_path(&config_path).expect("load should not error");
        assert_eq!(loaded.cache_capacity, MAX_CACHE_CAPACITY);
        assert_eq!(loaded.seek_lookback, MAX_SEEK_LOOKBACK);
        assert_eq!(loaded.proxy_quality, MIN_PROXY_QUALITY);
    }

    #[test]
    fn save_to_path_creates_parent_directories() {
        let temp_dir = tempdir().expect("failed to create temp dir");
        let nested_dir = temp_dir.path().join("deep").join("path");
        let config_path = nested_dir.join("engine.toml");

        save_to_path(&EngineConfig::default(), &config_path).expect("save should create dirs");
        assert!(config_path.exists());
    }

    #[test]
    fn default_config_prefers_proxies_with_mjpeg() {
        let config = EngineConfig::default();
        assert!(config.use_proxy);
        assert_eq!(config.proxy_codec, ProxyCodec::Mjpeg);
        assert_eq!(config.proxy_quality, DEFAULT_PROXY_QUALITY);
        assert!(config.assume_fast_seek.is_none());
    }

    #[test]
    fn explicit_proxies_dir_wins_over_cache_dir() {
        let config = EngineConfig {
            proxies_dir: Some(PathBuf::from("/media/scratch")),
            ..EngineConfig::default()
        };
        assert_eq!(
            config.resolve_proxies_dir(),
            Some(PathBuf::from("/media/scratch"))
        );
    }
}

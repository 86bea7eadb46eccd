// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all engine tuning constants.
//!
//! This module serves as the single source of truth for default values
//! used across the engine. Constants are organized by category.
//!
//! # Categories
//!
//! - **Frame Cache**: bounded cache capacity for seek performance
//! - **Seek**: small-step threshold and keyframe lookback depth
//! - **Playback**: loop pacing slack and stop escalation timeout
//! - **Proxy**: proxy quality, discovery validation, delete retries
//! - **Transcode**: progress cadence and writer frame-rate clamp
//! - **Timeline**: undo history depth

// ==========================================================================
// Frame Cache Defaults
// ==========================================================================

/// Default frame cache capacity (number of decoded frames).
pub const DEFAULT_CACHE_CAPACITY: u32 = 100;

/// Minimum allowed cache capacity.
pub const MIN_CACHE_CAPACITY: u32 = 10;

/// Maximum allowed cache capacity.
pub const MAX_CACHE_CAPACITY: u32 = 1000;

// ==========================================================================
// Seek Defaults
// ==========================================================================

/// Forward distance (in frames) up to which a seek is served by plain
/// sequential reads instead of a positional seek.
pub const SMALL_STEP_THRESHOLD: u64 = 10;

/// Default keyframe lookback depth for codecs without per-frame random
/// access (in frames).
pub const DEFAULT_SEEK_LOOKBACK: u32 = 20;

/// Minimum lookback depth. Zero disables the backward jump entirely.
pub const MIN_SEEK_LOOKBACK: u32 = 0;

/// Maximum lookback depth.
pub const MAX_SEEK_LOOKBACK: u32 = 300;

/// Lookback presets exposed by settings UIs (fast / balanced / thorough).
pub const SEEK_LOOKBACK_PRESETS: &[u32] = &[5, 20, 100];

// ==========================================================================
// Playback Defaults
// ==========================================================================

/// Slack before the playback clock baseline is reset instead of trying to
/// catch up (in milliseconds).
pub const RESYNC_SLACK_MS: u64 = 200;

/// Bounded wait for the playback loop to acknowledge a stop request before
/// the worker is detached (in milliseconds).
pub const STOP_WAIT_MS: u64 = 500;

/// Minimum playback speed (0.1x).
pub const MIN_PLAYBACK_SPEED: f64 = 0.1;

/// Maximum playback speed (8.0x).
pub const MAX_PLAYBACK_SPEED: f64 = 8.0;

/// Available playback speed presets.
pub const PLAYBACK_SPEED_PRESETS: &[f64] =
    &[0.1, 0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 2.0, 3.0, 4.0, 8.0];

// ==========================================================================
// Proxy Defaults
// ==========================================================================

/// Default proxy target height in pixels (540p).
pub const DEFAULT_PROXY_QUALITY: u32 = 540;

/// Minimum proxy target height.
pub const MIN_PROXY_QUALITY: u32 = 144;

/// Maximum proxy target height.
pub const MAX_PROXY_QUALITY: u32 = 2160;

/// Proxy quality presets exposed by settings UIs.
pub const PROXY_QUALITY_PRESETS: &[u32] = &[360, 540, 720];

/// Minimum size for a proxy file to be considered valid during discovery.
/// Protects against zero-byte artifacts left by interrupted transcodes.
pub const MIN_PROXY_BYTES: u64 = 1000;

/// How many times a locked proxy file deletion is retried.
pub const DELETE_RETRIES: u32 = 10;

/// Delay between deletion retries (in milliseconds).
pub const DELETE_RETRY_DELAY_MS: u64 = 100;

// ==========================================================================
// Transcode Defaults
// ==========================================================================

/// Progress events are emitted every this many frames.
pub const PROGRESS_INTERVAL_FRAMES: u64 = 10;

/// Minimum frame rate written to proxy containers.
pub const MIN_WRITER_FPS: u32 = 1;

/// Maximum frame rate written to proxy containers.
pub const MAX_WRITER_FPS: u32 = 60;

/// Frame rate used when the source does not report one.
pub const FALLBACK_WRITER_FPS: u32 = 30;

// ==========================================================================
// Timeline Defaults
// ==========================================================================

/// Maximum number of undo snapshots kept per annotation session. The oldest
/// snapshot is dropped once the cap is reached.
pub const TIMELINE_HISTORY_CAP: usize = 1000;

// ==========================================================================
// Compile-time Validation
// ==========================================================================

const _: () = {
    // Cache validation
    assert!(MIN_CACHE_CAPACITY > 0);
    assert!(MAX_CACHE_CAPACITY >= MIN_CACHE_CAPACITY);
    assert!(DEFAULT_CACHE_CAPACITY >= MIN_CACHE_CAPACITY);
    assert!(DEFAULT_CACHE_CAPACITY <= MAX_CACHE_CAPACITY);

    // Seek validation
    assert!(SMALL_STEP_THRESHOLD > 0);
    assert!(MAX_SEEK_LOOKBACK >= MIN_SEEK_LOOKBACK);
    assert!(DEFAULT_SEEK_LOOKBACK >= MIN_SEEK_LOOKBACK);
    assert!(DEFAULT_SEEK_LOOKBACK <= MAX_SEEK_LOOKBACK);

    // Playback validation
    assert!(RESYNC_SLACK_MS > 0);
    assert!(STOP_WAIT_MS > 0);
    assert!(MIN_PLAYBACK_SPEED > 0.0);
    assert!(MAX_PLAYBACK_SPEED > MIN_PLAYBACK_SPEED);

    // Proxy validation
    assert!(MIN_PROXY_QUALITY > 0);
    assert!(MAX_PROXY_QUALITY >= MIN_PROXY_QUALITY);
    assert!(DEFAULT_PROXY_QUALITY >= MIN_PROXY_QUALITY);
    assert!(DEFAULT_PROXY_QUALITY <= MAX_PROXY_QUALITY);
    assert!(MIN_PROXY_BYTES > 0);
    assert!(DELETE_RETRIES > 0);

    // Transcode validation
    assert!(PROGRESS_INTERVAL_FRAMES > 0);
    assert!(MIN_WRITER_FPS > 0);
    assert!(MAX_WRITER_FPS >= MIN_WRITER_FPS);
    assert!(FALLBACK_WRITER_FPS >= MIN_WRITER_FPS);
    assert!(FALLBACK_WRITER_FPS <= MAX_WRITER_FPS);

    // Timeline validation
    assert!(TIMELINE_HISTORY_CAP > 0);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_defaults_are_valid() {
        assert_eq!(DEFAULT_CACHE_CAPACITY, 100);
        assert!(DEFAULT_CACHE_CAPACITY >= MIN_CACHE_CAPACITY);
        assert!(DEFAULT_CACHE_CAPACITY <= MAX_CACHE_CAPACITY);
    }

    #[test]
    fn seek_defaults_are_valid() {
        assert_eq!(SMALL_STEP_THRESHOLD, 10);
        assert_eq!(DEFAULT_SEEK_LOOKBACK, 20);
        assert!(SEEK_LOOKBACK_PRESETS.contains(&DEFAULT_SEEK_LOOKBACK));
    }

    #[test]
    fn lookback_presets_are_sorted_and_in_range() {
        let mut sorted = SEEK_LOOKBACK_PRESETS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted.as_slice(), SEEK_LOOKBACK_PRESETS);
        for preset in SEEK_LOOKBACK_PRESETS {
            assert!(*preset >= MIN_SEEK_LOOKBACK);
            assert!(*preset <= MAX_SEEK_LOOKBACK);
        }
    }

    #[test]
    fn proxy_defaults_are_valid() {
        assert_eq!(DEFAULT_PROXY_QUALITY, 540);
        assert!(PROXY_QUALITY_PRESETS.contains(&DEFAULT_PROXY_QUALITY));
        for preset in PROXY_QUALITY_PRESETS {
            assert!(*preset >= MIN_PROXY_QUALITY);
            assert!(*preset <= MAX_PROXY_QUALITY);
        }
    }

    #[test]
    fn writer_fps_clamp_is_valid() {
        assert_eq!(FALLBACK_WRITER_FPS, 30);
        assert!(FALLBACK_WRITER_FPS >= MIN_WRITER_FPS);
        assert!(FALLBACK_WRITER_FPS <= MAX_WRITER_FPS);
    }

    #[test]
    fn speed_presets_cover_bounds_and_normal_speed() {
        assert!(PLAYBACK_SPEED_PRESETS.contains(&MIN_PLAYBACK_SPEED));
        assert!(PLAYBACK_SPEED_PRESETS.contains(&MAX_PLAYBACK_SPEED));
        assert!(PLAYBACK_SPEED_PRESETS.contains(&1.0));

        let mut sorted = PLAYBACK_SPEED_PRESETS.to_vec();
        sorted.sort_by(f64::total_cmp);
        assert_eq!(sorted.as_slice(), PLAYBACK_SPEED_PRESETS);
    }
}

// SPDX-License-Identifier: MPL-2.0
//! `stepframe` is a frame-accurate video playback engine for annotation
//! and analysis tools.
//!
//! It wraps FFmpeg decoding behind a cache-backed seek planner and paces
//! real-time playback on a dedicated worker thread. Downscaled proxy
//! files keep scrubbing responsive on large sources, and the [`timeline`]
//! module carries the segment and marker bookkeeping an analysis session
//! layers on top of playback.

#![doc(html_root_url = "https://docs.rs/stepframe/0.2.1")]

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod proxy;
pub mod timeline;

#[cfg(test)]
pub mod test_utils;

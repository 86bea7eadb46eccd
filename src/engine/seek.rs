// SPDX-License-Identifier: MPL-2.0
//! Seek planning: picks the cheapest way to reach a target frame.
//!
//! Random access into compressed video is not free. Depending on where
//! the target lies relative to the decoder and what the codec tolerates,
//! one of four routes wins:
//!
//! 1. The frame is already cached: serve it and realign the decoder
//!    behind it.
//! 2. The target is a short hop forward: decode sequentially, no seek.
//! 3. The codec positions exactly (intra-only streams such as MJPEG):
//!    jump straight to the target.
//! 4. Otherwise: land a safety margin before the target and decode
//!    forward, so inter-coded streams still deliver the exact frame.
//!
//! The planner is a pure function over a [`SeekContext`] snapshot; the
//! session executes the returned [`SeekPlan`].

use crate::config::SMALL_STEP_THRESHOLD;

/// Decoder state the planner needs to choose a route.
#[derive(Debug, Clone, Copy)]
pub struct SeekContext {
    /// Index of the frame the next sequential read would produce.
    pub position: u64,

    /// Total frames in the stream, or 0 when unknown.
    pub total_frames: u64,

    /// Whether the stream tolerates exact positioning without a pre-roll.
    pub is_fast_seek: bool,

    /// Safety margin (in frames) for streams that need a pre-roll.
    pub lookback: u64,
}

/// The route chosen for one seek request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPlan {
    /// The target frame is cached; serve it without decoding and realign
    /// the decoder to the frame after it.
    UseCache { frame: u64 },

    /// Decode `steps` frames forward from the current position; the last
    /// one is the target.
    SequentialAdvance { steps: u64 },

    /// Position the decoder directly on the target frame.
    DirectSeek { frame: u64 },

    /// Position the decoder at `start` and decode forward to `frame`,
    /// caching everything on the way.
    LookbackSeek { start: u64, frame: u64 },
}

/// Clamps a requested frame index into the addressable range.
///
/// With an unknown total (0), the request passes through untouched and
/// the decoder reports the overshoot at read time.
#[must_use]
pub fn clamp_target(requested: u64, total_frames: u64) -> u64 {
    if total_frames == 0 {
        requested
    } else {
        requested.min(total_frames - 1)
    }
}

/// Chooses the cheapest route to `target`.
///
/// `target` must already be clamped via [`clamp_target`];
/// `target_cached` reports whether the frame cache holds it.
#[must_use]
pub fn plan(target: u64, target_cached: bool, ctx: &SeekContext) -> SeekPlan {
    if target_cached {
        return SeekPlan::UseCache { frame: target };
    }

    // Frames needed to reach the target by plain sequential reads. Zero
    // or negative means the target is at or behind the last delivered
    // frame, which sequential decoding cannot reach.
    let steps = (target + 1).saturating_sub(ctx.position);
    if steps >= 1 && steps <= SMALL_STEP_THRESHOLD {
        return SeekPlan::SequentialAdvance { steps };
    }

    if ctx.is_fast_seek {
        return SeekPlan::DirectSeek { frame: target };
    }

    SeekPlan::LookbackSeek {
        start: target.saturating_sub(ctx.lookback),
        frame: target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(position: u64) -> SeekContext {
        SeekContext {
            position,
            total_frames: 100,
            is_fast_seek: false,
            lookback: 20,
        }
    }

    #[test]
    fn clamp_limits_to_last_frame() {
        assert_eq!(clamp_target(50, 100), 50);
        assert_eq!(clamp_target(99, 100), 99);
        assert_eq!(clamp_target(100, 100), 99);
        assert_eq!(clamp_target(u64::MAX, 100), 99);
    }

    #[test]
    fn clamp_passes_through_when_total_unknown() {
        assert_eq!(clamp_target(1234, 0), 1234);
    }

    #[test]
    fn cached_target_wins_over_everything() {
        // Even a one-step hop is skipped when the frame is in cache.
        let ctx = context(50);
        assert_eq!(plan(50, true, &ctx), SeekPlan::UseCache { frame: 50 });

        let fast = SeekContext {
            is_fast_seek: true,
            ..ctx
        };
        assert_eq!(plan(10, true, &fast), SeekPlan::UseCache { frame: 10 });
    }

    #[test]
    fn next_frame_is_a_single_step() {
        let ctx = context(50);
        assert_eq!(
            plan(50, false, &ctx),
            SeekPlan::SequentialAdvance { steps: 1 }
        );
    }

    #[test]
    fn short_forward_hop_advances_sequentially() {
        let ctx = context(50);
        // Position 50 means frame 49 was delivered last; target 59 is the
        // largest hop still within the sequential window.
        assert_eq!(
            plan(59, false, &ctx),
            SeekPlan::SequentialAdvance { steps: 10 }
        );
    }

    #[test]
    fn hop_past_window_takes_a_real_seek() {
        let ctx = context(50);
        assert_eq!(
            plan(60, false, &ctx),
            SeekPlan::LookbackSeek {
                start: 40,
                frame: 60
            }
        );
    }

    #[test]
    fn backward_target_never_advances_sequentially() {
        let ctx = context(50);
        assert_eq!(
            plan(30, false, &ctx),
            SeekPlan::LookbackSeek {
                start: 10,
                frame: 30
            }
        );
    }

    #[test]
    fn replaying_last_frame_requires_a_seek() {
        // Target 49 with position 50 means re-reading the frame that was
        // just delivered; the decoder has moved past it.
        let ctx = context(50);
        assert_eq!(
            plan(49, false, &ctx),
            SeekPlan::LookbackSeek {
                start: 29,
                frame: 49
            }
        );
    }

    #[test]
    fn fast_seek_streams_jump_directly() {
        let ctx = SeekContext {
            is_fast_seek: true,
            ..context(50)
        };
        assert_eq!(plan(10, false, &ctx), SeekPlan::DirectSeek { frame: 10 });
        assert_eq!(plan(90, false, &ctx), SeekPlan::DirectSeek { frame: 90 });
    }

    #[test]
    fn fast_seek_still_prefers_sequential_window() {
        let ctx = SeekContext {
            is_fast_seek: true,
            ..context(50)
        };
        assert_eq!(
            plan(55, false, &ctx),
            SeekPlan::SequentialAdvance { steps: 6 }
        );
    }

    #[test]
    fn lookback_start_saturates_at_stream_head() {
        let ctx = SeekContext {
            position: 90,
            ..context(90)
        };
        assert_eq!(
            plan(5, false, &ctx),
            SeekPlan::LookbackSeek { start: 0, frame: 5 }
        );
    }

    #[test]
    fn zero_lookback_degenerates_to_direct_positioning() {
        let ctx = SeekContext {
            lookback: 0,
            ..context(50)
        };
        assert_eq!(
            plan(20, false, &ctx),
            SeekPlan::LookbackSeek {
                start: 20,
                frame: 20
            }
        );
    }
}

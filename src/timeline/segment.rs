// SPDX-License-Identifier: MPL-2.0
//! Segment bookkeeping for the annotation timeline.
//!
//! A video is always partitioned into segments: the list starts as one
//! segment spanning the whole frame range and is reshaped by splitting,
//! merging and deleting. Every mutation keeps the partition intact.

use super::TimelineError;

/// Half-open frame interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u64,
    pub end: u64,
}

impl Segment {
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of frames in the segment.
    #[must_use]
    pub fn frames(self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Whether `frame` falls inside the half-open interval.
    #[must_use]
    pub fn contains(self, frame: u64) -> bool {
        self.start <= frame && frame < self.end
    }

    /// Segment duration in seconds, zero when `fps` is unusable.
    #[must_use]
    pub fn duration_secs(self, fps: f64) -> f64 {
        if fps > 0.0 {
            self.frames() as f64 / fps
        } else {
            0.0
        }
    }
}

/// Which piece keeps the frame the cut was made at.
///
/// `Left` cuts after the frame (it becomes the last frame of the left
/// piece); `Right` cuts before it (it becomes the first frame of the
/// right piece).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitAttach {
    Left,
    Right,
}

/// Ordered, contiguous segments partitioning `[0, total_frames)`.
///
/// Invariants, upheld by every mutation:
/// - segments are sorted by `start` and non-overlapping
/// - each segment ends exactly where the next one starts
/// - the first segment starts at 0 and the last ends at `total_frames`
/// - the list is never emptied once frames exist (the last segment
///   cannot be deleted)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentList {
    segments: Vec<Segment>,
}

impl SegmentList {
    /// Builds the initial partition: one segment covering the whole video,
    /// or an empty list when there are no frames.
    #[must_use]
    pub fn covering(total_frames: u64) -> Self {
        let segments = if total_frames == 0 {
            Vec::new()
        } else {
            vec![Segment::new(0, total_frames)]
        };
        Self { segments }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Segment> {
        self.segments.get(index).copied()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Segment] {
        &self.segments
    }

    pub fn iter(&self) -> impl Iterator<Item = Segment> + '_ {
        self.segments.iter().copied()
    }

    /// Total frame count covered by the partition.
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.segments.last().map_or(0, |seg| seg.end)
    }

    /// Index of the segment containing `frame`, if any.
    #[must_use]
    pub fn find(&self, frame: u64) -> Option<usize> {
        self.segments.iter().position(|seg| seg.contains(frame))
    }

    /// Splits the segment containing `frame` into two pieces at that frame.
    ///
    /// Returns the index of the piece that keeps the frame. Cutting at a
    /// position where one piece would end up empty is rejected, so both
    /// resulting segments always hold at least one frame.
    pub fn split_at(&mut self, frame: u64, attach: SplitAttach) -> Result<usize, TimelineError> {
        let index = self.find(frame).ok_or(TimelineError::NoSegmentAt(frame))?;
        let old = self.segments[index];

        let (left, right) = match attach {
            SplitAttach::Left => (
                Segment::new(old.start, frame + 1),
                Segment::new(frame + 1, old.end),
            ),
            SplitAttach::Right => (
                Segment::new(old.start, frame),
                Segment::new(frame, old.end),
            ),
        };

        if left.end <= left.start || right.end <= right.start {
            return Err(TimelineError::SplitAtEdge);
        }

        self.segments[index] = left;
        self.segments.insert(index + 1, right);

        Ok(match attach {
            SplitAttach::Left => index,
            SplitAttach::Right => index + 1,
        })
    }

    /// Merges two neighboring segments into one, returning its index.
    ///
    /// The argument order does not matter, but the segments must be
    /// directly adjacent.
    pub fn merge(&mut self, a: usize, b: usize) -> Result<usize, TimelineError> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        if hi >= self.segments.len() {
            return Err(TimelineError::OutOfRange(hi));
        }
        if hi - lo != 1 {
            return Err(TimelineError::NotAdjacent);
        }

        let merged = Segment::new(self.segments[lo].start, self.segments[hi].end);
        self.segments.remove(hi);
        self.segments[lo] = merged;
        Ok(lo)
    }

    /// Deletes the segment at `index`; its frames are absorbed by the
    /// previous neighbor (or the next one, for the first segment).
    ///
    /// The last remaining segment cannot be deleted, so the partition
    /// always keeps covering the video.
    pub fn remove(&mut self, index: usize) -> Result<Segment, TimelineError> {
        if index >= self.segments.len() {
            return Err(TimelineError::OutOfRange(index));
        }
        if self.segments.len() == 1 {
            return Err(TimelineError::LastSegment);
        }

        let deleted = self.segments.remove(index);
        if index > 0 {
            self.segments[index - 1].end = deleted.end;
        } else {
            self.segments[0].start = deleted.start;
        }
        Ok(deleted)
    }
}

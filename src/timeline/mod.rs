// SPDX-License-Identifier: MPL-2.0
//! Annotation timeline: segments, markers and undo history.
//!
//! A [`Timeline`] holds everything an analysis session layers on top of a
//! video: the segment partition, the marker list and the edit history.
//! The playback engine never owns this state; it only contributes the
//! frame count and frame rate the timeline is built from.
//!
//! # Design
//!
//! - **One session object.** All annotation state lives in an explicitly
//!   constructed [`Timeline`]; there are no globals and no re-entrancy
//!   guard flags.
//! - **Snapshot history.** Every successful structural edit records a
//!   copy of the state it replaced. Undo and redo swap whole snapshots,
//!   so they can never observe a half-applied edit. The history is
//!   capped; the oldest snapshot is dropped first.
//! - **Live edits bypass history.** Tag renames, recoloring and
//!   visibility toggles adjust presentation in place and are not
//!   undoable. Only edits that add or remove timeline structure are.
//! - **Rejected edits leave no trace.** An edit that fails validation
//!   records nothing, so undo never replays a no-op.

pub mod marker;
pub mod segment;

pub use marker::{Marker, MarkerList};
pub use segment::{Segment, SegmentList, SplitAttach};

use std::collections::VecDeque;
use std::fmt;

use crate::config::TIMELINE_HISTORY_CAP;

/// Result type for timeline mutations.
pub type TimelineResult<T> = Result<T, TimelineError>;

/// Reasons a timeline edit can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineError {
    /// No segment contains the requested frame.
    NoSegmentAt(u64),
    /// The cut would leave one piece with no frames.
    SplitAtEdge,
    /// Only directly adjacent segments can be merged.
    NotAdjacent,
    /// The last remaining segment cannot be deleted.
    LastSegment,
    /// Segment or marker index outside the list.
    OutOfRange(usize),
}

impl fmt::Display for TimelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimelineError::NoSegmentAt(frame) => {
                write!(f, "No segment contains frame {frame}")
            }
            TimelineError::SplitAtEdge => {
                write!(f, "Cannot split at the very edge of a segment")
            }
            TimelineError::NotAdjacent => {
                write!(f, "Only adjacent segments can be merged")
            }
            TimelineError::LastSegment => {
                write!(f, "The last segment cannot be deleted")
            }
            TimelineError::OutOfRange(index) => {
                write!(f, "Index {index} is out of range")
            }
        }
    }
}

impl std::error::Error for TimelineError {}

/// Marks-per-minute over a span of `frames` at `fps`.
///
/// Zero when the span has no duration, which covers both an empty span
/// and an unusable frame rate.
#[must_use]
pub fn tempo(marks: usize, frames: u64, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    let seconds = frames as f64 / fps;
    if seconds > 0.0 {
        marks as f64 / seconds * 60.0
    } else {
        0.0
    }
}

/// Aggregated statistics for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentStats {
    /// Visible marks inside the segment, boundary frames included.
    pub marks: usize,
    /// Frame count of the segment.
    pub frames: u64,
    /// Duration in seconds at the session frame rate.
    pub seconds: f64,
    /// Marks per minute.
    pub tempo: f64,
}

/// Point-in-time copy of the annotation state, kept for undo and redo.
#[derive(Debug, Clone)]
struct Snapshot {
    segments: SegmentList,
    markers: MarkerList,
}

/// Annotation session for one video.
#[derive(Debug)]
pub struct Timeline {
    segments: SegmentList,
    markers: MarkerList,
    fps: f64,
    history: VecDeque<Snapshot>,
    redo_stack: Vec<Snapshot>,
}

impl Timeline {
    /// Starts a fresh session: one segment covering the whole video,
    /// no markers, empty history.
    #[must_use]
    pub fn new(total_frames: u64, fps: f64) -> Self {
        Self {
            segments: SegmentList::covering(total_frames),
            markers: MarkerList::new(),
            fps,
            history: VecDeque::new(),
            redo_stack: Vec::new(),
        }
    }

    /// Rebinds the session to a new video, dropping every annotation and
    /// the whole edit history.
    pub fn reset(&mut self, total_frames: u64, fps: f64) {
        *self = Self::new(total_frames, fps);
    }

    #[must_use]
    pub fn segments(&self) -> &SegmentList {
        &self.segments
    }

    #[must_use]
    pub fn markers(&self) -> &MarkerList {
        &self.markers
    }

    #[must_use]
    pub fn fps(&self) -> f64 {
        self.fps
    }

    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.segments.total_frames()
    }

    /// Splits the segment containing `frame`, returning the index of the
    /// piece that keeps the frame.
    pub fn split_segment(&mut self, frame: u64, attach: SplitAttach) -> TimelineResult<usize> {
        let before = self.snapshot();
        let index = self.segments.split_at(frame, attach)?;
        self.record(before);
        Ok(index)
    }

    /// Merges two adjacent segments, returning the merged index.
    pub fn merge_segments(&mut self, a: usize, b: usize) -> TimelineResult<usize> {
        let before = self.snapshot();
        let index = self.segments.merge(a, b)?;
        self.record(before);
        Ok(index)
    }

    /// Deletes a segment; its frames go to a neighbor.
    pub fn delete_segment(&mut self, index: usize) -> TimelineResult<Segment> {
        let before = self.snapshot();
        let deleted = self.segments.remove(index)?;
        self.record(before);
        Ok(deleted)
    }

    /// Adds a marker at its sorted position. A frame that already carries
    /// a marker refuses the new one and records nothing.
    pub fn add_marker(&mut self, marker: Marker) -> bool {
        let before = self.snapshot();
        if self.markers.add(marker) {
            self.record(before);
            true
        } else {
            false
        }
    }

    /// Removes and returns the marker at `index`.
    pub fn delete_marker(&mut self, index: usize) -> TimelineResult<Marker> {
        let before = self.snapshot();
        match self.markers.remove(index) {
            Some(removed) => {
                self.record(before);
                Ok(removed)
            }
            None => Err(TimelineError::OutOfRange(index)),
        }
    }

    /// Renames one marker's tag. Not recorded in history.
    pub fn retag_marker(&mut self, index: usize, tag: impl Into<String>) -> bool {
        self.markers.set_tag(index, tag)
    }

    /// Changes one marker's color. Not recorded in history.
    pub fn recolor_marker(&mut self, index: usize, color: impl Into<String>) -> bool {
        self.markers.set_color(index, color)
    }

    /// Shows or hides every marker with `tag`. Not recorded in history.
    pub fn set_tag_visibility(&mut self, tag: &str, visible: bool) -> usize {
        self.markers.set_tag_visibility(tag, visible)
    }

    /// Whether an undo operation is currently possible.
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Whether a redo operation is currently possible.
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Restores the state before the most recent recorded edit.
    pub fn undo(&mut self) -> bool {
        let Some(previous) = self.history.pop_back() else {
            return false;
        };
        let current = self.snapshot();
        self.redo_stack.push(current);
        self.segments = previous.segments;
        self.markers = previous.markers;
        true
    }

    /// Reapplies the most recently undone edit.
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.redo_stack.pop() else {
            return false;
        };
        let current = self.snapshot();
        self.push_history(current);
        self.segments = next.segments;
        self.markers = next.markers;
        true
    }

    /// Statistics for the segment at `index`.
    #[must_use]
    pub fn stats(&self, index: usize) -> Option<SegmentStats> {
        let segment = self.segments.get(index)?;
        let marks = self.markers.visible_between(segment.start, segment.end);
        let frames = segment.frames();
        Some(SegmentStats {
            marks,
            frames,
            seconds: segment.duration_secs(self.fps),
            tempo: tempo(marks, frames, self.fps),
        })
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            segments: self.segments.clone(),
            markers: self.markers.clone(),
        }
    }

    fn record(&mut self, before: Snapshot) {
        self.redo_stack.clear();
        self.push_history(before);
    }

    fn push_history(&mut self, snapshot: Snapshot) {
        self.history.push_back(snapshot);
        if self.history.len() > TIMELINE_HISTORY_CAP {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_abs_diff_eq;

    fn session() -> Timeline {
        Timeline::new(100, 25.0)
    }

    #[test]
    fn a_new_session_covers_the_video_with_one_segment() {
        let timeline = session();
        assert_eq!(timeline.segments().len(), 1);
        assert_eq!(timeline.total_frames(), 100);
        assert!(timeline.markers().is_empty());
        assert!(!timeline.can_undo());
        assert!(!timeline.can_redo());
    }

    #[test]
    fn split_then_undo_restores_the_original_partition() {
        let mut timeline = session();
        timeline.split_segment(40, SplitAttach::Right).unwrap();
        assert_eq!(timeline.segments().len(), 2);

        assert!(timeline.undo());
        assert_eq!(timeline.segments().len(), 1);
        assert_eq!(timeline.segments().get(0), Some(Segment::new(0, 100)));
        assert!(!timeline.can_undo());
    }

    #[test]
    fn undo_then_redo_replays_the_split() {
        let mut timeline = session();
        timeline.split_segment(40, SplitAttach::Right).unwrap();
        timeline.undo();
        assert!(timeline.can_redo());

        assert!(timeline.redo());
        assert_eq!(timeline.segments().get(0), Some(Segment::new(0, 40)));
        assert_eq!(timeline.segments().get(1), Some(Segment::new(40, 100)));
        assert!(!timeline.can_redo());
        assert!(timeline.can_undo());
    }

    #[test]
    fn recording_after_undo_discards_the_redo_stack() {
        let mut timeline = session();
        timeline.split_segment(30, SplitAttach::Right).unwrap();
        timeline.undo();
        assert!(timeline.can_redo());

        timeline.split_segment(60, SplitAttach::Right).unwrap();
        assert!(!timeline.can_redo());
        assert!(!timeline.redo());
    }

    #[test]
    fn undo_walks_back_markers_and_segments_together() {
        let mut timeline = session();
        assert!(timeline.add_marker(Marker::new(10, "Main", "#ff0000")));
        timeline.split_segment(50, SplitAttach::Right).unwrap();

        assert!(timeline.undo());
        assert_eq!(timeline.segments().len(), 1);
        assert_eq!(timeline.markers().len(), 1);

        assert!(timeline.undo());
        assert!(timeline.markers().is_empty());
        assert!(!timeline.can_undo());
    }

    #[test]
    fn a_duplicate_marker_leaves_history_untouched() {
        let mut timeline = session();
        assert!(timeline.add_marker(Marker::new(10, "Main", "#ff0000")));
        assert!(!timeline.add_marker(Marker::new(10, "Other", "#00ff00")));

        assert!(timeline.undo());
        assert!(timeline.markers().is_empty());
        assert!(!timeline.can_undo());
    }

    #[test]
    fn a_rejected_split_leaves_history_untouched() {
        let mut timeline = session();
        let result = timeline.split_segment(0, SplitAttach::Right);
        assert!(matches!(result, Err(TimelineError::SplitAtEdge)));
        assert!(!timeline.can_undo());
    }

    #[test]
    fn live_edits_are_not_undoable() {
        let mut timeline = session();
        assert_eq!(timeline.set_tag_visibility("Main", false), 0);
        assert!(!timeline.can_undo());

        timeline.add_marker(Marker::new(10, "Main", "#ff0000"));
        timeline.retag_marker(0, "serve");
        timeline.recolor_marker(0, "#0000ff");
        timeline.set_tag_visibility("serve", false);

        // The only recorded edit is the marker add, so one undo clears it.
        assert!(timeline.undo());
        assert!(timeline.markers().is_empty());
        assert!(!timeline.can_undo());
    }

    #[test]
    fn history_drops_the_oldest_snapshot_at_the_cap() {
        let edits = TIMELINE_HISTORY_CAP + 5;
        let mut timeline = Timeline::new(edits as u64 * 2, 30.0);
        for frame in 1..=edits as u64 {
            timeline.split_segment(frame, SplitAttach::Right).unwrap();
        }

        let mut undos = 0;
        while timeline.undo() {
            undos += 1;
        }
        assert_eq!(undos, TIMELINE_HISTORY_CAP);

        // The oldest retained snapshot already contains the evicted edits.
        assert_eq!(timeline.segments().len(), edits - TIMELINE_HISTORY_CAP + 1);
    }

    #[test]
    fn stats_count_boundary_marks_for_both_segments() {
        let mut timeline = session();
        timeline.split_segment(50, SplitAttach::Right).unwrap();
        timeline.add_marker(Marker::new(10, "Main", "#ff0000"));
        timeline.add_marker(Marker::new(50, "Main", "#ff0000"));

        let left = timeline.stats(0).unwrap();
        assert_eq!(left.marks, 2);
        assert_eq!(left.frames, 50);
        assert_abs_diff_eq!(left.seconds, 2.0);
        assert_abs_diff_eq!(left.tempo, 60.0);

        let right = timeline.stats(1).unwrap();
        assert_eq!(right.marks, 1);
        assert_abs_diff_eq!(right.tempo, 30.0);

        assert!(timeline.stats(5).is_none());
    }

    #[test]
    fn hidden_marks_do_not_count_toward_tempo() {
        let mut timeline = session();
        timeline.add_marker(Marker::new(10, "serve", "#ff0000"));
        timeline.add_marker(Marker::new(20, "return", "#00ff00"));
        timeline.set_tag_visibility("serve", false);

        let stats = timeline.stats(0).unwrap();
        assert_eq!(stats.marks, 1);
    }

    #[test]
    fn tempo_formula_matches_marks_per_minute() {
        // 9 marks over 300 frames at 30 fps is 10 seconds, so 54 per minute.
        assert_abs_diff_eq!(tempo(9, 300, 30.0), 54.0);
        assert_abs_diff_eq!(tempo(0, 300, 30.0), 0.0);
    }

    #[test]
    fn tempo_is_zero_without_a_duration() {
        assert_abs_diff_eq!(tempo(5, 0, 30.0), 0.0);
        assert_abs_diff_eq!(tempo(5, 300, 0.0), 0.0);
    }

    #[test]
    fn reset_drops_annotations_and_history() {
        let mut timeline = session();
        timeline.split_segment(50, SplitAttach::Right).unwrap();
        timeline.add_marker(Marker::new(10, "Main", "#ff0000"));

        timeline.reset(200, 50.0);
        assert_eq!(timeline.segments().len(), 1);
        assert_eq!(timeline.total_frames(), 200);
        assert!(timeline.markers().is_empty());
        assert_abs_diff_eq!(timeline.fps(), 50.0);
        assert!(!timeline.can_undo());
        assert!(!timeline.can_redo());
    }
}

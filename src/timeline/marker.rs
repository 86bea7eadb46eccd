// SPDX-License-Identifier: MPL-2.0
//! Frame markers and their tag-based visibility filtering.

/// A tagged point of interest at a single frame.
///
/// The color is an arbitrary string (typically a `#rrggbb` value) that the
/// presentation layer interprets; the engine never does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub frame: u64,
    pub tag: String,
    pub color: String,
    pub visible: bool,
}

impl Marker {
    /// Creates a visible marker.
    #[must_use]
    pub fn new(frame: u64, tag: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            frame,
            tag: tag.into(),
            color: color.into(),
            visible: true,
        }
    }
}

/// Markers ordered by frame, at most one per frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MarkerList {
    markers: Vec<Marker>,
}

impl MarkerList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Marker> {
        self.markers.get(index)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Marker] {
        &self.markers
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// Index of the marker sitting exactly on `frame`, if any.
    #[must_use]
    pub fn at_frame(&self, frame: u64) -> Option<usize> {
        self.markers
            .binary_search_by_key(&frame, |m| m.frame)
            .ok()
    }

    /// Inserts a marker at its sorted position.
    ///
    /// Returns false without changing anything when the frame already
    /// carries a marker.
    pub fn add(&mut self, marker: Marker) -> bool {
        match self
            .markers
            .binary_search_by_key(&marker.frame, |m| m.frame)
        {
            Ok(_) => false,
            Err(position) => {
                self.markers.insert(position, marker);
                true
            }
        }
    }

    /// Removes and returns the marker at `index`.
    pub fn remove(&mut self, index: usize) -> Option<Marker> {
        if index < self.markers.len() {
            Some(self.markers.remove(index))
        } else {
            None
        }
    }

    /// Renames the tag of one marker. Returns false for an invalid index.
    pub fn set_tag(&mut self, index: usize, tag: impl Into<String>) -> bool {
        match self.markers.get_mut(index) {
            Some(marker) => {
                marker.tag = tag.into();
                true
            }
            None => false,
        }
    }

    /// Changes the color of one marker. Returns false for an invalid index.
    pub fn set_color(&mut self, index: usize, color: impl Into<String>) -> bool {
        match self.markers.get_mut(index) {
            Some(marker) => {
                marker.color = color.into();
                true
            }
            None => false,
        }
    }

    /// Shows or hides every marker carrying `tag`, returning how many
    /// markers were affected.
    pub fn set_tag_visibility(&mut self, tag: &str, visible: bool) -> usize {
        let mut affected = 0;
        for marker in &mut self.markers {
            if marker.tag == tag {
                marker.visible = visible;
                affected += 1;
            }
        }
        affected
    }

    /// Distinct tags in use, sorted alphabetically.
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.markers.iter().map(|m| m.tag.clone()).collect();
        tags.sort();
        tags.dedup();
        tags
    }

    /// Counts visible markers with `start <= frame <= end`.
    ///
    /// Both bounds are inclusive: a marker sitting exactly on a segment
    /// boundary counts for the segments on both sides of it.
    #[must_use]
    pub fn visible_between(&self, start: u64, end: u64) -> usize {
        self.markers
            .iter()
            .filter(|m| m.visible && start <= m.frame && m.frame <= end)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_with_frames(frames: &[u64]) -> MarkerList {
        let mut list = MarkerList::new();
        for &frame in frames {
            assert!(list.add(Marker::new(frame, "Main", "#ff0000")));
        }
        list
    }

    #[test]
    fn markers_stay_sorted_by_frame() {
        let list = list_with_frames(&[50, 10, 30]);
        let frames: Vec<u64> = list.iter().map(|m| m.frame).collect();
        assert_eq!(frames, vec![10, 30, 50]);
    }

    #[test]
    fn a_second_marker_on_the_same_frame_is_refused() {
        let mut list = list_with_frames(&[10]);
        assert!(!list.add(Marker::new(10, "Other", "#00ff00")));
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().tag, "Main");
    }

    #[test]
    fn at_frame_finds_exact_hits_only() {
        let list = list_with_frames(&[10, 30]);
        assert_eq!(list.at_frame(30), Some(1));
        assert_eq!(list.at_frame(20), None);
    }

    #[test]
    fn tag_visibility_toggles_every_match() {
        let mut list = MarkerList::new();
        list.add(Marker::new(5, "serve", "#ff0000"));
        list.add(Marker::new(15, "return", "#00ff00"));
        list.add(Marker::new(25, "serve", "#ff0000"));

        let affected = list.set_tag_visibility("serve", false);
        assert_eq!(affected, 2);

        let visible: Vec<bool> = list.iter().map(|m| m.visible).collect();
        assert_eq!(visible, vec![false, true, false]);

        assert_eq!(list.set_tag_visibility("serve", true), 2);
        assert!(list.iter().all(|m| m.visible));
    }

    #[test]
    fn tags_are_sorted_and_deduplicated() {
        let mut list = MarkerList::new();
        list.add(Marker::new(5, "stroke", "#ff0000"));
        list.add(Marker::new(15, "breath", "#00ff00"));
        list.add(Marker::new(25, "stroke", "#ff0000"));

        assert_eq!(list.tags(), vec!["breath".to_string(), "stroke".to_string()]);
    }

    #[test]
    fn visible_between_includes_both_bounds() {
        let list = list_with_frames(&[10, 20, 30]);

        // A marker exactly on the end bound counts, matching how segment
        // statistics treat a mark on the boundary between two segments.
        assert_eq!(list.visible_between(10, 30), 3);
        assert_eq!(list.visible_between(11, 29), 1);
        assert_eq!(list.visible_between(0, 9), 0);
    }

    #[test]
    fn hidden_markers_are_not_counted() {
        let mut list = list_with_frames(&[10, 20]);
        list.set_tag_visibility("Main", false);
        assert_eq!(list.visible_between(0, 100), 0);
    }

    #[test]
    fn remove_returns_the_marker() {
        let mut list = list_with_frames(&[10, 20]);
        let removed = list.remove(0).unwrap();
        assert_eq!(removed.frame, 10);
        assert_eq!(list.len(), 1);
        assert!(list.remove(5).is_none());
    }

    #[test]
    fn retag_and_recolor_respect_bounds() {
        let mut list = list_with_frames(&[10]);
        assert!(list.set_tag(0, "kick"));
        assert!(list.set_color(0, "#0000ff"));
        assert_eq!(list.get(0).unwrap().tag, "kick");
        assert_eq!(list.get(0).unwrap().color, "#0000ff");

        assert!(!list.set_tag(3, "kick"));
        assert!(!list.set_color(3, "#0000ff"));
    }
}

// SPDX-License-Identifier: MPL-2.0
//! Decoded frame representation.

use std::sync::Arc;

/// Number of byte channels per pixel (packed RGB).
pub const FRAME_CHANNELS: usize = 3;

/// A decoded video frame with packed RGB pixel data.
///
/// Pixel data is shared behind an [`Arc`] so the frame can sit in the cache
/// and travel through event channels without copying the raster. A frame is
/// immutable once produced; the absolute index ties it to its position in
/// the source's frame sequence.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Absolute frame index in the source (0-based).
    pub index: u64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed RGB pixel data, `width * height * 3` bytes.
    pub data: Arc<Vec<u8>>,
}

impl VideoFrame {
    /// Creates a frame from raw packed RGB bytes.
    #[must_use]
    pub fn new(index: u64, width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * FRAME_CHANNELS,
            "pixel buffer size must match dimensions"
        );
        Self {
            index,
            width,
            height,
            data: Arc::new(data),
        }
    }

    /// Creates a frame filled with a single RGB color. Used by the
    /// synthetic source and by tests.
    #[must_use]
    pub fn solid(index: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * FRAME_CHANNELS);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(index, width, height, data)
    }

    /// Size of the pixel buffer in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.data.len()
    }

    /// RGB bytes of the pixel at `(x, y)`. Panics on out-of-bounds
    /// coordinates, which is a programming error.
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        assert!(x < self.width && y < self.height, "pixel out of bounds");
        let offset = (y as usize * self.width as usize + x as usize) * FRAME_CHANNELS;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ]
    }
}

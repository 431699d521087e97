use std::ops::Deref;
use std::time::Instant;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Absolute screen coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Screen rectangle in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// A `width`x`height` region whose center is `center` (floor division).
    pub fn centered_on(center: Point, width: u32, height: u32) -> Self {
        Self {
            x: center.x - (width / 2) as i32,
            y: center.y - (height / 2) as i32,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Captured RGBA pixels. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    /// Build from row-major RGBA bytes. `None` if the buffer size is wrong.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>, captured_at: Instant) -> Option<Self> {
        RgbaImage::from_raw(width, height, pixels).map(|image| Self::new(image, captured_at))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// RGB channels at (x, y). Alpha is never compared.
    #[inline]
    pub fn rgb(&self, x: u32, y: u32) -> [u8; 3] {
        let Rgba([r, g, b, _]) = *self.image.get_pixel(x, y);
        [r, g, b]
    }
}

/// The needle the matcher searches for. Replaced wholesale on each capture.
#[derive(Debug, Clone)]
pub struct Template(Frame);

impl Template {
    pub fn new(frame: Frame) -> Self {
        Self(frame)
    }

    pub fn frame(&self) -> &Frame {
        &self.0
    }
}

impl Deref for Template {
    type Target = Frame;

    fn deref(&self) -> &Frame {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgba_checks_buffer_size() {
        let now = Instant::now();
        assert!(Frame::from_rgba(2, 2, vec![0; 16], now).is_some());
        assert!(Frame::from_rgba(2, 2, vec![0; 15], now).is_none());
    }

    #[test]
    fn rgb_ignores_alpha() {
        let frame = Frame::from_rgba(1, 1, vec![10, 20, 30, 0], Instant::now()).unwrap();
        assert_eq!(frame.rgb(0, 0), [10, 20, 30]);
    }

    #[test]
    fn centered_region_uses_floor_division() {
        let region = Region::centered_on(Point::new(100, 50), 31, 30);
        assert_eq!(region, Region::new(85, 35, 31, 30));
    }
}

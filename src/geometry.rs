//! Bounding boxes and the small statistics the detector runs over them.

use image::GrayImage;
use imageproc::point::Point;
use serde::Serialize;

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest box enclosing every point. `None` for an empty set or negative coordinates.
    pub fn enclosing<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point<i32>>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in iter {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        if min_x < 0 || min_y < 0 {
            return None;
        }
        Some(Self {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x) as u32 + 1,
            height: (max_y - min_y) as u32 + 1,
        })
    }

    /// One past the rightmost column.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// One past the bottom row.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        BoundingBox {
            x,
            y,
            width: self.right().max(other.right()) - x,
            height: self.bottom().max(other.bottom()) - y,
        }
    }

    pub fn touches_left(&self, margin: u32) -> bool {
        self.x <= margin
    }

    pub fn touches_right(&self, frame_width: u32, margin: u32) -> bool {
        self.right() + margin >= frame_width
    }

    /// True when the box reaches the left or the right border of the frame.
    pub fn touches_horizontal_edge(&self, frame_width: u32, margin: u32) -> bool {
        self.touches_left(margin) || self.touches_right(frame_width, margin)
    }

    /// True when the box spans from the left to the right border.
    pub fn spans_width(&self, frame_width: u32, margin: u32) -> bool {
        self.touches_left(margin) && self.touches_right(frame_width, margin)
    }
}

/// Edge tolerance in pixels for a frame of `frame_width`, at least one pixel.
pub fn edge_margin(frame_width: u32, fraction: f32) -> u32 {
    ((frame_width as f32 * fraction).round() as u32).max(1)
}

/// Net width trend across an ordered run of boxes.
///
/// Each consecutive pair contributes +1 when the width strictly grows and -1 when it
/// strictly shrinks. A run of `n` boxes that widens monotonically scores `n - 1`.
pub fn width_trend(boxes: &[BoundingBox]) -> i32 {
    boxes
        .windows(2)
        .map(|pair| match pair[1].width.cmp(&pair[0].width) {
            std::cmp::Ordering::Greater => 1,
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
        })
        .sum()
}

/// Mean luma of an image, 0.0 for an empty one.
pub fn mean_intensity(image: &GrayImage) -> f64 {
    let count = image.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = image.as_raw().iter().map(|&p| p as u64).sum();
    sum as f64 / count as f64
}

//! Plane geometry shared by the detection and segmentation stages.
//!
//! All coordinates are `f32` image pixels with the origin at the top-left
//! corner, x growing right and y growing down.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Axis-aligned rectangle in corner + size form.
///
/// Width and height are never negative; constructors clamp them to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x,
            y,
            w: w.max(0.0),
            h: h.max(0.0),
        }
    }

    /// Build from a detector's center form (cx, cy, w, h).
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, w, h)
    }

    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Snap onto the pixel grid: origin floored, extent rounded.
    pub fn snap_to_pixels(&self) -> Rect {
        Rect::new(self.x.floor(), self.y.floor(), self.w.round(), self.h.round())
    }

    pub fn right(&self) -> f32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.h
    }

    pub fn area(&self) -> f32 {
        self.w * self.h
    }

    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Intersection over union. Degenerate pairs (zero union) report 0.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Share of `segment`'s area that lies inside `self`.
    ///
    /// Used to decide whether a traced mask outline belongs to this detection.
    /// A zero-area segment scores 0.
    pub fn coverage_of(&self, segment: &Rect) -> f32 {
        let segment_area = segment.area();
        if segment_area > 0.0 {
            self.intersection_area(segment) / segment_area
        } else {
            0.0
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty set.
    pub fn bounding<'a, I>(points: I) -> Option<Rect>
    where
        I: IntoIterator<Item = &'a Point>,
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
        Some(Rect::from_corners(min_x, min_y, max_x, max_y))
    }
}

/// Maps model-input coordinates back onto the real frame.
///
/// `ratio_*` undoes the square letterbox padding added before resizing and
/// `scale_*` undoes the resize itself; a coordinate is mapped with
/// `v * ratio * scale`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CoordinateMapping {
    pub scale_x: f32,
    pub scale_y: f32,
    pub ratio_x: f32,
    pub ratio_y: f32,
}

impl CoordinateMapping {
    /// Mapping for a frame resized straight to the model input, without padding.
    pub fn direct(model_width: u32, model_height: u32, real_width: u32, real_height: u32) -> Self {
        Self {
            scale_x: real_width as f32 / model_width as f32,
            scale_y: real_height as f32 / model_height as f32,
            ratio_x: 1.0,
            ratio_y: 1.0,
        }
    }

    pub fn factor_x(&self) -> f32 {
        self.ratio_x * self.scale_x
    }

    pub fn factor_y(&self) -> f32 {
        self.ratio_y * self.scale_y
    }

    pub fn to_real(&self, model_rect: &Rect) -> Rect {
        Rect::new(
            model_rect.x * self.factor_x(),
            model_rect.y * self.factor_y(),
            model_rect.w * self.factor_x(),
            model_rect.h * self.factor_y(),
        )
    }
}

/// Shoelace area of a closed polygon. Fewer than 3 points have no area.
pub fn polygon_area(points: &[Point]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: f32 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p1, p2)| p1.x * p2.y - p1.y * p2.x)
        .sum();
    (twice / 2.0).abs()
}

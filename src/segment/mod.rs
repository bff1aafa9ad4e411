//! Mask projection, outline tracing and quadrilateral selection.

pub mod mask;
pub mod polygon;
pub mod quad;

use serde::Serialize;

use crate::geometry::Point;

pub use mask::{compose_coverage, BinaryMask, MaskProjector};
pub use polygon::{boundary_pixels, order_nearest_neighbor, PolygonExtractor, MIN_POLYGON_POINTS};
pub use quad::{corner_quad, rectangularity, rotation_angle, QuadrilateralSelector};

/// A candidate quadrilateral that passed the detection-box filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PossiblePolygon {
    pub points: Vec<Point>,
    /// Share of the outline's bounding box inside the detection box.
    pub intersect_score: f32,
}

/// Oriented outline of a detected document.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Segmentation {
    pub possible_polygons: Vec<PossiblePolygon>,
    /// `[top_left, top_right, bottom_right, bottom_left]`.
    pub polygon: [Point; 4],
    /// Skew of the bottom edge in degrees.
    pub angle: f32,
}

use crate::geometry::{polygon_area, Point, Rect};
use crate::segment::polygon::MIN_POLYGON_POINTS;
use crate::segment::{PossiblePolygon, Segmentation};

/// Picks the document quadrilateral among the traced outlines of one detection.
#[derive(Clone, Debug)]
pub struct QuadrilateralSelector {
    intersect_threshold: f32,
}

impl QuadrilateralSelector {
    pub fn new(intersect_threshold: f32) -> Self {
        Self {
            intersect_threshold,
        }
    }

    /// Filter outlines against the detection box, build one quad per survivor
    /// and keep the most rectangular one.
    ///
    /// `None` when no outline lies inside `rect` or no quad scores above 0.
    pub fn select(&self, groups: &[Vec<Point>], rect: &Rect) -> Option<Segmentation> {
        let mut possible = Vec::new();
        for group in groups {
            if group.len() < MIN_POLYGON_POINTS {
                log::info!("skipping outline with {} points", group.len());
                continue;
            }
            let Some(bbox) = Rect::bounding(group) else {
                continue;
            };
            let intersect_score = rect.coverage_of(&bbox);
            if intersect_score < self.intersect_threshold {
                log::info!(
                    "outline intersect score {:.3} below {}",
                    intersect_score,
                    self.intersect_threshold
                );
                continue;
            }
            possible.push(PossiblePolygon {
                points: corner_quad(group).to_vec(),
                intersect_score,
            });
        }
        if possible.is_empty() {
            return None;
        }

        let mut best: Option<(usize, f32)> = None;
        for (index, candidate) in possible.iter().enumerate() {
            let score = rectangularity(&candidate.points) * candidate.intersect_score;
            if score > best.map_or(0.0, |(_, s)| s) {
                best = Some((index, score));
            }
        }
        let Some((index, score)) = best else {
            log::info!("no quadrilateral scored above zero");
            return None;
        };
        let chosen = &possible[index].points;
        let polygon = [chosen[0], chosen[1], chosen[2], chosen[3]];
        log::debug!(
            "picked quadrilateral {} with score {:.3}, area {:.0}",
            index,
            score,
            polygon_area(&polygon)
        );
        Some(Segmentation {
            angle: rotation_angle(&polygon),
            possible_polygons: possible,
            polygon,
        })
    }
}

/// Extremal corners of a point set as `[top_left, top_right, bottom_right, bottom_left]`.
///
/// Ties keep the earliest point. Negative coordinates are clamped to 0.
/// Panics on an empty slice.
pub fn corner_quad(points: &[Point]) -> [Point; 4] {
    [
        extreme(points, |p| p.x + p.y, true),
        extreme(points, |p| -p.x + p.y, true),
        extreme(points, |p| p.x + p.y, false),
        extreme(points, |p| p.x - p.y, true),
    ]
}

fn extreme(points: &[Point], score: impl Fn(&Point) -> f32, lowest: bool) -> Point {
    let mut best = points[0];
    for p in &points[1..] {
        let better = if lowest {
            score(p) < score(&best)
        } else {
            score(p) > score(&best)
        };
        if better {
            best = *p;
        }
    }
    Point::new(best.x.max(0.0), best.y.max(0.0))
}

/// How close the polygon is to a rectangle, in `0..=1`.
///
/// The polygon is reduced to its two farthest-apart points plus the point
/// farthest from the line through them on each side; the score then drops
/// linearly with the mean deviation of the four corner angles from 90°.
/// Polygons that cannot be reduced to four corners score 0.
pub fn rectangularity(points: &[Point]) -> f32 {
    if points.len() < 4 {
        return 0.0;
    }

    let mut far: Option<(usize, usize)> = None;
    let mut max_distance = 0.0f32;
    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let distance = points[i].distance_squared(&points[j]);
            if distance > max_distance {
                max_distance = distance;
                far = Some((i, j));
            }
        }
    }
    let Some((i1, i2)) = far else {
        return 0.0;
    };
    let (p1, p2) = (points[i1], points[i2]);

    // Signed distance from the p1->p2 line splits the points into two sides.
    let (dx, dy) = (p2.x - p1.x, p2.y - p1.y);
    let length = max_distance.sqrt();
    let mut left: Option<(Point, f32)> = None;
    let mut right: Option<(Point, f32)> = None;
    for (k, p) in points.iter().enumerate() {
        if k == i1 || k == i2 {
            continue;
        }
        let side = (dx * (p.y - p1.y) - dy * (p.x - p1.x)) / length;
        if side > 0.0 && left.map_or(true, |(_, d)| side > d) {
            left = Some((*p, side));
        } else if side < 0.0 && right.map_or(true, |(_, d)| -side > d) {
            right = Some((*p, -side));
        }
    }
    let (Some((p3, _)), Some((p4, _))) = (left, right) else {
        return 0.0;
    };

    let corners = [p1, p3, p2, p4];
    let mut deviation = 0.0;
    for i in 0..4 {
        let current = corners[i];
        let next = corners[(i + 1) % 4];
        let prev = corners[(i + 3) % 4];
        let angle = angle_between(
            (next.x - current.x, next.y - current.y),
            (prev.x - current.x, prev.y - current.y),
        );
        deviation += (angle - 90.0).abs();
    }
    (1.0 - deviation / 4.0 / 90.0).clamp(0.0, 1.0)
}

/// Signed skew of the bottom edge (indices 2 and 3) from horizontal, in degrees.
///
/// The lower of the two points is the pivot; equal heights pivot on index 2.
/// The result is negated when the pivot is index 2.
pub fn rotation_angle(quad: &[Point; 4]) -> f32 {
    let pivot_is_first = quad[2].y >= quad[3].y;
    let (common, other) = if pivot_is_first {
        (quad[2], quad[3])
    } else {
        (quad[3], quad[2])
    };
    let horizontal = Point::new(other.x, common.y);
    let angle = angle_between(
        (other.x - common.x, other.y - common.y),
        (horizontal.x - common.x, horizontal.y - common.y),
    );
    if pivot_is_first {
        -angle
    } else {
        angle
    }
}

/// Angle between two vectors in degrees; 0 when either has no length.
fn angle_between(v1: (f32, f32), v2: (f32, f32)) -> f32 {
    let magnitude = (v1.0 * v1.0 + v1.1 * v1.1).sqrt() * (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if magnitude == 0.0 {
        return 0.0;
    }
    let cos = (v1.0 * v2.0 + v1.1 * v2.1) / magnitude;
    cos.clamp(-1.0, 1.0).acos().to_degrees()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f32, y: f32, side: f32) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + side, y),
            Point::new(x + side, y + side),
            Point::new(x, y + side),
        ]
    }

    #[test]
    fn square_is_rectangular() {
        assert!(rectangularity(&square(0.0, 0.0, 10.0)) >= 0.99);
    }

    #[test]
    fn rectangularity_stays_in_unit_range() {
        let shapes = [
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 1.0),
                Point::new(3.0, 2.0),
                Point::new(9.0, 12.0),
            ],
            vec![
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(50.0, 1.0),
                Point::new(50.0, -1.0),
            ],
            vec![Point::new(1.0, 1.0); 5],
            vec![
                Point::new(0.0, 0.0),
                Point::new(1.0, 1.0),
                Point::new(2.0, 2.0),
                Point::new(3.0, 3.0),
            ],
        ];
        for shape in &shapes {
            let score = rectangularity(shape);
            assert!((0.0..=1.0).contains(&score), "{score} for {shape:?}");
        }
        assert_eq!(rectangularity(&shapes[2]), 0.0);
        assert_eq!(rectangularity(&shapes[3]), 0.0);
        assert_eq!(rectangularity(&square(0.0, 0.0, 4.0)[..3]), 0.0);
    }

    #[test]
    fn corners_come_from_extremes_and_clamp() {
        let points = vec![
            Point::new(-2.0, 5.0),
            Point::new(10.0, -1.0),
            Point::new(12.0, 20.0),
            Point::new(0.0, 18.0),
            Point::new(5.0, 5.0),
        ];
        let quad = corner_quad(&points);
        assert_eq!(quad[0], Point::new(0.0, 5.0));
        assert_eq!(quad[1], Point::new(10.0, 0.0));
        assert_eq!(quad[2], Point::new(12.0, 20.0));
        assert_eq!(quad[3], Point::new(0.0, 18.0));
    }

    #[test]
    fn rotation_sign_flips_with_bottom_order() {
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 12.0),
            Point::new(0.0, 10.0),
        ];
        let angle = rotation_angle(&quad);
        let expected = (2.0f32 / 10.0).atan().to_degrees();
        assert!((angle + expected).abs() < 1e-3, "{angle}");

        let swapped = [quad[0], quad[1], quad[3], quad[2]];
        assert!((rotation_angle(&swapped) - expected).abs() < 1e-3);
    }

    #[test]
    fn level_bottom_edge_has_no_rotation() {
        let quad = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert_eq!(rotation_angle(&quad), 0.0);
        let collapsed = [quad[0], quad[1], quad[2], quad[2]];
        assert_eq!(rotation_angle(&collapsed), 0.0);
    }

    #[test]
    fn selects_outline_inside_detection() {
        let selector = QuadrilateralSelector::new(0.99);
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let inside = square(10.0, 10.0, 50.0);
        let spilling = square(80.0, 80.0, 50.0);

        let segmentation = selector
            .select(&[spilling, inside], &rect)
            .expect("segmentation");
        assert_eq!(segmentation.possible_polygons.len(), 1);
        assert!((segmentation.possible_polygons[0].intersect_score - 1.0).abs() < 1e-6);
        assert_eq!(segmentation.polygon[0], Point::new(10.0, 10.0));
        assert_eq!(segmentation.polygon[2], Point::new(60.0, 60.0));
        assert_eq!(segmentation.angle, 0.0);
    }

    #[test]
    fn nothing_inside_detection_means_no_segmentation() {
        let selector = QuadrilateralSelector::new(0.99);
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        // 98.9% of this outline's box lies inside the detection.
        let edge = square(0.0, 0.0, 100.0)
            .into_iter()
            .map(|p| Point::new(p.x + 1.1, p.y))
            .collect::<Vec<_>>();
        assert!(selector.select(&[edge], &rect).is_none());
        assert!(selector.select(&[], &rect).is_none());
    }

    #[test]
    fn degenerate_quads_are_never_chosen() {
        let selector = QuadrilateralSelector::new(0.99);
        let rect = Rect::new(0.0, 0.0, 100.0, 100.0);
        let diagonal = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(20.0, 20.0),
            Point::new(30.0, 30.0),
        ];
        assert!(selector.select(&[diagonal], &rect).is_none());
    }
}

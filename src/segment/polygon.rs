use anyhow::{bail, Result};

use crate::geometry::{CoordinateMapping, Point};
use crate::segment::mask::BinaryMask;
use crate::tensor::TensorView;

/// Groups with fewer points than this cannot describe a quadrilateral.
pub const MIN_POLYGON_POINTS: usize = 4;

/// Pixel coordinate inside a mask grid, `(col, row)`.
pub type Pixel = (usize, usize);

/// Foreground pixels lying on the grid edge or touching background
/// through a 4-connected neighbour, in raster order.
pub fn boundary_pixels(cells: &[u8], width: usize, height: usize) -> Vec<Pixel> {
    let set = |col: usize, row: usize| cells[row * width + col] != 0;
    let mut boundary = Vec::new();
    for row in 0..height {
        for col in 0..width {
            if !set(col, row) {
                continue;
            }
            let on_edge = col == 0 || row == 0 || col == width - 1 || row == height - 1;
            if on_edge
                || !set(col - 1, row)
                || !set(col + 1, row)
                || !set(col, row - 1)
                || !set(col, row + 1)
            {
                boundary.push((col, row));
            }
        }
    }
    boundary
}

/// Order pixels into a path by greedy nearest-neighbour walking.
///
/// Starts at the first pixel and repeatedly steps to the closest pixel not
/// yet visited; distance ties go to the earliest pixel in input order. The
/// result is an open path: nothing guarantees the last pixel neighbours the
/// first. O(n²) in the number of pixels.
pub fn order_nearest_neighbor(pixels: &[Pixel]) -> Vec<Pixel> {
    let mut ordered = Vec::with_capacity(pixels.len());
    let Some(&first) = pixels.first() else {
        return ordered;
    };
    let mut visited = vec![false; pixels.len()];
    visited[0] = true;
    ordered.push(first);

    let mut current = first;
    for _ in 1..pixels.len() {
        let mut nearest: Option<(usize, i64)> = None;
        for (i, &(col, row)) in pixels.iter().enumerate() {
            if visited[i] {
                continue;
            }
            let dx = col as i64 - current.0 as i64;
            let dy = row as i64 - current.1 as i64;
            let dist = dx * dx + dy * dy;
            if nearest.map_or(true, |(_, best)| dist < best) {
                nearest = Some((i, dist));
            }
        }
        let Some((index, _)) = nearest else {
            break;
        };
        visited[index] = true;
        current = pixels[index];
        ordered.push(current);
    }
    ordered
}

/// Traces mask outlines into ordered point groups in real image space.
#[derive(Clone, Debug)]
pub struct PolygonExtractor {
    threshold: f32,
}

impl PolygonExtractor {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Outline of one detection mask, placed at the mask's origin.
    ///
    /// `None` when the mask yields fewer than [`MIN_POLYGON_POINTS`] points.
    pub fn extract_from_mask(&self, mask: &BinaryMask) -> Option<Vec<Point>> {
        let (ox, oy) = mask.origin();
        trace(
            mask.cells(),
            mask.width(),
            mask.height(),
            (1.0, 1.0),
            (ox as f32, oy as f32),
        )
    }

    /// One outline per prototype channel of a `[channels, height, width]`
    /// tensor, each thresholded on its own.
    ///
    /// Prototype cells are scaled to the `model_width x model_height` input
    /// and then through `mapping`, the same way detection boxes are, so the
    /// outlines land on the real frame. Degenerate channels are dropped, so
    /// the result may hold fewer groups than there are channels.
    pub fn extract_from_channels(
        &self,
        protos: &TensorView<'_>,
        model_width: u32,
        model_height: u32,
        mapping: &CoordinateMapping,
    ) -> Result<Vec<Vec<Point>>> {
        if protos.rank() != 3 {
            bail!(
                "prototype tensor must be [channels, height, width], got {:?}",
                protos.shape()
            );
        }
        let (channels, height, width) = (protos.dim(0), protos.dim(1), protos.dim(2));
        let scale = (
            model_width as f32 / width as f32 * mapping.factor_x(),
            model_height as f32 / height as f32 * mapping.factor_y(),
        );

        let mut groups = Vec::new();
        for channel in 0..channels {
            let cells: Vec<u8> = protos
                .outer(channel)
                .iter()
                .map(|&v| u8::from(v > self.threshold))
                .collect();
            match trace(&cells, width, height, scale, (0.0, 0.0)) {
                Some(points) => groups.push(points),
                None => log::info!("prototype channel {} has no usable outline", channel),
            }
        }
        Ok(groups)
    }
}

fn trace(
    cells: &[u8],
    width: usize,
    height: usize,
    scale: (f32, f32),
    offset: (f32, f32),
) -> Option<Vec<Point>> {
    let ordered = order_nearest_neighbor(&boundary_pixels(cells, width, height));
    if ordered.len() < MIN_POLYGON_POINTS {
        log::info!(
            "outline has {} points, need {}",
            ordered.len(),
            MIN_POLYGON_POINTS
        );
        return None;
    }
    Some(
        ordered
            .into_iter()
            .map(|(col, row)| {
                Point::new(
                    offset.0 + col as f32 * scale.0,
                    offset.1 + row as f32 * scale.1,
                )
            })
            .collect(),
    )
}

use anyhow::{anyhow, bail, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma};

use crate::detect::DetectionCandidate;
use crate::tensor::TensorView;

/// Foreground/background grid for one detection, placed in the full image.
///
/// Cells hold 0 or 1. `origin` is the top-left pixel of the grid in real
/// image coordinates and may lie partly outside the image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    origin: (i32, i32),
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl BinaryMask {
    pub fn new(origin: (i32, i32), width: usize, height: usize, cells: Vec<u8>) -> Result<Self> {
        if cells.len() != width * height {
            bail!(
                "mask of {}x{} needs {} cells, got {}",
                width,
                height,
                width * height,
                cells.len()
            );
        }
        Ok(Self {
            origin,
            width,
            height,
            cells,
        })
    }

    /// Threshold a score grid: strictly above `threshold` is foreground.
    pub fn from_scores(
        origin: (i32, i32),
        width: usize,
        height: usize,
        scores: &[f32],
        threshold: f32,
    ) -> Result<Self> {
        let cells = scores
            .iter()
            .map(|&v| u8::from(v > threshold))
            .collect();
        Self::new(origin, width, height, cells)
    }

    pub fn origin(&self) -> (i32, i32) {
        self.origin
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn is_set(&self, col: usize, row: usize) -> bool {
        self.cells[row * self.width + col] != 0
    }

    pub fn foreground_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0).count()
    }

    /// Mark this mask's foreground on a full-image coverage canvas.
    ///
    /// The canvas is `canvas_width * canvas_height` bytes; cells falling
    /// outside it are clipped. Everything this mask does not cover is left
    /// untouched, so pasting several masks composes their union.
    pub fn paste_into(&self, canvas: &mut [u8], canvas_width: usize, canvas_height: usize) {
        let (ox, oy) = self.origin;
        for row in 0..self.height {
            let y = oy as i64 + row as i64;
            if y < 0 || y >= canvas_height as i64 {
                continue;
            }
            for col in 0..self.width {
                let x = ox as i64 + col as i64;
                if x < 0 || x >= canvas_width as i64 || !self.is_set(col, row) {
                    continue;
                }
                canvas[y as usize * canvas_width + x as usize] = 1;
            }
        }
    }
}

/// Union of `masks` on a `width x height` canvas, one byte per pixel.
pub fn compose_coverage<'a, I>(masks: I, width: u32, height: u32) -> Vec<u8>
where
    I: IntoIterator<Item = &'a BinaryMask>,
{
    let (width, height) = (width as usize, height as usize);
    let mut canvas = vec![0u8; width * height];
    for mask in masks {
        mask.paste_into(&mut canvas, width, height);
    }
    canvas
}

/// Builds per-detection masks from prototype channels and mask coefficients.
#[derive(Clone, Debug)]
pub struct MaskProjector {
    threshold: f32,
    model_width: u32,
    model_height: u32,
}

impl MaskProjector {
    pub fn new(threshold: f32, model_width: u32, model_height: u32) -> Self {
        Self {
            threshold,
            model_width,
            model_height,
        }
    }

    /// Linear combination of the `[channels, height, width]` prototypes.
    pub fn combine(coefficients: &[f32], protos: &TensorView<'_>) -> Result<Vec<f32>> {
        if protos.rank() != 3 {
            bail!(
                "prototype tensor must be [channels, height, width], got {:?}",
                protos.shape()
            );
        }
        if coefficients.len() != protos.dim(0) {
            bail!(
                "{} mask coefficients for {} prototype channels",
                coefficients.len(),
                protos.dim(0)
            );
        }
        let plane = protos.dim(1) * protos.dim(2);
        let mut combined = vec![0.0f32; plane];
        for (channel, &weight) in coefficients.iter().enumerate() {
            if weight == 0.0 {
                continue;
            }
            for (acc, &value) in combined.iter_mut().zip(protos.outer(channel)) {
                *acc += weight * value;
            }
        }
        Ok(combined)
    }

    /// Project one detection's mask into real image space.
    ///
    /// The mask covers `candidate.rect` snapped to the pixel grid. Upsampled
    /// scores saturate to `0..=1`. Returns `None` when the box maps to an
    /// empty crop in prototype space or to an empty target box in the real
    /// image.
    pub fn project(
        &self,
        candidate: &DetectionCandidate,
        protos: &TensorView<'_>,
    ) -> Result<Option<BinaryMask>> {
        let combined = Self::combine(&candidate.mask_coefficients, protos)?;
        let (proto_h, proto_w) = (protos.dim(1) as i64, protos.dim(2) as i64);

        let m = &candidate.model_rect;
        let sx = proto_w as f32 / self.model_width as f32;
        let sy = proto_h as f32 / self.model_height as f32;
        let left = (m.x * sx).floor() as i64;
        let top = (m.y * sy).floor() as i64;
        let crop_w = (m.w * sx).round() as i64;
        let crop_h = (m.h * sy).round() as i64;

        let x0 = left.clamp(0, proto_w);
        let y0 = top.clamp(0, proto_h);
        let x1 = (left + crop_w).clamp(0, proto_w);
        let y1 = (top + crop_h).clamp(0, proto_h);
        if x1 <= x0 || y1 <= y0 {
            log::info!(
                "skipping mask: box {:?} maps to an empty prototype crop",
                candidate.model_rect
            );
            return Ok(None);
        }

        let target = candidate.rect.snap_to_pixels();
        let (target_w, target_h) = (target.w as u32, target.h as u32);
        if target_w == 0 || target_h == 0 {
            log::info!("skipping mask: box {:?} has no pixels", candidate.rect);
            return Ok(None);
        }

        let (cw, ch) = ((x1 - x0) as usize, (y1 - y0) as usize);
        let mut crop = Vec::with_capacity(cw * ch);
        for row in y0 as usize..y1 as usize {
            let start = row * proto_w as usize + x0 as usize;
            crop.extend_from_slice(&combined[start..start + cw]);
        }
        let crop: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(cw as u32, ch as u32, crop)
                .ok_or_else(|| anyhow!("mask crop does not fit {}x{}", cw, ch))?;

        let upsampled = imageops::resize(&crop, target_w, target_h, FilterType::Triangle);
        BinaryMask::from_scores(
            (target.x as i32, target.y as i32),
            target_w as usize,
            target_h as usize,
            upsampled.as_raw(),
            self.threshold,
        )
        .map(Some)
    }
}

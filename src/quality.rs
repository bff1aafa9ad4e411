//! Frame quality gates for the capture loop.
//!
//! Both metrics are pure functions over `FrameSample`s; `FrameQualityAnalyzer`
//! only carries the thresholds that turn them into accept/reject decisions.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::frame::FrameSample;

pub const DEFAULT_MOTION_THRESHOLD: f32 = 0.08;
pub const DEFAULT_MOTION_PIXEL_DELTA: u32 = 100;
pub const DEFAULT_SHARPNESS_THRESHOLD: f32 = 0.05;

/// Share of pixels, in `0..=1`, whose summed RGB difference exceeds `pixel_delta`.
pub fn motion_percentage(
    current: &FrameSample,
    previous: &FrameSample,
    pixel_delta: u32,
) -> Result<f32> {
    if !current.same_size(previous) {
        return Err(anyhow!(
            "cannot compare a {}x{} frame against a {}x{} frame",
            current.width(),
            current.height(),
            previous.width(),
            previous.height()
        ));
    }
    let total = current.width() as usize * current.height() as usize;
    if total == 0 {
        return Ok(0.0);
    }

    let changed = current
        .rgb()
        .chunks_exact(3)
        .zip(previous.rgb().chunks_exact(3))
        .filter(|(a, b)| {
            let diff: u32 = a.iter().zip(b.iter()).map(|(x, y)| x.abs_diff(*y) as u32).sum();
            diff > pixel_delta
        })
        .count();

    let motion = changed as f32 / total as f32;
    log::debug!("motion {:.4} ({} of {} pixels)", motion, changed, total);
    Ok(motion)
}

/// Mean Sobel gradient magnitude of the luminance image, divided by 255.
///
/// Only interior pixels are filtered; frames smaller than 3x3 report 0.
pub fn sharpness(sample: &FrameSample) -> f32 {
    let (w, h) = (sample.width() as usize, sample.height() as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }

    let gray: Vec<f32> = sample
        .rgb()
        .chunks_exact(3)
        .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
        .collect();
    let at = |x: usize, y: usize| gray[y * w + x];
    // Smoothed column and row sums; the Sobel kernels are their differences.
    let column = |x: usize, y: usize| at(x, y - 1) + 2.0 * at(x, y) + at(x, y + 1);
    let row = |x: usize, y: usize| at(x - 1, y) + 2.0 * at(x, y) + at(x + 1, y);

    let mut sum = 0.0f64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = column(x + 1, y) - column(x - 1, y);
            let gy = row(x, y + 1) - row(x, y - 1);
            sum += (gx * gx + gy * gy).sqrt() as f64;
        }
    }

    let interior = ((w - 2) * (h - 2)) as f64;
    let value = (sum / interior / 255.0) as f32;
    log::debug!("sharpness {:.4}", value);
    value
}

/// Both metrics for one frame pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct QualityReport {
    /// `None` when there was no previous frame to compare against.
    pub motion: Option<f32>,
    pub sharpness: f32,
    pub stabilized: bool,
    pub sharp: bool,
}

/// Thresholds that turn the quality metrics into capture gates.
#[derive(Clone, Debug)]
pub struct FrameQualityAnalyzer {
    motion_threshold: f32,
    motion_pixel_delta: u32,
    sharpness_threshold: f32,
}

impl Default for FrameQualityAnalyzer {
    fn default() -> Self {
        Self::new(
            DEFAULT_MOTION_THRESHOLD,
            DEFAULT_MOTION_PIXEL_DELTA,
            DEFAULT_SHARPNESS_THRESHOLD,
        )
    }
}

impl FrameQualityAnalyzer {
    pub fn new(motion_threshold: f32, motion_pixel_delta: u32, sharpness_threshold: f32) -> Self {
        Self {
            motion_threshold,
            motion_pixel_delta,
            sharpness_threshold,
        }
    }

    pub fn motion(&self, current: &FrameSample, previous: &FrameSample) -> Result<f32> {
        motion_percentage(current, previous, self.motion_pixel_delta)
    }

    pub fn sharpness(&self, sample: &FrameSample) -> f32 {
        sharpness(sample)
    }

    pub fn is_stabilized(&self, motion: f32) -> bool {
        motion < self.motion_threshold
    }

    pub fn is_sharp(&self, sharpness: f32) -> bool {
        sharpness > self.sharpness_threshold
    }

    /// Evaluate `current`, comparing it against `previous` when given.
    ///
    /// Without a previous frame the pair counts as not stabilized.
    pub fn report(
        &self,
        current: &FrameSample,
        previous: Option<&FrameSample>,
    ) -> Result<QualityReport> {
        let motion = previous
            .map(|previous| self.motion(current, previous))
            .transpose()?;
        let sharpness = self.sharpness(current);
        Ok(QualityReport {
            motion,
            sharpness,
            stabilized: motion.map_or(false, |m| self.is_stabilized(m)),
            sharp: self.is_sharp(sharpness),
        })
    }
}

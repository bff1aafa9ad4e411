use serde::Serialize;

use crate::geometry::Rect;
use crate::segment::{BinaryMask, Segmentation};

/// One anchor that cleared the probability threshold.
#[derive(Clone, Debug)]
pub struct DetectionCandidate {
    pub class_index: usize,
    /// Best class score, in `0..=1`.
    pub score: f32,
    /// Box in real image pixels.
    pub rect: Rect,
    /// Box in model input pixels, kept for mapping into prototype space.
    pub model_rect: Rect,
    pub mask_coefficients: Vec<f32>,
}

/// Final output of one pipeline run.
#[derive(Clone, Debug, Serialize)]
pub struct Prediction {
    pub class_name: String,
    /// Score as a percentage rounded to one decimal.
    pub probability: f32,
    pub rect: Rect,
    pub segmentation: Option<Segmentation>,
    /// The detection's own mask in real image pixels, for overlays.
    #[serde(skip)]
    pub mask: Option<BinaryMask>,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, score: f32, rect: Rect) -> Self {
        Self {
            class_name: class_name.into(),
            probability: (score * 1000.0).round() / 10.0,
            rect,
            segmentation: None,
            mask: None,
        }
    }

    /// Probability rendered the way overlays display it, e.g. `"90.0"`.
    pub fn probability_label(&self) -> String {
        format!("{:.1}", self.probability)
    }
}

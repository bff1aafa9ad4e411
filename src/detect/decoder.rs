use anyhow::{bail, Result};

use crate::detect::result::DetectionCandidate;
use crate::geometry::{CoordinateMapping, Rect};
use crate::tensor::TensorView;

const BOX_FEATURES: usize = 4;

/// Turns the detector's `[features, anchors]` output into scored candidates.
///
/// Feature rows are laid out as `cx, cy, w, h`, then one score per class,
/// then the mask coefficients for every prototype channel.
#[derive(Clone, Debug)]
pub struct DetectionDecoder {
    class_count: usize,
    probability_threshold: f32,
}

impl DetectionDecoder {
    pub fn new(class_count: usize, probability_threshold: f32) -> Self {
        Self {
            class_count,
            probability_threshold,
        }
    }

    /// Number of mask coefficients each anchor carries for this layout.
    pub fn mask_channels(&self, detections: &TensorView<'_>) -> Result<usize> {
        self.check_layout(detections)?;
        Ok(detections.dim(0) - BOX_FEATURES - self.class_count)
    }

    fn check_layout(&self, detections: &TensorView<'_>) -> Result<()> {
        if detections.rank() != 2 {
            bail!(
                "detection tensor must be [features, anchors], got {:?}",
                detections.shape()
            );
        }
        if self.class_count == 0 {
            bail!("label table is empty");
        }
        let (features, anchors) = (detections.dim(0), detections.dim(1));
        if anchors == 0 {
            bail!("detection tensor has no anchors");
        }
        if features < BOX_FEATURES + self.class_count {
            bail!(
                "detection tensor has {} features, {} classes need at least {}",
                features,
                self.class_count,
                BOX_FEATURES + self.class_count
            );
        }
        Ok(())
    }

    /// Decode every anchor whose best class score clears the threshold.
    ///
    /// Output order follows anchor order; nothing is sorted here.
    pub fn decode(
        &self,
        detections: &TensorView<'_>,
        mapping: &CoordinateMapping,
    ) -> Result<Vec<DetectionCandidate>> {
        let mask_channels = self.mask_channels(detections)?;
        let anchors = detections.dim(1);
        let coefficient_base = BOX_FEATURES + self.class_count;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let mut score = f32::NEG_INFINITY;
            let mut class_index = 0;
            for class in 0..self.class_count {
                let value = detections.outer(BOX_FEATURES + class)[anchor];
                if value > score {
                    score = value;
                    class_index = class;
                }
            }
            if score.is_nan() || score <= self.probability_threshold {
                continue;
            }

            let cx = detections.outer(0)[anchor];
            let cy = detections.outer(1)[anchor];
            let w = detections.outer(2)[anchor];
            let h = detections.outer(3)[anchor];
            let model_rect = Rect::from_center(cx, cy, w, h);

            let mask_coefficients = (0..mask_channels)
                .map(|channel| detections.outer(coefficient_base + channel)[anchor])
                .collect();

            candidates.push(DetectionCandidate {
                class_index,
                score,
                rect: mapping.to_real(&model_rect),
                model_rect,
                mask_coefficients,
            });
        }

        log::debug!(
            "decoded {} of {} anchors above {}",
            candidates.len(),
            anchors,
            self.probability_threshold
        );
        Ok(candidates)
    }
}

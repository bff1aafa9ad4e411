use std::cmp::Ordering;

use crate::geometry::Rect;

/// Greedy non-max suppression settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsParams {
    /// Boxes overlapping a kept box by more than this IoU are discarded.
    pub iou_threshold: f32,
    /// Boxes scoring at or below this are never kept.
    pub score_threshold: f32,
    pub max_detections: usize,
}

/// Indices of the surviving boxes, highest score first.
///
/// Equal scores keep their input order, so the first-seen box wins a tie.
/// No two returned boxes overlap by more than `iou_threshold`.
pub fn non_max_suppression(boxes: &[Rect], scores: &[f32], params: &NmsParams) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let mut order: Vec<usize> = (0..boxes.len().min(scores.len()))
        .filter(|&i| scores[i] > params.score_threshold)
        .collect();
    // `sort_by` is stable, which is what keeps ties in input order.
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));

    let mut kept: Vec<usize> = Vec::new();
    for candidate in order {
        if kept.len() >= params.max_detections {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|&k| boxes[k].iou(&boxes[candidate]) > params.iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> NmsParams {
        NmsParams {
            iou_threshold: 0.2,
            score_threshold: 0.25,
            max_detections: 500,
        }
    }

    #[test]
    fn keeps_best_of_overlapping_pair() {
        let boxes = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(1.0, 1.0, 10.0, 10.0),
            Rect::new(50.0, 50.0, 10.0, 10.0),
        ];
        let scores = [0.6, 0.9, 0.7];
        assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![1, 2]);
    }

    #[test]
    fn tie_keeps_first_seen() {
        let boxes = [
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Rect::new(0.0, 0.0, 10.0, 10.0),
        ];
        let scores = [0.8, 0.8];
        assert_eq!(non_max_suppression(&boxes, &scores, &params()), vec![0]);
    }

    #[test]
    fn respects_cap_and_score_threshold() {
        let boxes: Vec<Rect> = (0..10)
            .map(|i| Rect::new(i as f32 * 20.0, 0.0, 10.0, 10.0))
            .collect();
        let mut scores = vec![0.5f32; 10];
        scores[3] = 0.2;
        scores[7] = f32::NAN;
        let capped = NmsParams {
            max_detections: 4,
            ..params()
        };
        let kept = non_max_suppression(&boxes, &scores, &capped);
        assert_eq!(kept, vec![0, 1, 2, 4]);
    }

    #[test]
    fn survivors_never_overlap_beyond_threshold() {
        let mut boxes = Vec::new();
        let mut scores = Vec::new();
        for i in 0..40 {
            let offset = (i % 8) as f32 * 3.0;
            let row = (i / 8) as f32 * 7.0;
            boxes.push(Rect::new(offset, row, 12.0, 9.0));
            scores.push(0.3 + (i * 17 % 23) as f32 / 40.0);
        }
        let kept = non_max_suppression(&boxes, &scores, &params());
        assert!(!kept.is_empty());
        for (n, &a) in kept.iter().enumerate() {
            for &b in &kept[n + 1..] {
                assert!(boxes[a].iou(&boxes[b]) <= 0.2);
            }
            if n > 0 {
                assert!(scores[kept[n - 1]] >= scores[a]);
            }
        }
    }
}

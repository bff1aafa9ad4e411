//! One frame from pixels to `Prediction`.
//!
//! `DocumentLocator` owns the backend and the stage objects built from the
//! config. Each call runs to completion on the caller's thread; all of the
//! frame's tensors live in a `FrameScratch` that is dropped when the call
//! returns, whether it succeeded or not.

use anyhow::{anyhow, Result};

use crate::config::{LocatorConfig, SegmentationSource};
use crate::detect::{
    non_max_suppression, DetectionCandidate, DetectionDecoder, InferenceBackend, NmsParams,
    Prediction, RawOutputs,
};
use crate::frame::{letterbox, FrameSample};
use crate::geometry::{CoordinateMapping, Point, Rect};
use crate::segment::{
    BinaryMask, MaskProjector, PolygonExtractor, QuadrilateralSelector, Segmentation,
};
use crate::tensor::TensorView;

/// Buffers of one frame's post-processing. Views borrow from it.
struct FrameScratch {
    outputs: RawOutputs,
}

impl FrameScratch {
    fn new(mut outputs: RawOutputs) -> Result<Self> {
        outputs.protos_channel_first()?;
        Ok(Self { outputs })
    }

    fn detections(&self) -> Result<TensorView<'_>> {
        self.outputs.detection_view()
    }

    fn protos(&self) -> Result<TensorView<'_>> {
        self.outputs.proto_view()
    }
}

pub struct DocumentLocator {
    config: LocatorConfig,
    backend: Box<dyn InferenceBackend>,
    decoder: DetectionDecoder,
    nms: NmsParams,
    projector: MaskProjector,
    extractor: PolygonExtractor,
    selector: QuadrilateralSelector,
}

impl DocumentLocator {
    pub fn new(config: LocatorConfig, backend: Box<dyn InferenceBackend>) -> Result<Self> {
        config.validate()?;
        let expected = (config.model.width, config.model.height);
        if backend.input_size() != expected {
            return Err(anyhow!(
                "backend {} takes {:?} inputs, config expects {:?}",
                backend.name(),
                backend.input_size(),
                expected
            ));
        }

        let detection = &config.detection;
        let decoder =
            DetectionDecoder::new(config.model.labels.len(), detection.probability_threshold);
        let nms = NmsParams {
            iou_threshold: detection.iou_threshold,
            score_threshold: detection.probability_threshold,
            max_detections: detection.max_detections,
        };
        let projector = MaskProjector::new(
            detection.mask_threshold,
            config.model.width,
            config.model.height,
        );
        let extractor = PolygonExtractor::new(detection.mask_threshold);
        let selector = QuadrilateralSelector::new(detection.intersect_threshold);

        log::info!(
            "document locator ready: backend={} input={}x{} labels={:?}",
            backend.name(),
            config.model.width,
            config.model.height,
            config.model.labels
        );
        Ok(Self {
            config,
            backend,
            decoder,
            nms,
            projector,
            extractor,
            selector,
        })
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    /// Best prediction for `sample`, in the sample's own pixel space.
    pub fn locate(&mut self, sample: &FrameSample) -> Result<Option<Prediction>> {
        self.locate_at(sample, sample.width(), sample.height())
    }

    /// Best prediction for `sample`, mapped onto a `real_width x real_height` frame.
    pub fn locate_at(
        &mut self,
        sample: &FrameSample,
        real_width: u32,
        real_height: u32,
    ) -> Result<Option<Prediction>> {
        let (outputs, mapping) = self.run_model(sample, real_width, real_height)?;
        Ok(self
            .postprocess(outputs, &mapping, Some(1))?
            .into_iter()
            .next())
    }

    /// Every prediction surviving suppression, highest score first.
    pub fn locate_all(&mut self, sample: &FrameSample) -> Result<Vec<Prediction>> {
        let (outputs, mapping) = self.run_model(sample, sample.width(), sample.height())?;
        self.postprocess(outputs, &mapping, None)
    }

    fn run_model(
        &mut self,
        sample: &FrameSample,
        real_width: u32,
        real_height: u32,
    ) -> Result<(RawOutputs, CoordinateMapping)> {
        let (input, mapping) = letterbox(
            sample,
            self.config.model.width,
            self.config.model.height,
            real_width,
            real_height,
        )?;
        let outputs = self.backend.infer(&input)?;
        Ok((outputs, mapping))
    }

    /// Turn raw model outputs into predictions without touching the backend.
    ///
    /// Prediction boxes are snapped to the pixel grid. `limit` caps how many
    /// predictions are built (and segmented).
    pub fn postprocess(
        &self,
        outputs: RawOutputs,
        mapping: &CoordinateMapping,
        limit: Option<usize>,
    ) -> Result<Vec<Prediction>> {
        let scratch = FrameScratch::new(outputs)?;
        let detections = scratch.detections()?;
        let protos = scratch.protos()?;

        let mask_channels = self.decoder.mask_channels(&detections)?;
        if protos.rank() != 3 || protos.dim(0) != mask_channels {
            return Err(anyhow!(
                "detections carry {} mask coefficients, prototype tensor is {:?}",
                mask_channels,
                protos.shape()
            ));
        }

        let candidates = self.decoder.decode(&detections, mapping)?;
        if candidates.is_empty() {
            log::debug!("no detection above {}", self.nms.score_threshold);
            return Ok(Vec::new());
        }

        let boxes: Vec<Rect> = candidates.iter().map(|c| c.model_rect).collect();
        let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
        let keep = non_max_suppression(&boxes, &scores, &self.nms);
        log::debug!("{} of {} candidates kept", keep.len(), candidates.len());

        let mut predictions = Vec::new();
        for index in keep.into_iter().take(limit.unwrap_or(usize::MAX)) {
            let candidate = &candidates[index];
            let label = self
                .config
                .model
                .labels
                .get(candidate.class_index)
                .ok_or_else(|| anyhow!("class index {} has no label", candidate.class_index))?;
            let rect = candidate.rect.snap_to_pixels();
            let mut prediction = Prediction::new(label.as_str(), candidate.score, rect);
            if self.config.detection.segment {
                let (segmentation, mask) = self.segment(candidate, &rect, &protos, mapping)?;
                prediction.segmentation = segmentation;
                prediction.mask = mask;
            }
            predictions.push(prediction);
        }
        Ok(predictions)
    }

    fn segment(
        &self,
        candidate: &DetectionCandidate,
        rect: &Rect,
        protos: &TensorView<'_>,
        mapping: &CoordinateMapping,
    ) -> Result<(Option<Segmentation>, Option<BinaryMask>)> {
        let mut mask = None;
        let groups: Vec<Vec<Point>> = match self.config.detection.source {
            SegmentationSource::Instance => {
                mask = self.projector.project(candidate, protos)?;
                mask.as_ref()
                    .and_then(|mask| self.extractor.extract_from_mask(mask))
                    .into_iter()
                    .collect()
            }
            SegmentationSource::Channels => self.extractor.extract_from_channels(
                protos,
                self.config.model.width,
                self.config.model.height,
                mapping,
            )?,
        };
        if groups.is_empty() {
            log::info!("no outline for detection at {:?}", rect);
            return Ok((None, mask));
        }
        Ok((self.selector.select(&groups, rect), mask))
    }
}

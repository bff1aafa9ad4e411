#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{InferenceBackend, ProtoLayout, RawOutputs};
use crate::frame::ModelInput;

/// Tract-based backend for YOLO-style ONNX segmentation models.
///
/// Expects two outputs: detections `[1, features, anchors]` and prototypes
/// in either channel-first or channel-last order.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
    proto_layout: ProtoLayout,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "loaded ONNX model {} ({}x{})",
            model_path.display(),
            width,
            height
        );
        Ok(Self {
            model,
            width,
            height,
            proto_layout: ProtoLayout::ChannelFirst,
        })
    }

    /// Declare the prototype output as channel-last.
    pub fn with_proto_layout(mut self, layout: ProtoLayout) -> Self {
        self.proto_layout = layout;
        self
    }

    fn build_input(&self, input: &ModelInput) -> Result<Tensor> {
        if input.width() != self.width || input.height() != self.height {
            return Err(anyhow!(
                "input {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            ));
        }
        let [n, c, h, w] = input.shape();
        let array = tract_ndarray::Array4::from_shape_vec((n, c, h, w), input.as_slice().to_vec())
            .context("model input does not fit its declared shape")?;
        Ok(array.into_tensor())
    }

    fn extract_outputs(&self, outputs: TVec<TValue>) -> Result<RawOutputs> {
        if outputs.len() < 2 {
            return Err(anyhow!(
                "segmentation model produced {} outputs, expected 2",
                outputs.len()
            ));
        }
        let (detections, detection_shape) = flatten::<3>(&outputs[0], "detection")?;
        let (protos, proto_shape) = flatten::<4>(&outputs[1], "prototype")?;
        Ok(RawOutputs {
            detections,
            detection_shape,
            protos,
            proto_shape,
            proto_layout: self.proto_layout,
        })
    }
}

fn flatten<const RANK: usize>(tensor: &Tensor, what: &str) -> Result<(Vec<f32>, [usize; RANK])> {
    let view = tensor
        .to_array_view::<f32>()
        .with_context(|| format!("{} output tensor was not f32", what))?;
    let shape: [usize; RANK] = view.shape().try_into().map_err(|_| {
        anyhow!(
            "{} output has shape {:?}, expected rank {}",
            what,
            view.shape(),
            RANK
        )
    })?;
    Ok((view.iter().copied().collect(), shape))
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn infer(&mut self, input: &ModelInput) -> Result<RawOutputs> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        self.extract_outputs(outputs)
    }
}

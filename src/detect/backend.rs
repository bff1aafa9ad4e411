use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::Deserialize;

use crate::frame::ModelInput;
use crate::tensor::TensorView;

/// Memory order of the prototype mask tensor a model emits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtoLayout {
    /// `[1, channels, height, width]`.
    #[default]
    ChannelFirst,
    /// `[1, height, width, channels]`, as TF.js exports produce.
    ChannelLast,
}

impl FromStr for ProtoLayout {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "channel_first" => Ok(Self::ChannelFirst),
            "channel_last" => Ok(Self::ChannelLast),
            other => Err(anyhow!(
                "unknown prototype layout {:?}, expected channel_first or channel_last",
                other
            )),
        }
    }
}

/// Raw tensors from one segmentation model run.
///
/// `detections` is `[1, features, anchors]`. `protos` follows `proto_layout`.
#[derive(Clone, Debug)]
pub struct RawOutputs {
    pub detections: Vec<f32>,
    pub detection_shape: [usize; 3],
    pub protos: Vec<f32>,
    pub proto_shape: [usize; 4],
    pub proto_layout: ProtoLayout,
}

impl RawOutputs {
    pub fn detection_view(&self) -> Result<TensorView<'_>> {
        TensorView::new(&self.detections, &self.detection_shape)?.squeeze_batch()
    }

    /// `[channels, height, width]` view of the prototypes.
    ///
    /// Fails for channel-last outputs; call [`RawOutputs::protos_channel_first`] first.
    pub fn proto_view(&self) -> Result<TensorView<'_>> {
        if self.proto_layout != ProtoLayout::ChannelFirst {
            return Err(anyhow!("prototype tensor is channel-last, transpose it first"));
        }
        TensorView::new(&self.protos, &self.proto_shape)?.squeeze_batch()
    }

    /// Reorder channel-last prototypes to channel-first in place.
    pub fn protos_channel_first(&mut self) -> Result<()> {
        if self.proto_layout == ProtoLayout::ChannelFirst {
            return Ok(());
        }
        let [batch, height, width, channels] = self.proto_shape;
        if batch != 1 {
            return Err(anyhow!(
                "expected a batch of one, got prototype shape {:?}",
                self.proto_shape
            ));
        }
        let expected = height * width * channels;
        if self.protos.len() != expected {
            return Err(anyhow!(
                "prototype shape {:?} expects {} values, buffer holds {}",
                self.proto_shape,
                expected,
                self.protos.len()
            ));
        }

        let mut reordered = vec![0.0f32; expected];
        for y in 0..height {
            for x in 0..width {
                let src = (y * width + x) * channels;
                for c in 0..channels {
                    reordered[(c * height + y) * width + x] = self.protos[src + c];
                }
            }
        }
        self.protos = reordered;
        self.proto_shape = [1, channels, height, width];
        self.proto_layout = ProtoLayout::ChannelFirst;
        Ok(())
    }
}

/// Inference runtime seam.
///
/// Backends own their model state; the pipeline only hands them one
/// preprocessed input at a time and waits for the outputs.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Model input size as `(width, height)`.
    fn input_size(&self) -> (u32, u32);

    /// Run the model on one `[1, 3, H, W]` input.
    fn infer(&mut self, input: &ModelInput) -> Result<RawOutputs>;

    /// Run one all-zero input so the first real frame does not pay for
    /// lazy initialization.
    fn warm_up(&mut self) -> Result<()> {
        let (width, height) = self.input_size();
        self.infer(&ModelInput::zeros(width, height)).map(|_| ())
    }
}

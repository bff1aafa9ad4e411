use anyhow::{anyhow, Result};

use crate::detect::backend::{InferenceBackend, ProtoLayout, RawOutputs};
use crate::frame::ModelInput;

/// Stub backend for tests and demos. Replays the same outputs for every frame.
pub struct StubBackend {
    width: u32,
    height: u32,
    outputs: RawOutputs,
    calls: usize,
}

impl StubBackend {
    pub fn new(width: u32, height: u32, outputs: RawOutputs) -> Self {
        Self {
            width,
            height,
            outputs,
            calls: 0,
        }
    }

    /// A model that never finds anything: one anchor scoring 0 for every class.
    pub fn empty(width: u32, height: u32, class_count: usize) -> Self {
        let features = 4 + class_count + 1;
        let outputs = RawOutputs {
            detections: vec![0.0; features],
            detection_shape: [1, features, 1],
            protos: vec![0.0; 16],
            proto_shape: [1, 1, 4, 4],
            proto_layout: ProtoLayout::ChannelFirst,
        };
        Self::new(width, height, outputs)
    }

    /// A model that sees `document` in every frame.
    pub fn with_document(width: u32, height: u32, document: &SyntheticDocument) -> Self {
        Self::new(width, height, document.outputs(width, height))
    }

    /// Number of `infer` calls so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn infer(&mut self, input: &ModelInput) -> Result<RawOutputs> {
        if input.width() != self.width || input.height() != self.height {
            return Err(anyhow!(
                "input {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            ));
        }
        self.calls += 1;
        Ok(self.outputs.clone())
    }
}

/// One rectangular document as a segmentation model would report it.
///
/// Box values are in model input pixels, center form. The prototype tensor
/// gets a single positive channel covering the box, and the anchor's mask
/// coefficients select exactly that channel.
#[derive(Clone, Debug)]
pub struct SyntheticDocument {
    pub center: (f32, f32),
    pub size: (f32, f32),
    pub score: f32,
    pub class_index: usize,
    pub class_count: usize,
    /// Prototype grid as `(width, height)`.
    pub proto_size: (usize, usize),
    pub mask_channels: usize,
}

impl SyntheticDocument {
    pub fn new(center: (f32, f32), size: (f32, f32), score: f32) -> Self {
        Self {
            center,
            size,
            score,
            class_index: 0,
            class_count: 1,
            proto_size: (80, 80),
            mask_channels: 4,
        }
    }

    pub fn outputs(&self, model_width: u32, model_height: u32) -> RawOutputs {
        let features = 4 + self.class_count + self.mask_channels;
        let mut detections = vec![0.0f32; features];
        detections[0] = self.center.0;
        detections[1] = self.center.1;
        detections[2] = self.size.0;
        detections[3] = self.size.1;
        detections[4 + self.class_index] = self.score;
        if self.mask_channels > 0 {
            detections[4 + self.class_count] = 1.0;
        }

        let (proto_w, proto_h) = self.proto_size;
        let mut protos = vec![0.0f32; self.mask_channels * proto_w * proto_h];
        if self.mask_channels > 0 {
            let sx = proto_w as f32 / model_width as f32;
            let sy = proto_h as f32 / model_height as f32;
            let left = ((self.center.0 - self.size.0 / 2.0) * sx).floor() as i64;
            let top = ((self.center.1 - self.size.1 / 2.0) * sy).floor() as i64;
            let right = left + (self.size.0 * sx).round() as i64;
            let bottom = top + (self.size.1 * sy).round() as i64;
            for y in 0..proto_h {
                for x in 0..proto_w {
                    let inside = (left..right).contains(&(x as i64))
                        && (top..bottom).contains(&(y as i64));
                    protos[y * proto_w + x] = if inside { 1.0 } else { -1.0 };
                }
            }
        }

        RawOutputs {
            detections,
            detection_shape: [1, features, 1],
            protos,
            proto_shape: [1, self.mask_channels, proto_h, proto_w],
            proto_layout: ProtoLayout::ChannelFirst,
        }
    }
}

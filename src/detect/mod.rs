//! Detection stage: runtime seam, tensor decoding and non-max suppression.

mod backend;
mod backends;
mod decoder;
mod nms;
mod result;

pub use backend::{InferenceBackend, ProtoLayout, RawOutputs};
pub use backends::{StubBackend, SyntheticDocument};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use decoder::DetectionDecoder;
pub use nms::{non_max_suppression, NmsParams};
pub use result::{DetectionCandidate, Prediction};

//! Document locator
//!
//! Post-processing for YOLO-style segmentation models that look for a
//! document (an ID card, a passport page) in a camera frame, plus the frame
//! quality gates a live-capture loop uses to decide when to keep a frame.
//!
//! # Pipeline
//!
//! ```text
//! FrameSample -> letterbox -> InferenceBackend -> DetectionDecoder
//!     -> non_max_suppression -> MaskProjector -> PolygonExtractor
//!     -> QuadrilateralSelector -> Prediction
//! ```
//!
//! `FrameQualityAnalyzer` runs beside the pipeline on consecutive frames;
//! `CaptureSession` combines both into one accept/reject decision per frame.
//!
//! # Module Structure
//!
//! - `geometry`: points, rectangles, coordinate mapping
//! - `tensor`: shape-aware views over raw model outputs
//! - `frame`: frame buffers and model input preprocessing
//! - `detect`: inference seam, decoding, non-max suppression
//! - `segment`: masks, outlines, quadrilateral selection
//! - `quality`: motion and sharpness metrics
//! - `pipeline`: `DocumentLocator`
//! - `session`: `CaptureSession`
//! - `config`: `LocatorConfig`

pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod quality;
pub mod segment;
pub mod session;
pub mod tensor;

pub use config::{LocatorConfig, SegmentationSource};
pub use detect::{
    DetectionCandidate, DetectionDecoder, InferenceBackend, NmsParams, Prediction, ProtoLayout,
    RawOutputs, StubBackend, SyntheticDocument,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::{letterbox, FrameSample, ModelInput, PixelFormat};
pub use geometry::{CoordinateMapping, Point, Rect};
pub use pipeline::DocumentLocator;
pub use quality::{FrameQualityAnalyzer, QualityReport};
pub use segment::{
    compose_coverage, BinaryMask, MaskProjector, PolygonExtractor, PossiblePolygon,
    QuadrilateralSelector, Segmentation,
};
pub use session::{CaptureDecision, CaptureSession};
pub use tensor::TensorView;

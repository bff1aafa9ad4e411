use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::ProtoLayout;
use crate::quality::{
    DEFAULT_MOTION_PIXEL_DELTA, DEFAULT_MOTION_THRESHOLD, DEFAULT_SHARPNESS_THRESHOLD,
};

const DEFAULT_MODEL_WIDTH: u32 = 640;
const DEFAULT_MODEL_HEIGHT: u32 = 640;
const DEFAULT_LABEL: &str = "id_card";
const DEFAULT_PROBABILITY_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.2;
const DEFAULT_MAX_DETECTIONS: usize = 500;
const DEFAULT_INTERSECT_THRESHOLD: f32 = 0.99;
const DEFAULT_MASK_THRESHOLD: f32 = 0.5;
const DEFAULT_MOTION_INTERVAL: u32 = 6;

#[derive(Debug, Deserialize, Default)]
struct LocatorConfigFile {
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    labels: Option<Vec<String>>,
    proto_layout: Option<ProtoLayout>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    probability_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    max_detections: Option<usize>,
    intersect_threshold: Option<f32>,
    mask_threshold: Option<f32>,
    segment: Option<bool>,
    source: Option<SegmentationSource>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    motion_threshold: Option<f32>,
    motion_pixel_delta: Option<u32>,
    sharpness_threshold: Option<f32>,
    motion_interval: Option<u32>,
}

/// Where outlines for the quadrilateral search come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationSource {
    /// The detection's own mask, built from its coefficients.
    #[default]
    Instance,
    /// Every prototype channel thresholded on its own.
    Channels,
}

#[derive(Debug, Clone)]
pub struct LocatorConfig {
    pub model: ModelSettings,
    pub detection: DetectionSettings,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    /// Class names, indexed by the model's class scores.
    pub labels: Vec<String>,
    /// Memory order of the model's prototype output.
    pub proto_layout: ProtoLayout,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub probability_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub intersect_threshold: f32,
    pub mask_threshold: f32,
    /// Run the segmentation stage for the winning detection.
    pub segment: bool,
    pub source: SegmentationSource,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub motion_threshold: f32,
    pub motion_pixel_delta: u32,
    pub sharpness_threshold: f32,
    /// Motion is sampled once every this many frames.
    pub motion_interval: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings {
                path: None,
                width: DEFAULT_MODEL_WIDTH,
                height: DEFAULT_MODEL_HEIGHT,
                labels: vec![DEFAULT_LABEL.to_string()],
                proto_layout: ProtoLayout::ChannelFirst,
            },
            detection: DetectionSettings {
                probability_threshold: DEFAULT_PROBABILITY_THRESHOLD,
                iou_threshold: DEFAULT_IOU_THRESHOLD,
                max_detections: DEFAULT_MAX_DETECTIONS,
                intersect_threshold: DEFAULT_INTERSECT_THRESHOLD,
                mask_threshold: DEFAULT_MASK_THRESHOLD,
                segment: true,
                source: SegmentationSource::Instance,
            },
            capture: CaptureSettings {
                motion_threshold: DEFAULT_MOTION_THRESHOLD,
                motion_pixel_delta: DEFAULT_MOTION_PIXEL_DELTA,
                sharpness_threshold: DEFAULT_SHARPNESS_THRESHOLD,
                motion_interval: DEFAULT_MOTION_INTERVAL,
            },
        }
    }
}

impl LocatorConfig {
    /// Defaults, then the file named by `DOCLOC_CONFIG`, then `DOCLOC_*` overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DOCLOC_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read one config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LocatorConfigFile) -> Self {
        let defaults = Self::default();
        let model = file.model.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        Self {
            model: ModelSettings {
                path: model.path,
                width: model.width.unwrap_or(defaults.model.width),
                height: model.height.unwrap_or(defaults.model.height),
                labels: model.labels.unwrap_or(defaults.model.labels),
                proto_layout: model.proto_layout.unwrap_or(defaults.model.proto_layout),
            },
            detection: DetectionSettings {
                probability_threshold: detection
                    .probability_threshold
                    .unwrap_or(defaults.detection.probability_threshold),
                iou_threshold: detection
                    .iou_threshold
                    .unwrap_or(defaults.detection.iou_threshold),
                max_detections: detection
                    .max_detections
                    .unwrap_or(defaults.detection.max_detections),
                intersect_threshold: detection
                    .intersect_threshold
                    .unwrap_or(defaults.detection.intersect_threshold),
                mask_threshold: detection
                    .mask_threshold
                    .unwrap_or(defaults.detection.mask_threshold),
                segment: detection.segment.unwrap_or(defaults.detection.segment),
                source: detection.source.unwrap_or(defaults.detection.source),
            },
            capture: CaptureSettings {
                motion_threshold: capture
                    .motion_threshold
                    .unwrap_or(defaults.capture.motion_threshold),
                motion_pixel_delta: capture
                    .motion_pixel_delta
                    .unwrap_or(defaults.capture.motion_pixel_delta),
                sharpness_threshold: capture
                    .sharpness_threshold
                    .unwrap_or(defaults.capture.sharpness_threshold),
                motion_interval: capture
                    .motion_interval
                    .unwrap_or(defaults.capture.motion_interval),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("DOCLOC_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = Some(PathBuf::from(path));
            }
        }
        if let Some(width) = env_number("DOCLOC_MODEL_WIDTH")? {
            self.model.width = width;
        }
        if let Some(height) = env_number("DOCLOC_MODEL_HEIGHT")? {
            self.model.height = height;
        }
        if let Ok(labels) = std::env::var("DOCLOC_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.model.labels = parsed;
            }
        }
        if let Ok(layout) = std::env::var("DOCLOC_PROTO_LAYOUT") {
            if !layout.trim().is_empty() {
                self.model.proto_layout = layout
                    .parse()
                    .map_err(|e| anyhow!("DOCLOC_PROTO_LAYOUT: {}", e))?;
            }
        }
        if let Some(value) = env_number("DOCLOC_PROBABILITY_THRESHOLD")? {
            self.detection.probability_threshold = value;
        }
        if let Some(value) = env_number("DOCLOC_IOU_THRESHOLD")? {
            self.detection.iou_threshold = value;
        }
        if let Some(value) = env_number("DOCLOC_MAX_DETECTIONS")? {
            self.detection.max_detections = value;
        }
        if let Some(value) = env_number("DOCLOC_INTERSECT_THRESHOLD")? {
            self.detection.intersect_threshold = value;
        }
        if let Some(value) = env_number("DOCLOC_MOTION_THRESHOLD")? {
            self.capture.motion_threshold = value;
        }
        if let Some(value) = env_number("DOCLOC_SHARPNESS_THRESHOLD")? {
            self.capture.sharpness_threshold = value;
        }
        if let Some(value) = env_number("DOCLOC_MOTION_INTERVAL")? {
            self.capture.motion_interval = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.width == 0 || self.model.height == 0 {
            return Err(anyhow!(
                "model input must be at least 1x1, got {}x{}",
                self.model.width,
                self.model.height
            ));
        }
        if self.model.labels.is_empty() {
            return Err(anyhow!("label table must not be empty"));
        }
        for (name, value) in [
            ("probability_threshold", self.detection.probability_threshold),
            ("iou_threshold", self.detection.iou_threshold),
            ("intersect_threshold", self.detection.intersect_threshold),
            ("mask_threshold", self.detection.mask_threshold),
            ("motion_threshold", self.capture.motion_threshold),
            ("sharpness_threshold", self.capture.sharpness_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be within 0..=1, got {}", name, value));
            }
        }
        if self.detection.max_detections == 0 {
            return Err(anyhow!("max_detections must be greater than zero"));
        }
        if self.capture.motion_interval == 0 {
            return Err(anyhow!("motion_interval must be at least 1"));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got {:?}", key, raw)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<LocatorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

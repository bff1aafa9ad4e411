//! Frame buffers and model input preprocessing.
//!
//! - `FrameSample`: validated RGB frame. Pixel bytes are private; only the
//!   quality metrics and letterbox preprocessing read them.
//! - `ModelInput`: planar `[1, 3, H, W]` float tensor handed to a backend.
//! - `letterbox`: pads a frame to a square, resizes it to the model input and
//!   records how to map model coordinates back onto the real frame.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::geometry::CoordinateMapping;

/// Pixel layouts accepted from the acquisition layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Rgba32,
    /// Full-resolution Y plane followed by interleaved, half-resolution UV.
    Nv12,
}

/// One camera frame or still image, normalized to packed RGB.
#[derive(Clone)]
pub struct FrameSample {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl FrameSample {
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self> {
        let expected = packed_len(width, height, 3)?;
        if rgb.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                rgb.len()
            ));
        }
        Ok(Self { width, height, rgb })
    }

    /// Drops the alpha channel.
    pub fn from_rgba(width: u32, height: u32, rgba: &[u8]) -> Result<Self> {
        let expected = packed_len(width, height, 4)?;
        if rgba.len() != expected {
            return Err(anyhow!(
                "RGBA frame length mismatch: expected {}, got {}",
                expected,
                rgba.len()
            ));
        }
        let rgb = rgba
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        Ok(Self { width, height, rgb })
    }

    pub fn from_nv12(width: u32, height: u32, nv12: &[u8]) -> Result<Self> {
        let rgb = nv12_to_rgb(nv12, width, height)?;
        Ok(Self { width, height, rgb })
    }

    pub fn from_pixels(
        format: PixelFormat,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self> {
        match format {
            PixelFormat::Rgb24 => Self::from_rgb(width, height, pixels.to_vec()),
            PixelFormat::Rgba32 => Self::from_rgba(width, height, pixels),
            PixelFormat::Nv12 => Self::from_nv12(width, height, pixels),
        }
    }

    /// Decode a PNG or JPEG file.
    pub fn from_image_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let image =
            image::open(path).with_context(|| format!("decode image {}", path.display()))?;
        let rgb = image.into_rgb8();
        let (width, height) = rgb.dimensions();
        Self::from_rgb(width, height, rgb.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub(crate) fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    pub(crate) fn same_size(&self, other: &FrameSample) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Planar `[1, 3, height, width]` model input with values in `0..=1`.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelInput {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl ModelInput {
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; 3 * width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Value of `channel` at `(x, y)`.
    pub fn at(&self, channel: usize, x: u32, y: u32) -> f32 {
        let plane = self.width as usize * self.height as usize;
        self.data[channel * plane + y as usize * self.width as usize + x as usize]
    }
}

/// Pad `sample` to a square with black on the right and bottom, resize it to
/// `model_width x model_height` and scale values to `0..=1`.
///
/// The returned mapping sends model coordinates to a frame of
/// `real_width x real_height`, which is usually the sample's own size but may
/// be the full-resolution frame a preview sample was scaled down from.
pub fn letterbox(
    sample: &FrameSample,
    model_width: u32,
    model_height: u32,
    real_width: u32,
    real_height: u32,
) -> Result<(ModelInput, CoordinateMapping)> {
    if model_width == 0 || model_height == 0 {
        return Err(anyhow!(
            "model input {}x{} has no pixels",
            model_width,
            model_height
        ));
    }
    if sample.width == 0 || sample.height == 0 {
        return Err(anyhow!(
            "frame {}x{} has no pixels",
            sample.width,
            sample.height
        ));
    }

    let side = sample.width.max(sample.height);
    let frame = RgbImage::from_raw(sample.width, sample.height, sample.rgb.clone())
        .ok_or_else(|| {
            anyhow!(
                "frame buffer does not fit {}x{}",
                sample.width,
                sample.height
            )
        })?;
    let mut canvas = RgbImage::new(side, side);
    imageops::overlay(&mut canvas, &frame, 0, 0);
    let resized = imageops::resize(&canvas, model_width, model_height, FilterType::Triangle);

    let plane = model_width as usize * model_height as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            data[c * plane + i] = pixel[c] as f32 / 255.0;
        }
    }

    let mapping = CoordinateMapping {
        scale_x: real_width as f32 / model_width as f32,
        scale_y: real_height as f32 / model_height as f32,
        ratio_x: side as f32 / sample.width as f32,
        ratio_y: side as f32 / sample.height as f32,
    };
    let input = ModelInput {
        width: model_width,
        height: model_height,
        data,
    };
    Ok((input, mapping))
}

fn packed_len(width: u32, height: u32, channels: u32) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|v| v.checked_mul(channels))
        .map(|v| v as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = w
        .checked_mul(h)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    let expected = y_plane
        .checked_add(y_plane / 2)
        .ok_or_else(|| anyhow!("NV12 frame dimensions overflow"))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "NV12 frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }

    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;

            let offset = (j * w + i) * 3;
            rgb[offset] = clamp_to_u8(y + 1.402 * v);
            rgb[offset + 1] = clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v);
            rgb[offset + 2] = clamp_to_u8(y + 1.772 * u);
        }
    }
    Ok(rgb)
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

use crate::config::{Framing, PadMode, PreprocessConfig};
use crate::error::{ClassifyError, Result};
use crate::models::{PixelFormat, PreprocessedTensor, RawImage, TensorShape};

/// Turns raw bitmaps into the fixed-size tensor the model expects.
///
/// The target shape is fixed at construction. Each call runs four pure steps:
/// format adaptation to RGBA8, framing to a square, bilinear resize to the
/// model size, and scaling of every channel from `[0, 255]` to `[0, 1]`.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target: TensorShape,
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(target: TensorShape, config: PreprocessConfig) -> Result<Self> {
        if target.height == 0 || target.width == 0 {
            return Err(ClassifyError::ModelLoad(format!(
                "model input {} has an empty spatial dimension",
                target
            )));
        }
        if !matches!(target.channels, 1 | 3 | 4) {
            return Err(ClassifyError::ModelLoad(format!(
                "model input {} has {} channels, expected 1, 3 or 4",
                target, target.channels
            )));
        }
        Ok(Self { target, config })
    }

    pub fn target(&self) -> TensorShape {
        self.target
    }

    pub fn preprocess(&self, image: &RawImage) -> Result<PreprocessedTensor> {
        let framed = self.frame(image)?;
        self.tensor_from_frame(&framed)
    }

    /// Steps 3 and 4 applied to the output of [`Preprocessor::frame`].
    pub fn tensor_from_frame(&self, framed: &RgbaImage) -> Result<PreprocessedTensor> {
        let resized = self.resize(framed)?;
        self.to_tensor(resized)
    }

    /// Steps 1 and 2: the RGBA image after framing, before the final resize.
    pub fn frame(&self, image: &RawImage) -> Result<RgbaImage> {
        let rgba = to_rgba8(image)?;
        let side = self.target.square_side() as u32;

        let framed = match self.config.framing {
            Framing::CenterCropOrPad => crop_or_pad(&rgba, side, side, self.config.pad),
            Framing::Letterbox => {
                let (w, h) = rgba.dimensions();
                let scale = side as f32 / w.max(h) as f32;
                let scaled_w = ((w as f32 * scale).round() as u32).clamp(1, side);
                let scaled_h = ((h as f32 * scale).round() as u32).clamp(1, side);
                let scaled = imageops::resize(&rgba, scaled_w, scaled_h, FilterType::Triangle);
                crop_or_pad(&scaled, side, side, self.config.pad)
            }
            Framing::Stretch => rgba,
        };

        Ok(framed)
    }

    fn resize(&self, framed: &RgbaImage) -> Result<RgbaImage> {
        let (width, height) = (self.target.width as u32, self.target.height as u32);

        let resized = if framed.dimensions() == (width, height) {
            framed.clone()
        } else {
            // Triangle is the bilinear filter
            imageops::resize(framed, width, height, FilterType::Triangle)
        };

        if resized.dimensions() != (width, height) {
            return Err(ClassifyError::InternalShape(format!(
                "resize produced {:?}, expected {}x{}",
                resized.dimensions(),
                width,
                height
            )));
        }
        Ok(resized)
    }

    fn to_tensor(&self, resized: RgbaImage) -> Result<PreprocessedTensor> {
        let data: Vec<f32> = match self.target.channels {
            1 => DynamicImage::ImageRgba8(resized)
                .to_luma8()
                .into_raw()
                .into_iter()
                .map(normalize)
                .collect(),
            3 => resized
                .pixels()
                .flat_map(|p| [p[0], p[1], p[2]])
                .map(normalize)
                .collect(),
            _ => resized.into_raw().into_iter().map(normalize).collect(),
        };
        PreprocessedTensor::new(self.target, data)
    }
}

/// Offset of the target window in source coordinates; negative means padding.
fn window_offset(src: u32, target: u32) -> i64 {
    if src >= target {
        ((src - target) / 2) as i64
    } else {
        -(((target - src) / 2) as i64)
    }
}

fn normalize(value: u8) -> f32 {
    value as f32 / 255.0
}

/// Step 1: bring any supported source layout to interleaved RGBA8.
pub fn to_rgba8(image: &RawImage) -> Result<RgbaImage> {
    if image.is_empty() {
        return Err(ClassifyError::InvalidImage(format!(
            "zero-area image {}x{}",
            image.width(),
            image.height()
        )));
    }

    let src = image.pixels();
    let rgba: Vec<u8> = match image.format() {
        PixelFormat::Rgba8 => src.to_vec(),
        PixelFormat::Bgra8 => src
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect(),
        PixelFormat::Rgb8 => src
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        PixelFormat::Luma8 => src.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        PixelFormat::Rgb565 => src
            .chunks_exact(2)
            .flat_map(|p| {
                let v = u16::from_le_bytes([p[0], p[1]]);
                let r = ((v >> 11) & 0x1f) as u8;
                let g = ((v >> 5) & 0x3f) as u8;
                let b = (v & 0x1f) as u8;
                [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
            })
            .collect(),
        format @ (PixelFormat::Alpha8 | PixelFormat::RgbaF16) => {
            return Err(ClassifyError::UnsupportedFormat(format));
        }
    };

    RgbaImage::from_raw(image.width(), image.height(), rgba).ok_or_else(|| {
        ClassifyError::InternalShape("converted buffer does not match image size".into())
    })
}

/// Step 2: centre-crop each axis that is too long and pad each axis that is
/// too short, so the result is exactly `width` x `height`.
pub fn crop_or_pad(img: &RgbaImage, width: u32, height: u32, pad: PadMode) -> RgbaImage {
    let (src_w, src_h) = img.dimensions();
    if (src_w, src_h) == (width, height) {
        return img.clone();
    }

    let off_x = window_offset(src_w, width);
    let off_y = window_offset(src_h, height);

    if off_x >= 0 && off_y >= 0 {
        return imageops::crop_imm(img, off_x as u32, off_y as u32, width, height).to_image();
    }

    RgbaImage::from_fn(width, height, |x, y| {
        let sx = x as i64 + off_x;
        let sy = y as i64 + off_y;
        let inside = (0..src_w as i64).contains(&sx) && (0..src_h as i64).contains(&sy);
        match (inside, pad) {
            (true, _) => *img.get_pixel(sx as u32, sy as u32),
            (false, PadMode::Zero) => Rgba([0, 0, 0, 0]),
            (false, PadMode::Replicate) => *img.get_pixel(
                sx.clamp(0, src_w as i64 - 1) as u32,
                sy.clamp(0, src_h as i64 - 1) as u32,
            ),
        }
    })
}

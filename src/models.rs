use std::fmt;

use image::{DynamicImage, RgbaImage};

use crate::error::{ClassifyError, Result};

/// Pixel layouts an image source may hand over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved 8-bit RGBA, the layout the preprocessor works in.
    Rgba8,
    Bgra8,
    Rgb8,
    Luma8,
    /// Packed 16-bit little-endian 5-6-5 RGB.
    Rgb565,
    /// Alpha mask only, no colour information.
    Alpha8,
    /// Half-float RGBA.
    RgbaF16,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Luma8 | PixelFormat::Alpha8 => 1,
            PixelFormat::Rgb565 => 2,
            PixelFormat::RgbaF16 => 8,
        }
    }
}

/// A decoded bitmap supplied by the image source.
#[derive(Debug, Clone)]
pub struct RawImage {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl RawImage {
    /// Wrap a pixel buffer. The buffer length must match the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(ClassifyError::InvalidImage(format!(
                "{}x{} {:?} image needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    pub fn from_rgba8(img: RgbaImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            pixels: img.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<DynamicImage> for RawImage {
    fn from(img: DynamicImage) -> Self {
        RawImage::from_rgba8(img.to_rgba8())
    }
}

/// `[H, W, C]` dimensions of a model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl TensorShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    pub fn len(&self) -> usize {
        self.height * self.width * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Side of the square the image is framed to before resizing.
    pub fn square_side(&self) -> usize {
        self.height.min(self.width)
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.height, self.width, self.channels)
    }
}

/// Model-ready input: row-major `[H, W, C]` floats in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedTensor {
    shape: TensorShape,
    data: Vec<f32>,
}

impl PreprocessedTensor {
    pub fn new(shape: TensorShape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(ClassifyError::InternalShape(format!(
                "{} values for shape {}",
                data.len(),
                shape
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at `(y, x, c)`, or `None` when any coordinate is out of range.
    pub fn get(&self, y: usize, x: usize, c: usize) -> Option<f32> {
        let TensorShape {
            height,
            width,
            channels,
        } = self.shape;
        if y >= height || x >= width || c >= channels {
            return None;
        }
        Some(self.at(y, x, c))
    }

    /// Unchecked variant of [`PreprocessedTensor::get`] for in-range loops.
    pub(crate) fn at(&self, y: usize, x: usize, c: usize) -> f32 {
        self.data[(y * self.shape.width + x) * self.shape.channels + c]
    }
}

/// One ranked entry: display label and its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

/// Classifications ordered by descending confidence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassificationResult {
    entries: Vec<Classification>,
}

impl ClassificationResult {
    pub(crate) fn from_sorted(entries: Vec<Classification>) -> Self {
        Self { entries }
    }

    pub fn top(&self) -> Option<&Classification> {
        self.entries.first()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Classification> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Classification] {
        &self.entries
    }

    pub fn confidence_sum(&self) -> f32 {
        self.entries.iter().map(|c| c.confidence).sum()
    }
}

impl<'a> IntoIterator for &'a ClassificationResult {
    type Item = &'a Classification;
    type IntoIter = std::slice::Iter<'a, Classification>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Identifies one classification request. Later requests compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(pub(crate) u64);

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// How a non-square image is brought to a square before resizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Crop or pad each axis around the centre to the model's shorter side.
    #[default]
    CenterCropOrPad,
    /// Scale the whole image to fit inside the square, padding the remainder.
    Letterbox,
    /// Resize straight to the model size, ignoring aspect ratio.
    Stretch,
}

/// Fill used where framing extends past the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadMode {
    #[default]
    Zero,
    /// Repeat the nearest border pixel.
    Replicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub framing: Framing,
    pub pad: PadMode,
}

/// Classifier settings, usually read from a TOML file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub preprocess: PreprocessConfig,
    /// Apply softmax to raw outputs (for models that emit logits).
    pub apply_softmax: bool,
    /// Write the framed input of each classification here as PNG.
    pub debug_dir: Option<PathBuf>,
}

impl ClassifierConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("Failed to parse classifier config")
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_toml_str(&text)
    }
}

use thiserror::Error;

use crate::models::{PixelFormat, TensorShape};

/// Errors produced while building or running the classifier.
///
/// Variants fall into three groups: initialization-fatal asset problems
/// (`ModelLoad`, `LabelAsset`, `LabelCountMismatch`), per-request failures
/// that leave the classifier usable, and internal invariant violations.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("invalid label asset: {0}")]
    LabelAsset(String),

    #[error("label count mismatch: {labels} labels for {outputs} model outputs")]
    LabelCountMismatch { labels: usize, outputs: usize },

    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("tensor shape {actual} does not match model input {expected}")]
    ShapeMismatch {
        expected: TensorShape,
        actual: TensorShape,
    },

    #[error("internal shape error: {0}")]
    InternalShape(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("inference failed: {0}")]
    Runtime(String),

    #[error("io")]
    Io(#[from] std::io::Error),

    #[error("image")]
    Image(#[from] image::ImageError),
}

impl ClassifyError {
    /// Asset corruption or mismatch; the classifier cannot be constructed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClassifyError::ModelLoad(_)
                | ClassifyError::LabelAsset(_)
                | ClassifyError::LabelCountMismatch { .. }
        )
    }

    /// Failures scoped to a single request. A new `submit` may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClassifyError::UnsupportedFormat(_)
                | ClassifyError::InvalidImage(_)
                | ClassifyError::ShapeMismatch { .. }
                | ClassifyError::Runtime(_)
                | ClassifyError::Io(_)
                | ClassifyError::Image(_)
        )
    }
}

pub type Result<T, E = ClassifyError> = std::result::Result<T, E>;

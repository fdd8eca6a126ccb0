mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from babyface for tests
pub use babyface::{
    ClassificationResult, ClassificationState, Classifier, ClassifierConfig, ClassifyError,
    Coordinator, PixelFormat, RawImage, RequestToken,
};

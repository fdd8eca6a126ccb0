pub mod classification;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod labels;
pub mod models;
pub mod runtime;

pub use classification::{Classifier, Preprocessor};
pub use config::{ClassifierConfig, Framing, PadMode, PreprocessConfig};
pub use coordinator::{ClassificationState, Coordinator};
pub use error::ClassifyError;
pub use labels::{LabelCatalog, format_label};
pub use models::{
    Classification, ClassificationResult, PixelFormat, PreprocessedTensor, RawImage,
    RequestToken, TensorShape,
};
pub use runtime::{InferenceBackend, InputLayout, ModelRuntime, OutputShape, RtenBackend};

/// Install a `tracing` subscriber filtered by `RUST_LOG`, or `default_level` when unset.
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

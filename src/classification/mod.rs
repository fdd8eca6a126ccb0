pub mod preprocessing;
pub mod ranking;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use image::RgbaImage;

use crate::config::ClassifierConfig;
use crate::error::{ClassifyError, Result};
use crate::labels::LabelCatalog;
use crate::models::{ClassificationResult, RawImage};
use crate::runtime::ModelRuntime;

pub use preprocessing::Preprocessor;
pub use ranking::{rank, softmax};

/// Synchronous classification pipeline: preprocess, run, rank.
///
/// Construction fails on any asset problem, so a `Classifier` that exists is
/// always backed by a model and label set that agree with each other.
#[derive(Debug)]
pub struct Classifier {
    runtime: ModelRuntime,
    labels: LabelCatalog,
    preprocessor: Preprocessor,
    config: ClassifierConfig,
    dumped: AtomicUsize,
}

impl Classifier {
    /// Build from the raw model and label assets.
    pub fn new(model_bytes: Vec<u8>, label_bytes: &[u8], config: ClassifierConfig) -> Result<Self> {
        let labels = LabelCatalog::from_bytes(label_bytes)?;
        let runtime = ModelRuntime::load(model_bytes, labels.len())?;
        Self::from_parts(runtime, labels, config)
    }

    pub fn from_parts(
        runtime: ModelRuntime,
        labels: LabelCatalog,
        config: ClassifierConfig,
    ) -> Result<Self> {
        let outputs = runtime.output_shape().channels;
        if outputs != labels.len() {
            return Err(ClassifyError::LabelCountMismatch {
                labels: labels.len(),
                outputs,
            });
        }

        let preprocessor = Preprocessor::new(runtime.input_shape(), config.preprocess)?;

        if let Some(dir) = &config.debug_dir {
            std::fs::create_dir_all(dir)?;
        }

        Ok(Self {
            runtime,
            labels,
            preprocessor,
            config,
            dumped: AtomicUsize::new(0),
        })
    }

    pub fn labels(&self) -> &LabelCatalog {
        &self.labels
    }

    pub fn runtime(&self) -> &ModelRuntime {
        &self.runtime
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Classify one image. Blocks for the duration of inference.
    pub fn classify(&self, image: &RawImage) -> Result<ClassificationResult> {
        let start = Instant::now();

        let framed = self.preprocessor.frame(image)?;
        self.dump_frame(&framed)?;
        let tensor = self.preprocessor.tensor_from_frame(&framed)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            tensor = %tensor.shape(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "preprocessed"
        );

        let inference_start = Instant::now();
        let mut raw = self.runtime.run(&tensor)?;
        tracing::debug!(
            elapsed_ms = inference_start.elapsed().as_millis() as u64,
            "inference done"
        );

        if self.config.apply_softmax {
            softmax(&mut raw);
        }

        let result = rank(&self.labels, &raw)?;
        if let Some(top) = result.top() {
            tracing::debug!(
                label = %top.label,
                confidence = top.confidence,
                total_ms = start.elapsed().as_millis() as u64,
                "classified"
            );
        }
        Ok(result)
    }

    fn dump_frame(&self, framed: &RgbaImage) -> Result<()> {
        let Some(dir) = &self.config.debug_dir else {
            return Ok(());
        };

        let index = self.dumped.fetch_add(1, Ordering::Relaxed) + 1;
        let path: PathBuf = dir.join(format!("{:02}_framed.png", index));
        framed.save(&path)?;
        tracing::debug!(path = %path.display(), "saved framed input");
        Ok(())
    }
}

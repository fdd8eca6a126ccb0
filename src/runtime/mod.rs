mod rten_backend;

use std::sync::Mutex;

pub use rten_backend::{InputLayout, RtenBackend};

use crate::error::{ClassifyError, Result};
use crate::models::{PreprocessedTensor, TensorShape};

/// An inference engine able to evaluate one loaded model.
pub trait InferenceBackend: Send + Sync {
    /// `[H, W, C]` of the single input, excluding any batch dimension.
    fn input_shape(&self) -> TensorShape;

    /// Number of values produced per inference.
    fn output_channels(&self) -> usize;

    /// Evaluate the model on an input already checked against `input_shape`.
    fn run(&self, input: &PreprocessedTensor) -> Result<Vec<f32>>;

    /// Whether `run` may be called from several threads at once.
    fn supports_concurrent_run(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputShape {
    pub channels: usize,
}

/// Owns a loaded model for the life of the process.
///
/// Shapes are fixed at load time. `run` may be called concurrently: backends
/// that cannot evaluate in parallel are serialised through an internal lock,
/// so callers never coordinate access themselves.
pub struct ModelRuntime {
    backend: Box<dyn InferenceBackend>,
    run_lock: Option<Mutex<()>>,
}

impl std::fmt::Debug for ModelRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRuntime")
            .field("input_shape", &self.input_shape())
            .field("output_shape", &self.output_shape())
            .field("serialized", &self.run_lock.is_some())
            .finish()
    }
}

impl ModelRuntime {
    /// Load a serialized rten model and check it produces one value per label.
    pub fn load(model_bytes: Vec<u8>, expected_label_count: usize) -> Result<Self> {
        let backend = RtenBackend::load(model_bytes)?;
        Self::with_backend(backend, expected_label_count)
    }

    pub fn with_backend<B>(backend: B, expected_label_count: usize) -> Result<Self>
    where
        B: InferenceBackend + 'static,
    {
        let outputs = backend.output_channels();
        if outputs != expected_label_count {
            return Err(ClassifyError::LabelCountMismatch {
                labels: expected_label_count,
                outputs,
            });
        }

        let run_lock = (!backend.supports_concurrent_run()).then(|| Mutex::new(()));

        tracing::info!(
            input = %backend.input_shape(),
            outputs,
            serialized = run_lock.is_some(),
            "model runtime ready"
        );

        Ok(Self {
            backend: Box::new(backend),
            run_lock,
        })
    }

    pub fn input_shape(&self) -> TensorShape {
        self.backend.input_shape()
    }

    pub fn output_shape(&self) -> OutputShape {
        OutputShape {
            channels: self.backend.output_channels(),
        }
    }

    /// Run one inference. The tensor must match `input_shape` exactly.
    ///
    /// Output containing NaN or an infinity is a `Runtime` error.
    pub fn run(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
        let expected = self.input_shape();
        if input.shape() != expected {
            return Err(ClassifyError::ShapeMismatch {
                expected,
                actual: input.shape(),
            });
        }

        let output = match &self.run_lock {
            Some(lock) => {
                // The lock guards no data, so a poisoned lock is still usable
                let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
                self.backend.run(input)?
            }
            None => self.backend.run(input)?,
        };

        let channels = self.output_shape().channels;
        if output.len() != channels {
            return Err(ClassifyError::Runtime(format!(
                "model produced {} values, expected {}",
                output.len(),
                channels
            )));
        }
        if let Some(index) = output.iter().position(|v| !v.is_finite()) {
            return Err(ClassifyError::Runtime(format!(
                "model produced {} at output {}",
                output[index], index
            )));
        }
        Ok(output)
    }
}

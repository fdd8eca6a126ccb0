use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use babyface::{
    Classifier, ClassifierConfig, ClassifyError, InferenceBackend, LabelCatalog, ModelRuntime,
    PreprocessedTensor, RawImage, TensorShape,
};
use image::{Rgba, RgbaImage};

pub const LABELS: &str = "0 baby\n1 10대\n2 20대\n3 30대\n";
pub const INPUT: TensorShape = TensorShape {
    height: 4,
    width: 4,
    channels: 3,
};

pub const RED: [u8; 3] = [255, 0, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const GREY: [u8; 3] = [128, 128, 128];
/// Red channel value that makes [`ScriptedBackend`] panic.
pub const POISON: [u8; 3] = [13, 0, 0];

/// Solid-colour 8x8 image; the 4x4 centre crop keeps the colour exact.
pub fn solid(rgb: [u8; 3]) -> RawImage {
    RawImage::from_rgba8(RgbaImage::from_pixel(8, 8, Rgba([rgb[0], rgb[1], rgb[2], 255])))
}

/// Red byte of the top-left input pixel, used to tell requests apart.
pub fn key_of(input: &PreprocessedTensor) -> u8 {
    (input.data()[0] * 255.0).round() as u8
}

/// Deterministic stand-in model.
///
/// With `p` the mean red intensity, it outputs
/// `[p / 2, (1 - p) / 2, 0.25, 0.25]`, a distribution that sums to 1.
#[derive(Default)]
pub struct ScriptedBackend {
    gates: Mutex<HashMap<u8, Receiver<()>>>,
}

impl ScriptedBackend {
    /// Requests whose key is in `keys` block in `run` until released.
    pub fn gated(keys: &[u8]) -> (Self, Gates) {
        let mut receivers = HashMap::new();
        let mut senders = HashMap::new();
        for &key in keys {
            let (tx, rx) = mpsc::channel();
            receivers.insert(key, rx);
            senders.insert(key, tx);
        }
        (
            Self {
                gates: Mutex::new(receivers),
            },
            Gates { senders },
        )
    }
}

impl InferenceBackend for ScriptedBackend {
    fn input_shape(&self) -> TensorShape {
        INPUT
    }

    fn output_channels(&self) -> usize {
        4
    }

    fn run(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, ClassifyError> {
        let key = key_of(input);
        if key == POISON[0] {
            panic!("scripted backend poisoned");
        }

        let gate = self.gates.lock().unwrap().remove(&key);
        if let Some(gate) = gate {
            gate.recv().unwrap();
        }

        let reds: Vec<f32> = input.data().chunks(3).map(|p| p[0]).collect();
        let p = reds.iter().sum::<f32>() / reds.len() as f32;
        Ok(vec![p / 2.0, (1.0 - p) / 2.0, 0.25, 0.25])
    }
}

/// Release handles for gated requests.
pub struct Gates {
    senders: HashMap<u8, Sender<()>>,
}

impl Gates {
    pub fn release(&self, rgb: [u8; 3]) {
        self.senders[&rgb[0]].send(()).unwrap();
    }
}

/// Model that returns the same four values for every input.
pub struct ConstantBackend(pub [f32; 4]);

impl InferenceBackend for ConstantBackend {
    fn input_shape(&self) -> TensorShape {
        INPUT
    }

    fn output_channels(&self) -> usize {
        4
    }

    fn run(&self, _input: &PreprocessedTensor) -> Result<Vec<f32>, ClassifyError> {
        Ok(self.0.to_vec())
    }
}

pub fn make_classifier<B>(backend: B, config: ClassifierConfig) -> Classifier
where
    B: InferenceBackend + 'static,
{
    let labels = LabelCatalog::from_bytes(LABELS.as_bytes()).expect("Failed to parse labels");
    let runtime =
        ModelRuntime::with_backend(backend, labels.len()).expect("Failed to build runtime");
    Classifier::from_parts(runtime, labels, config).expect("Failed to build classifier")
}

/// Bytes of a model under `tests/models/`.
pub fn model_bytes(name: &str) -> Vec<u8> {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/models")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
}

pub fn shared_classifier(backend: ScriptedBackend) -> Arc<Classifier> {
    Arc::new(make_classifier(backend, ClassifierConfig::default()))
}

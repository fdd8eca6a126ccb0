use rten::{Dimension, Model, NodeId};
use rten_tensor::NdTensor;
use rten_tensor::prelude::*;

use super::InferenceBackend;
use crate::error::{ClassifyError, Result};
use crate::models::{PreprocessedTensor, TensorShape};

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// `[H, W, C]` with no batch axis.
    Hwc,
    /// `[1, H, W, C]`, the usual layout of converted TFLite models.
    Nhwc,
    /// `[1, C, H, W]`, the usual layout of ONNX exports.
    Nchw,
}

/// rten inference engine.
///
/// rten evaluates through `&Model` and the model is `Sync`, so concurrent
/// `run` calls share one loaded model without locking.
pub struct RtenBackend {
    model: Model,
    input_id: NodeId,
    output_id: NodeId,
    layout: InputLayout,
    input_shape: TensorShape,
    output_channels: usize,
}

impl RtenBackend {
    /// Parse a serialized model held fully in memory.
    pub fn load(model_bytes: Vec<u8>) -> Result<Self> {
        let model =
            Model::load(model_bytes).map_err(|e| ClassifyError::ModelLoad(e.to_string()))?;

        let input_id = single_node(model.input_ids(), "input")?;
        let output_id = single_node(model.output_ids(), "output")?;

        let input_dims = model
            .node_info(input_id)
            .and_then(|info| info.shape())
            .ok_or_else(|| ClassifyError::ModelLoad("model input has no declared shape".into()))?;
        let (layout, input_shape) = parse_input_dims(&input_dims)?;

        let mut backend = Self {
            model,
            input_id,
            output_id,
            layout,
            input_shape,
            output_channels: 0,
        };

        let declared = backend
            .model
            .node_info(output_id)
            .and_then(|info| info.shape())
            .and_then(|dims| parse_output_dims(&dims));
        backend.output_channels = match declared {
            Some(channels) => channels,
            None => {
                // Output shape is not stored in the model; evaluate once to learn it.
                let zeros = PreprocessedTensor::new(input_shape, vec![0.0; input_shape.len()])?;
                backend
                    .run(&zeros)
                    .map_err(|e| ClassifyError::ModelLoad(format!("trial run failed: {}", e)))?
                    .len()
            }
        };

        tracing::debug!(
            ?layout,
            input = %input_shape,
            outputs = backend.output_channels,
            "rten model loaded"
        );
        Ok(backend)
    }

    pub fn layout(&self) -> InputLayout {
        self.layout
    }
}

impl InferenceBackend for RtenBackend {
    fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    fn output_channels(&self) -> usize {
        self.output_channels
    }

    fn run(&self, input: &PreprocessedTensor) -> Result<Vec<f32>> {
        let TensorShape {
            height: h,
            width: w,
            channels: c,
        } = input.shape();

        let tensor = match self.layout {
            InputLayout::Hwc => NdTensor::from_data([h, w, c], input.data().to_vec()).into_dyn(),
            InputLayout::Nhwc => {
                NdTensor::from_data([1, h, w, c], input.data().to_vec()).into_dyn()
            }
            InputLayout::Nchw => NdTensor::from_data([1, c, h, w], hwc_to_chw(input)).into_dyn(),
        };

        let mut outputs = self
            .model
            .run(
                vec![(self.input_id, tensor.view().into())],
                &[self.output_id],
                None,
            )
            .map_err(|e| ClassifyError::Runtime(e.to_string()))?;

        let output: rten_tensor::Tensor<f32> = outputs
            .remove(0)
            .try_into()
            .map_err(|e| ClassifyError::Runtime(format!("unexpected output type: {}", e)))?;
        Ok(output.to_vec())
    }
}

fn single_node(ids: &[NodeId], kind: &str) -> Result<NodeId> {
    match ids {
        [id] => Ok(*id),
        _ => Err(ClassifyError::ModelLoad(format!(
            "expected exactly one {}, model has {}",
            kind,
            ids.len()
        ))),
    }
}

fn fixed(dim: &Dimension) -> Option<usize> {
    match dim {
        Dimension::Fixed(size) => Some(*size),
        Dimension::Symbolic(_) => None,
    }
}

/// A batch axis must be 1 or symbolic; we always feed a single image.
fn is_single_batch(dim: &Dimension) -> bool {
    fixed(dim).is_none_or(|size| size == 1)
}

pub(crate) fn parse_input_dims(dims: &[Dimension]) -> Result<(InputLayout, TensorShape)> {
    let spatial = |d: &[Dimension]| -> Result<Vec<usize>> {
        d.iter()
            .map(|dim| {
                fixed(dim).ok_or_else(|| {
                    ClassifyError::ModelLoad(format!("input dimension {:?} is not fixed", dim))
                })
            })
            .collect()
    };
    let is_channels = |n: usize| matches!(n, 1 | 3 | 4);

    match dims {
        [_, _, _] => {
            let s = spatial(dims)?;
            Ok((InputLayout::Hwc, TensorShape::new(s[0], s[1], s[2])))
        }
        [batch, _, _, _] if is_single_batch(batch) => {
            let s = spatial(&dims[1..])?;
            let nchw = TensorShape::new(s[1], s[2], s[0]);
            let nhwc = TensorShape::new(s[0], s[1], s[2]);
            match (is_channels(s[0]), is_channels(s[2])) {
                (true, false) => Ok((InputLayout::Nchw, nchw)),
                (false, true) => Ok((InputLayout::Nhwc, nhwc)),
                // Both ends look like channels, e.g. [1, 3, 4, 4]. RGB wins.
                (true, true) if s[0] == 3 && s[2] != 3 => Ok((InputLayout::Nchw, nchw)),
                (true, true) if s[2] == 3 && s[0] != 3 => Ok((InputLayout::Nhwc, nhwc)),
                (true, true) => Err(ClassifyError::ModelLoad(format!(
                    "ambiguous channel axis in input {:?}",
                    s
                ))),
                (false, false) => Err(ClassifyError::ModelLoad(format!(
                    "cannot find the channel axis of input {:?}",
                    s
                ))),
            }
        }
        _ => Err(ClassifyError::ModelLoad(format!(
            "unsupported input shape {:?}",
            dims
        ))),
    }
}

/// Channel count from `[N]` or `[1, N]`. `None` when not statically known.
pub(crate) fn parse_output_dims(dims: &[Dimension]) -> Option<usize> {
    match dims {
        [n] => fixed(n),
        [batch, n] if is_single_batch(batch) => fixed(n),
        _ => None,
    }
}

fn hwc_to_chw(input: &PreprocessedTensor) -> Vec<f32> {
    let TensorShape {
        height,
        width,
        channels,
    } = input.shape();
    let mut out = Vec::with_capacity(input.data().len());
    for c in 0..channels {
        for y in 0..height {
            for x in 0..width {
                out.push(input.at(y, x, c));
            }
        }
    }
    out
}

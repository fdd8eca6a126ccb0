//! Integration tests that load real models through rten.
//!
//! Both models under `tests/models/` global-average-pool an NCHW RGB input
//! and flatten it, so they output the mean of each colour channel:
//! - `mean_rgb_8x8.onnx` declares `[1, 3, 8, 8]` in and `[1, 3]` out
//! - `mean_rgb_4x4_dynamic.onnx` declares `[batch, 3, 4, 4]` in and
//!   `[batch, classes]` out, so its output size is found by a trial run
//!
//! Tests cover:
//! - Loading, NCHW detection and output extraction
//! - Padding visible in the model output
//! - Label count checks against a real model
//! - A real model behind the coordinator

mod common;

use std::sync::Arc;

use babyface::{InputLayout, ModelRuntime, RtenBackend, TensorShape};
use common::*;
use image::{Rgba, RgbaImage};
use tokio::runtime::Handle;

const RGB_LABELS: &str = "0 red\n1 green\n2 blue\n";
const FIXED_MODEL: &str = "mean_rgb_8x8.onnx";
const DYNAMIC_MODEL: &str = "mean_rgb_4x4_dynamic.onnx";

fn load(name: &str) -> anyhow::Result<Classifier> {
    let classifier = Classifier::new(
        model_bytes(name),
        RGB_LABELS.as_bytes(),
        ClassifierConfig::default(),
    )?;
    Ok(classifier)
}

fn scores(result: &ClassificationResult) -> Vec<(&str, f32)> {
    result
        .iter()
        .map(|c| (c.label.as_str(), c.confidence))
        .collect()
}

fn assert_scores(result: &ClassificationResult, expected: &[(&str, f32)]) {
    let actual = scores(result);
    assert_eq!(actual.len(), expected.len(), "{:?}", actual);
    for ((label, confidence), (want_label, want)) in actual.iter().zip(expected) {
        assert_eq!(label, want_label, "{:?}", actual);
        assert!((confidence - want).abs() < 1e-3, "{:?}", actual);
    }
}

#[test]
fn test_backend_reads_declared_shapes() -> anyhow::Result<()> {
    let backend = RtenBackend::load(model_bytes(FIXED_MODEL))?;
    assert_eq!(backend.layout(), InputLayout::Nchw);

    let runtime = ModelRuntime::with_backend(backend, 3)?;
    assert_eq!(runtime.input_shape(), TensorShape::new(8, 8, 3));
    assert_eq!(runtime.output_shape().channels, 3);

    Ok(())
}

#[test]
fn test_backend_discovers_undeclared_output_size() -> anyhow::Result<()> {
    // [batch, 3, 4, 4] must not be mistaken for NHWC with 4 channels
    let backend = RtenBackend::load(model_bytes(DYNAMIC_MODEL))?;
    assert_eq!(backend.layout(), InputLayout::Nchw);

    let runtime = ModelRuntime::with_backend(backend, 3)?;
    assert_eq!(runtime.input_shape(), TensorShape::new(4, 4, 3));
    assert_eq!(runtime.output_shape().channels, 3);

    Ok(())
}

#[test]
fn test_classify_with_fixed_model() -> anyhow::Result<()> {
    let classifier = load(FIXED_MODEL)?;

    let result = classifier.classify(&solid([255, 0, 51]))?;
    assert_scores(&result, &[("red", 1.0), ("blue", 0.2), ("green", 0.0)]);

    let result = classifier.classify(&solid([0, 255, 0]))?;
    assert_eq!(result.top().map(|c| c.label.as_str()), Some("green"));

    Ok(())
}

#[test]
fn test_classify_with_dynamic_model() -> anyhow::Result<()> {
    let classifier = load(DYNAMIC_MODEL)?;
    assert_eq!(classifier.preprocessor().target(), TensorShape::new(4, 4, 3));

    let result = classifier.classify(&solid([255, 0, 51]))?;
    assert_scores(&result, &[("red", 1.0), ("blue", 0.2), ("green", 0.0)]);

    Ok(())
}

#[test]
fn test_padding_reaches_the_model() -> anyhow::Result<()> {
    let classifier = load(FIXED_MODEL)?;

    // 8x4 is padded to 8x8 with zero rows, halving every channel mean
    let wide = RawImage::from_rgba8(RgbaImage::from_pixel(8, 4, Rgba([255, 0, 51, 255])));
    let result = classifier.classify(&wide)?;
    assert_scores(&result, &[("red", 0.5), ("blue", 0.1), ("green", 0.0)]);

    Ok(())
}

#[test]
fn test_label_count_must_match_model() {
    let err = Classifier::new(
        model_bytes(FIXED_MODEL),
        LABELS.as_bytes(),
        ClassifierConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ClassifyError::LabelCountMismatch {
            labels: 4,
            outputs: 3
        }
    ));
    assert!(err.is_fatal());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_coordinator_with_real_model() -> anyhow::Result<()> {
    let coordinator = Coordinator::new(Arc::new(load(DYNAMIC_MODEL)?), Handle::current());

    coordinator.submit(solid([255, 0, 0]));
    coordinator.submit(solid([0, 0, 255]));
    coordinator.settle().await;

    let state = coordinator.state();
    let result = state.result().expect("latest request should be ready");
    assert_eq!(result.top().map(|c| c.label.as_str()), Some("blue"));

    coordinator.shutdown().await;
    Ok(())
}

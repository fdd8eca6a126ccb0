use crate::error::{ClassifyError, Result};
use crate::labels::{LabelCatalog, format_label};
use crate::models::{Classification, ClassificationResult};

/// Pair each output value with its label and order by descending confidence.
///
/// The sort is stable, so equal confidences keep label-index order and the
/// same input always ranks the same way.
pub fn rank(labels: &LabelCatalog, raw: &[f32]) -> Result<ClassificationResult> {
    if labels.len() != raw.len() {
        return Err(ClassifyError::LabelCountMismatch {
            labels: labels.len(),
            outputs: raw.len(),
        });
    }

    let mut entries: Vec<Classification> = labels
        .iter()
        .zip(raw)
        .map(|(label, &confidence)| Classification {
            label: format_label(label).to_string(),
            confidence,
        })
        .collect();

    entries.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Ok(ClassificationResult::from_sorted(entries))
}

/// In-place softmax, for models whose last layer emits logits.
///
/// `+inf` logits share all of the mass, `-inf` logits get none, and an
/// all-`-inf` slice becomes uniform. The result always sums to 1 unless a
/// value is NaN, in which case every value is NaN.
pub fn softmax(values: &mut [f32]) {
    if values.is_empty() {
        return;
    }
    if values.iter().any(|v| v.is_nan()) {
        values.fill(f32::NAN);
        return;
    }

    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max == f32::INFINITY {
        let winners = values.iter().filter(|v| **v == f32::INFINITY).count() as f32;
        for v in values.iter_mut() {
            *v = if *v == f32::INFINITY { 1.0 / winners } else { 0.0 };
        }
        return;
    }
    if max == f32::NEG_INFINITY {
        let uniform = 1.0 / values.len() as f32;
        values.fill(uniform);
        return;
    }

    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> LabelCatalog {
        LabelCatalog::from_labels(["0 baby", "1 10대", "2 20대", "3 30대"])
    }

    #[test]
    fn test_sorted_descending() {
        let result = rank(&catalog(), &[0.1, 0.2, 0.6, 0.1]).unwrap();
        let labels: Vec<&str> = result.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["20대", "10대", "baby", "30대"]);
        assert_eq!(result.top().unwrap().confidence, 0.6);
        assert!((result.confidence_sum() - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_ties_keep_label_order() {
        let result = rank(&catalog(), &[0.25, 0.25, 0.25, 0.25]).unwrap();
        let labels: Vec<&str> = result.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["baby", "10대", "20대", "30대"]);

        let again = rank(&catalog(), &[0.25, 0.25, 0.25, 0.25]).unwrap();
        assert_eq!(result, again);
    }

    #[test]
    fn test_length_mismatch_is_error() {
        let err = rank(&catalog(), &[0.5, 0.5]).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::LabelCountMismatch { labels: 4, outputs: 2 }
        ));
    }

    #[test]
    fn test_softmax() {
        let mut values = [1.0, 2.0, 3.0];
        softmax(&mut values);
        let sum: f32 = values.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(values[2] > values[1] && values[1] > values[0]);
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));

        let mut large = [1000.0, 1000.0];
        softmax(&mut large);
        assert!((large[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_softmax_infinite_logits() {
        let mut one = [1.0, f32::INFINITY, 2.0];
        softmax(&mut one);
        assert_eq!(one, [0.0, 1.0, 0.0]);

        let mut two = [f32::INFINITY, 0.0, f32::INFINITY, f32::NEG_INFINITY];
        softmax(&mut two);
        assert_eq!(two, [0.5, 0.0, 0.5, 0.0]);

        let mut masked = [f32::NEG_INFINITY, 0.0];
        softmax(&mut masked);
        assert_eq!(masked, [0.0, 1.0]);

        let mut none = [f32::NEG_INFINITY; 4];
        softmax(&mut none);
        assert_eq!(none, [0.25; 4]);

        let mut nan = [f32::NAN, 1.0];
        softmax(&mut nan);
        assert!(nan.iter().all(|v| v.is_nan()));

        let mut empty: [f32; 0] = [];
        softmax(&mut empty);
    }
}

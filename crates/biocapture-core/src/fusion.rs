use crate::features::{FeatureVector, EAR_DIM};
use crate::scan::StepOutcomes;

/// Lowest confidence a finished capture may report.
pub const CONFIDENCE_FLOOR: f32 = 0.5;
/// Highest confidence a finished capture may report.
pub const CONFIDENCE_CEILING: f32 = 0.99;

/// Elementwise mean of the two ear vectors.
///
/// Runs over the longer of the two inputs, treating a missing entry as 0,
/// and fits the result to [`EAR_DIM`].
pub fn merge_ear_vectors(left: &[f32], right: &[f32]) -> FeatureVector {
    let size = left.len().max(right.len());
    let merged = (0..size)
        .map(|i| {
            let a = left.get(i).copied().unwrap_or(0.0);
            let b = right.get(i).copied().unwrap_or(0.0);
            (a + b) / 2.0
        })
        .collect();
    FeatureVector::fit(merged, EAR_DIM)
}

/// Mean of the four step confidences, clamped to
/// `[CONFIDENCE_FLOOR, CONFIDENCE_CEILING]`.
pub fn aggregate_confidence(outcomes: &StepOutcomes) -> f32 {
    let sum: f32 = outcomes.iter().map(|o| o.confidence).sum();
    let mean = sum / 4.0;
    mean.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_identical_is_identity() {
        let v: Vec<f32> = (0..EAR_DIM).map(|i| i as f32 / 64.0).collect();
        assert_eq!(merge_ear_vectors(&v, &v).as_slice(), v.as_slice());
    }

    #[test]
    fn test_merge_averages() {
        let merged = merge_ear_vectors(&[1.0, 0.0, 0.5], &[0.0, 1.0, 0.5]);
        assert_eq!(&merged.as_slice()[..3], &[0.5, 0.5, 0.5]);
        assert_eq!(merged.len(), EAR_DIM);
    }

    #[test]
    fn test_merge_uneven_lengths() {
        let merged = merge_ear_vectors(&[1.0, 1.0], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(&merged.as_slice()[..4], &[1.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn test_merge_empty_inputs() {
        let merged = merge_ear_vectors(&[], &[]);
        assert_eq!(merged.len(), EAR_DIM);
        assert!(merged.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_merge_truncates_oversized() {
        let merged = merge_ear_vectors(&[1.0; 100], &[1.0; 80]);
        assert_eq!(merged.len(), EAR_DIM);
    }

    #[test]
    fn test_aggregate_mean() {
        let outcomes = StepOutcomes::completed([1.0, 1.0, 0.9, 0.9]);
        assert!((aggregate_confidence(&outcomes) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_floor() {
        let outcomes = StepOutcomes::completed([0.0; 4]);
        assert_eq!(aggregate_confidence(&outcomes), CONFIDENCE_FLOOR);
    }

    #[test]
    fn test_aggregate_ceiling() {
        let outcomes = StepOutcomes::completed([1.0; 4]);
        assert_eq!(aggregate_confidence(&outcomes), CONFIDENCE_CEILING);
    }
}

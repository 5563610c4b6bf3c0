//! Summary scalars of an accuracy-vs-vocabulary curve.

/// Accuracy drop tolerated when looking for the smallest adequate vocabulary.
pub const CR_TOLERANCE: f32 = 0.03;

fn sorted_points(accuracies: &[f32], counts: &[usize]) -> Vec<(usize, f32)> {
    let mut points: Vec<(usize, f32)> = counts
        .iter()
        .copied()
        .zip(accuracies.iter().copied())
        .collect();
    points.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points
}

/// Normalized area under the accuracy curve over retained-vocabulary size.
///
/// Counts are scaled by the largest count and the trapezoidal area is divided
/// by the covered span, so the result stays in `[0, 1]`.
pub fn roc(accuracies: &[f32], counts: &[usize]) -> f32 {
    let points = sorted_points(accuracies, counts);
    let Some(&(max_count, _)) = points.last() else {
        return 0.0;
    };
    let first = points[0].0;
    if max_count == 0 || first == max_count {
        return points.iter().map(|p| p.1).sum::<f32>() / points.len() as f32;
    }

    let max_count = max_count as f64;
    let area: f64 = points
        .windows(2)
        .map(|w| {
            let width = (w[1].0 - w[0].0) as f64 / max_count;
            width * f64::from(w[0].1 + w[1].1) / 2.0
        })
        .sum();
    let span = (points[points.len() - 1].0 - first) as f64 / max_count;
    (area / span) as f32
}

/// Compression ratio: largest count over the smallest count whose accuracy is
/// within [`CR_TOLERANCE`] of the best accuracy at the largest count.
pub fn compression_ratio(accuracies: &[f32], counts: &[usize]) -> f32 {
    let points = sorted_points(accuracies, counts);
    let Some(&(max_count, reference)) = points.last() else {
        return 1.0;
    };
    let target = reference - CR_TOLERANCE;
    let smallest = points
        .iter()
        .find(|(_, acc)| *acc >= target)
        .map(|(count, _)| *count)
        .unwrap_or(max_count)
        .max(1);
    max_count.max(1) as f32 / smallest as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roc_flat_curve() {
        let roc = roc(&[0.9, 0.9, 0.9], &[10, 50, 100]);
        assert!((roc - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_roc_rising_curve() {
        // Points (0.1, 0.0) and (1.0, 1.0): area 0.45 over span 0.9.
        let roc = roc(&[1.0, 0.0], &[100, 10]);
        assert!((roc - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_roc_degenerate() {
        assert_eq!(roc(&[], &[]), 0.0);
        assert!((roc(&[0.7], &[42]) - 0.7).abs() < 1e-6);
        assert!((roc(&[0.6, 0.8], &[5, 5]) - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_compression_ratio() {
        let acc = [0.50, 0.80, 0.95, 0.96, 0.97];
        let counts = [5, 20, 50, 500, 1000];
        // Reference 0.97 at 1000; 0.95 at 50 is within tolerance.
        assert!((compression_ratio(&acc, &counts) - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_compression_ratio_no_gain() {
        assert_eq!(compression_ratio(&[0.1, 0.9], &[10, 100]), 1.0);
        assert_eq!(compression_ratio(&[], &[]), 1.0);
    }

    #[test]
    fn test_compression_ratio_uses_best_at_largest_count() {
        // Repeated draws at the same count: the highest one is the reference.
        let acc = [0.60, 0.90, 0.88, 0.70];
        let counts = [100, 100, 10, 10];
        assert!((compression_ratio(&acc, &counts) - 10.0).abs() < 1e-6);
    }
}

use std::cmp::Ordering;

/// Percentile of a sample with linear interpolation between closest ranks
/// (numpy's default). `q` is in [0, 100]. Returns `None` for an empty sample.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Arithmetic mean, `None` for an empty sample.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// `numerator / denominator`, or 0 when the denominator is zero or not finite.
#[inline]
pub fn ratio_or_zero(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        0.0
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.0), Some(1.0));
        assert_eq!(percentile(&values, 50.0), Some(3.0));
        assert_eq!(percentile(&values, 100.0), Some(5.0));
        // rank = 0.1 * 4 = 0.4
        let p10 = percentile(&values, 10.0).unwrap();
        assert!((p10 - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_unsorted_and_empty() {
        assert_eq!(percentile(&[9.0, 1.0, 5.0], 50.0), Some(5.0));
        assert_eq!(percentile(&[], 10.0), None);
        assert_eq!(percentile(&[7.5], 10.0), Some(7.5));
    }

    #[test]
    fn test_mean_and_ratio() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[2.0, 4.0]), Some(3.0));
        assert_eq!(ratio_or_zero(3.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(3.0, 2.0), 1.5);
    }
}

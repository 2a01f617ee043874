//! Pearson correlation kernel
//!
//! Two-pass formula: means first, then centered cross and square sums. The result is
//! `sxy / sqrt(sxx * syy)`, written so that a vector correlated with itself yields exactly
//! `1.0` (the numerator equals `sxx` and `sqrt(sxx * sxx) == sxx` in IEEE arithmetic).
//! A zero-variance input produces `0 / 0`, which stays NaN.
//!
//! When `sxx * syy` under- or overflows, the deviations are rescaled by their largest
//! magnitude and summed again. Correlation is scale-invariant, so only vectors with
//! genuinely no spread end up NaN.

use crate::config::Normalization;
use crate::error::{CoexprError, CoexprResult};

/// Correlation of two equally long vectors. Empty input is a no-data error.
pub fn pearson(x: &[f64], y: &[f64]) -> CoexprResult<f64> {
    if x.len() != y.len() {
        return Err(CoexprError::internal_component(
            "pearson",
            format!("vector lengths differ: {} vs {}", x.len(), y.len()),
        ));
    }
    if x.is_empty() {
        return Err(CoexprError::no_data("pearson", "no samples to correlate"));
    }
    Ok(pearson_unchecked(x, y))
}

/// Kernel without length checks; `x` and `y` must be the same non-zero length.
#[inline]
pub fn pearson_unchecked(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let (sxy, sxx, syy) = centered_sums(x, y, mean_x, mean_y, 1.0, 1.0);
    if (sxx * syy).is_normal() {
        return (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    }

    let spread = |v: &[f64], mean: f64| v.iter().fold(0.0_f64, |m, a| m.max((a - mean).abs()));
    let (scale_x, scale_y) = (spread(x, mean_x), spread(y, mean_y));
    if scale_x == 0.0 || scale_y == 0.0 {
        return f64::NAN;
    }
    let (sxy, sxx, syy) = centered_sums(x, y, mean_x, mean_y, scale_x, scale_y);
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

fn centered_sums(x: &[f64], y: &[f64], mean_x: f64, mean_y: f64, scale_x: f64, scale_y: f64) -> (f64, f64, f64) {
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = (a - mean_x) / scale_x;
        let dy = (b - mean_y) / scale_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    (sxy, sxx, syy)
}

/// Rescale `values` in place.
pub fn normalize(values: &mut [f64], normalization: Normalization) {
    match normalization {
        Normalization::None => {}
        Normalization::ZScore => {
            if values.is_empty() {
                return;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let sd = (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt();
            for v in values.iter_mut() {
                *v = (*v - mean) / sd;
            }
        }
        Normalization::Log1p => {
            for v in values.iter_mut() {
                *v = v.ln_1p();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_anticorrelation() {
        let up = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let down = [6.0, 5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&up, &down).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_self_correlation_is_exactly_one() {
        let noisy = [0.37, 12.5, 3.14159, 1e-3, 88.0, 42.42, 7.0];
        assert_eq!(pearson(&noisy, &noisy).unwrap(), 1.0);
    }

    #[test]
    fn test_zero_variance_is_nan() {
        let flat = [3.0; 5];
        let up = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(pearson(&flat, &up).unwrap().is_nan());
        assert!(pearson(&[1.0], &[2.0]).unwrap().is_nan());
    }

    #[test]
    fn test_extreme_magnitudes_keep_their_correlation() {
        let x = [1.0, 2.0, 3.0];
        let y = [3.0, 1.0, 2.0];
        let unit = pearson(&x, &y).unwrap();
        assert!((unit + 0.5).abs() < 1e-12);
        for scale in [1e-170, 1e-300, 1e170, 1e300] {
            let sx: Vec<f64> = x.iter().map(|v| v * scale).collect();
            let sy: Vec<f64> = y.iter().map(|v| v * scale).collect();
            let scaled = pearson(&sx, &sy).unwrap();
            assert!((scaled - unit).abs() < 1e-9, "scale {scale:e}: {scaled}");
        }
        let tiny = 2f64.powi(-700);
        let tiny_flat = [tiny; 4];
        assert!(pearson(&tiny_flat, &[tiny, 2.0 * tiny, 3.0 * tiny, 4.0 * tiny]).unwrap().is_nan());
    }

    #[test]
    fn test_empty_input_is_no_data() {
        let err = pearson(&[], &[]).unwrap_err();
        assert!(matches!(err, CoexprError::NoData { .. }));
    }

    #[test]
    fn test_symmetry() {
        let a = [0.2, 0.9, 0.4, 0.7, 0.1];
        let b = [1.5, 0.3, 2.2, 0.8, 1.9];
        assert_eq!(pearson(&a, &b).unwrap(), pearson(&b, &a).unwrap());
    }

    #[test]
    fn test_zscore_preserves_correlation() {
        let a = [10.0, 20.0, 15.0, 40.0];
        let b = [1.0, 3.0, 2.0, 2.5];
        let before = pearson(&a, &b).unwrap();
        let (mut za, mut zb) = (a, b);
        normalize(&mut za, Normalization::ZScore);
        normalize(&mut zb, Normalization::ZScore);
        assert!((pearson(&za, &zb).unwrap() - before).abs() < 1e-12);
        assert!(za.iter().sum::<f64>().abs() < 1e-12);
    }
}

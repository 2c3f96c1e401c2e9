//! One-dimensional smoothing filters for profiles.

use nalgebra::{DMatrix, DVector};

/// Normalise a requested Savitzky–Golay window for a signal of length `len`.
///
/// The window is clipped to the signal length and forced odd. Returns
/// `None` when fewer than three samples would remain.
pub fn effective_window(requested: usize, len: usize) -> Option<usize> {
    let mut window = requested.min(len);
    if window % 2 == 0 {
        window = window.saturating_sub(1);
    }
    (window >= 3).then_some(window)
}

/// Savitzky–Golay smoothing (local least-squares polynomial regression).
///
/// Interior samples use the convolution coefficients of a centred window;
/// the first and last half-windows are evaluated on a polynomial fitted to
/// the first and last full window. `degree` is lowered to `window − 1`
/// when needed. Signals too short for a 3-sample window are returned
/// unchanged.
pub fn savgol_filter(values: &[f64], window: usize, degree: usize) -> Vec<f64> {
    let Some(window) = effective_window(window, values.len()) else {
        return values.to_vec();
    };
    let degree = degree.min(window - 1);
    let half = window / 2;

    // Design matrix over local offsets -half..=half.
    let design = DMatrix::from_fn(window, degree + 1, |i, j| {
        (i as f64 - half as f64).powi(j as i32)
    });
    let pinv = match design.pseudo_inverse(1e-12) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("Savitzky-Golay design matrix not invertible: {e}");
            return values.to_vec();
        }
    };

    let n = values.len();
    let mut out = vec![0.0; n];

    // Row 0 of the pseudo-inverse holds the smoothing weights for the centre.
    for i in half..n - half {
        out[i] = (0..window)
            .map(|k| pinv[(0, k)] * values[i - half + k])
            .sum();
    }

    // Edges: evaluate the polynomial fitted to the first / last window.
    let fit_edge = |start: usize| -> DVector<f64> {
        let y = DVector::from_column_slice(&values[start..start + window]);
        &pinv * y
    };
    let eval = |coeffs: &DVector<f64>, t: f64| -> f64 {
        coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
    };

    let head = fit_edge(0);
    for (i, slot) in out.iter_mut().enumerate().take(half) {
        *slot = eval(&head, i as f64 - half as f64);
    }
    let tail_start = n - window;
    let tail = fit_edge(tail_start);
    for (i, slot) in out.iter_mut().enumerate().skip(n - half) {
        *slot = eval(&tail, (i - tail_start) as f64 - half as f64);
    }

    out
}

/// Gaussian smoothing with reflective boundaries.
///
/// The kernel is truncated at four standard deviations. A non-positive
/// sigma returns the input unchanged.
pub fn gaussian_filter1d(values: &[f64], sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 || values.is_empty() {
        return values.to_vec();
    }
    let radius = (4.0 * sigma + 0.5) as isize;
    let kernel: Vec<f64> = (-radius..=radius)
        .map(|k| (-0.5 * (k as f64 / sigma).powi(2)).exp())
        .collect();
    let norm: f64 = kernel.iter().sum();

    let n = values.len() as isize;
    (0..n)
        .map(|i| {
            kernel
                .iter()
                .zip(-radius..=radius)
                .map(|(w, k)| w * values[reflect(i + k, n)])
                .sum::<f64>()
                / norm
        })
        .collect()
}

/// Half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
fn reflect(i: isize, n: isize) -> usize {
    let period = 2 * n;
    let m = i.rem_euclid(period);
    if m < n {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_effective_window() {
        assert_eq!(effective_window(50, 10), Some(9));
        assert_eq!(effective_window(4, 100), Some(3));
        assert_eq!(effective_window(7, 100), Some(7));
        assert_eq!(effective_window(2, 100), None);
        assert_eq!(effective_window(11, 2), None);
    }

    #[test]
    fn test_savgol_preserves_quadratic() {
        let values: Vec<f64> = (0..30).map(|i| 0.5 * (i as f64).powi(2) - 3.0 * i as f64 + 2.0).collect();
        let smoothed = savgol_filter(&values, 7, 2);
        for (a, b) in values.iter().zip(&smoothed) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_savgol_reduces_alternating_noise() {
        let values: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let smoothed = savgol_filter(&values, 9, 2);
        let spread = |v: &[f64]| v[10..30].iter().map(|x| x.abs()).fold(0.0, f64::max);
        assert!(spread(&smoothed) < 0.5 * spread(&values));
    }

    #[test]
    fn test_short_signal_unchanged() {
        let values = vec![1.0, 5.0];
        assert_eq!(savgol_filter(&values, 11, 2), values);
    }

    #[test]
    fn test_gaussian_keeps_constant() {
        let values = vec![3.0; 20];
        for v in gaussian_filter1d(&values, 2.5) {
            assert_abs_diff_eq!(v, 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gaussian_spreads_impulse() {
        let mut values = vec![0.0; 21];
        values[10] = 1.0;
        let out = gaussian_filter1d(&values, 2.0);
        assert!(out[10] < 1.0);
        assert!(out[8] > 0.0);
        assert_abs_diff_eq!(out.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
    }
}

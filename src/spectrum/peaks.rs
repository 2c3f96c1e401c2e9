//! Peak detection in intensity profiles.
//!
//! Candidate maxima go through the usual chain of filters (height,
//! distance, prominence, width), then each survivor is refined to a
//! sub-sample position by fitting a parabola through its three central
//! samples. [`fit_gaussian`] offers a slower least-squares alternative for
//! a single peak.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{storage::Owned, DVector, Dyn, OMatrix, Vector3, U3};
use serde::{Deserialize, Serialize};

use super::sampler::IntensityProfile;

// ---------------------------------------------------------------------------
// Parameters and results
// ---------------------------------------------------------------------------

/// Peak search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeakParams {
    /// Minimum prominence as a fraction of the profile's value range.
    pub prominence_fraction: f64,
    /// Accepted `(min, max)` width at half prominence, in samples.
    pub width_range: Option<(f64, f64)>,
    /// Minimum horizontal distance between peaks, in samples.
    pub min_distance: Option<f64>,
    /// Minimum absolute peak height.
    pub min_height: Option<f64>,
    /// Keep only this many peaks (most prominent first).
    pub max_peaks: Option<usize>,
}

impl Default for PeakParams {
    fn default() -> Self {
        Self {
            prominence_fraction: 0.1,
            width_range: None,
            min_distance: None,
            min_height: None,
            max_peaks: None,
        }
    }
}

/// A detected spectral peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Sample index of the raw maximum.
    pub index: usize,
    /// Sub-sample refined position, in profile position units.
    pub position: f64,
    pub amplitude: f64,
    pub prominence: f64,
    /// Width at half prominence, in samples.
    pub width: f64,
    /// Heuristic score in [0, 1].
    pub confidence: f64,
}

/// Width below which a peak counts as narrow and earns a confidence bonus.
const NARROW_PEAK_WIDTH: f64 = 10.0;

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Find peaks in `profile`, most prominent first.
///
/// Profiles with fewer than three samples have no peaks.
pub fn detect_peaks(profile: &IntensityProfile, params: &PeakParams) -> Vec<Peak> {
    let x = profile.intensities();
    if x.len() < 3 {
        return Vec::new();
    }
    let range = profile.value_range();

    let mut candidates = local_maxima(x);
    if let Some(min_height) = params.min_height {
        candidates.retain(|&p| x[p] >= min_height);
    }
    if let Some(distance) = params.min_distance {
        candidates = select_by_distance(x, &candidates, distance);
    }

    let threshold = params.prominence_fraction * range;
    let mut peaks: Vec<Peak> = candidates
        .into_iter()
        .filter_map(|p| {
            let (prominence, left_base, right_base) = prominence(x, p);
            if prominence < threshold {
                return None;
            }
            let width = half_prominence_width(x, p, prominence, left_base, right_base);
            if let Some((lo, hi)) = params.width_range {
                if width < lo || width > hi {
                    return None;
                }
            }

            let mut confidence = if range > 0.0 {
                (prominence / (range * 0.5)).min(1.0)
            } else {
                0.0
            };
            if width < NARROW_PEAK_WIDTH {
                confidence = (confidence * 1.2).min(1.0);
            }

            Some(Peak {
                index: p,
                position: profile.position_at(refine_parabolic(x, p)),
                amplitude: x[p],
                prominence,
                width,
                confidence,
            })
        })
        .collect();

    peaks.sort_by(|a, b| b.prominence.total_cmp(&a.prominence));
    if let Some(max) = params.max_peaks {
        peaks.truncate(max);
    }
    log::info!("Detected {} peaks", peaks.len());
    peaks
}

/// Indices of strict local maxima; a flat plateau yields its middle sample.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut maxima = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead + 1 < n && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                maxima.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    maxima
}

/// Drop peaks closer than `distance` to a higher one.
fn select_by_distance(x: &[f64], peaks: &[usize], distance: f64) -> Vec<usize> {
    let distance = distance.ceil().max(1.0) as usize;
    let mut keep = vec![true; peaks.len()];
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    order.sort_by(|&a, &b| x[peaks[b]].total_cmp(&x[peaks[a]]));

    for &i in &order {
        if !keep[i] {
            continue;
        }
        let mut j = i;
        while j > 0 && peaks[i] - peaks[j - 1] < distance {
            keep[j - 1] = false;
            j -= 1;
        }
        let mut j = i + 1;
        while j < peaks.len() && peaks[j] - peaks[i] < distance {
            keep[j] = false;
            j += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Topographic prominence of `peak` and the indices of its two bases.
fn prominence(x: &[f64], peak: usize) -> (f64, usize, usize) {
    let top = x[peak];

    let (mut left_min, mut left_base) = (top, peak);
    let mut i = peak;
    loop {
        if x[i] > top {
            break;
        }
        if x[i] < left_min {
            left_min = x[i];
            left_base = i;
        }
        if i == 0 {
            break;
        }
        i -= 1;
    }

    let (mut right_min, mut right_base) = (top, peak);
    for (i, &v) in x.iter().enumerate().skip(peak) {
        if v > top {
            break;
        }
        if v < right_min {
            right_min = v;
            right_base = i;
        }
    }

    (top - left_min.max(right_min), left_base, right_base)
}

/// Width of `peak` at half its prominence, with linear interpolation
/// between the samples straddling the reference height.
fn half_prominence_width(
    x: &[f64],
    peak: usize,
    prominence: f64,
    left_base: usize,
    right_base: usize,
) -> f64 {
    let height = x[peak] - prominence * 0.5;

    let mut i = peak;
    while left_base < i && x[i] > height {
        i -= 1;
    }
    let mut left = i as f64;
    if x[i] < height {
        left += (height - x[i]) / (x[i + 1] - x[i]);
    }

    let mut i = peak;
    while i < right_base && x[i] > height {
        i += 1;
    }
    let mut right = i as f64;
    if x[i] < height {
        right -= (height - x[i]) / (x[i - 1] - x[i]);
    }

    right - left
}

/// Vertex of the parabola through the three samples around `idx`.
///
/// Edge samples, flat neighbourhoods and offsets beyond one sample keep
/// the integer index.
fn refine_parabolic(x: &[f64], idx: usize) -> f64 {
    if idx == 0 || idx + 1 >= x.len() {
        return idx as f64;
    }
    let (yl, yc, yr) = (x[idx - 1], x[idx], x[idx + 1]);
    let denom = 2.0 * (yl - 2.0 * yc + yr);
    if denom.abs() < 1e-10 {
        return idx as f64;
    }
    let offset = (yl - yr) / denom;
    if offset.abs() > 1.0 {
        return idx as f64;
    }
    idx as f64 + offset
}

// ---------------------------------------------------------------------------
// Gaussian refinement
// ---------------------------------------------------------------------------

/// Parameters of `amplitude · exp(−(x − center)² / (2 sigma²))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaussianFit {
    pub amplitude: f64,
    /// In profile position units.
    pub center: f64,
    pub sigma: f64,
}

impl GaussianFit {
    pub fn eval(&self, x: f64) -> f64 {
        let d = x - self.center;
        self.amplitude * (-d * d / (2.0 * self.sigma * self.sigma)).exp()
    }

    /// Full width at half maximum.
    pub fn fwhm(&self) -> f64 {
        2.0 * (2.0 * std::f64::consts::LN_2).sqrt() * self.sigma
    }
}

pub const DEFAULT_GAUSSIAN_WINDOW: usize = 20;
const MAX_EVALUATIONS: usize = 1000;
const INITIAL_SIGMA: f64 = 2.0;

/// Least-squares Gaussian fit around `position` (Levenberg–Marquardt).
///
/// Uses the samples `[idx − window/2, idx + window/2)` around the sample
/// nearest to `position`, clipped to the profile. Returns `None` for fewer
/// than five samples, a window without variation, a failed solve,
/// non-finite parameters, or no convergence within 1000 evaluations.
pub fn fit_gaussian(profile: &IntensityProfile, position: f64, window: usize) -> Option<GaussianFit> {
    let idx = nearest_sample(profile.positions(), position)?;
    let start = idx.saturating_sub(window / 2);
    let end = (idx + window / 2).min(profile.len());
    if end.saturating_sub(start) < 5 {
        return None;
    }
    let xs = &profile.positions()[start..end];
    let ys = &profile.intensities()[start..end];

    let (arg, &amp) = ys
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    if ys.iter().all(|&y| y == amp) {
        return None;
    }

    let problem = GaussianWindow {
        xs,
        ys,
        params: Vector3::new(amp, xs[arg], INITIAL_SIGMA),
    };
    // The evaluation budget is patience × (parameters + 1).
    let (problem, report) = LevenbergMarquardt::new()
        .with_patience(MAX_EVALUATIONS / 4)
        .minimize(problem);
    if !report.termination.was_successful() {
        log::debug!(
            "Gaussian fit failed after {} evaluations: {:?}",
            report.number_of_evaluations,
            report.termination
        );
        return None;
    }

    let p = problem.params;
    if !p.iter().all(|v| v.is_finite()) || p[2] == 0.0 {
        log::debug!("Gaussian fit produced non-finite parameters");
        return None;
    }
    Some(GaussianFit {
        amplitude: p[0],
        center: p[1],
        sigma: p[2].abs(),
    })
}

/// Index of the position closest to `position`; ties go to the lower one.
fn nearest_sample(positions: &[f64], position: f64) -> Option<usize> {
    let last = positions.len().checked_sub(1)?;
    let after = positions.partition_point(|&p| p < position).min(last);
    if after > 0 && position - positions[after - 1] <= positions[after] - position {
        Some(after - 1)
    } else {
        Some(after)
    }
}

/// Residuals `model − observed` of one Gaussian over a sample window.
struct GaussianWindow<'a> {
    xs: &'a [f64],
    ys: &'a [f64],
    params: Vector3<f64>,
}

impl LeastSquaresProblem<f64, Dyn, U3> for GaussianWindow<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, p: &Vector3<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> Vector3<f64> {
        self.params
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        if self.params[2] == 0.0 {
            return None;
        }
        Some(DVector::from_iterator(
            self.xs.len(),
            self.xs
                .iter()
                .zip(self.ys)
                .map(|(&x, &y)| gaussian(&self.params, x) - y),
        ))
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U3>> {
        if self.params[2] == 0.0 {
            return None;
        }
        let rows: Vec<Vector3<f64>> = self
            .xs
            .iter()
            .map(|&x| gaussian_gradient(&self.params, x))
            .collect();
        Some(OMatrix::<f64, Dyn, U3>::from_fn(rows.len(), |i, k| rows[i][k]))
    }
}

fn gaussian(p: &Vector3<f64>, x: f64) -> f64 {
    let d = x - p[1];
    p[0] * (-d * d / (2.0 * p[2] * p[2])).exp()
}

/// Partial derivatives of [`gaussian`] with respect to (amplitude, center, sigma).
fn gaussian_gradient(p: &Vector3<f64>, x: f64) -> Vector3<f64> {
    let (a, c, s) = (p[0], p[1], p[2]);
    let d = x - c;
    let e = (-d * d / (2.0 * s * s)).exp();
    Vector3::new(e, a * e * d / (s * s), a * e * d * d / (s * s * s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bumps(len: usize, centers: &[f64], sigma: f64) -> IntensityProfile {
        IntensityProfile::from_intensities(
            (0..len)
                .map(|i| {
                    centers
                        .iter()
                        .map(|c| (-(i as f64 - c).powi(2) / (2.0 * sigma * sigma)).exp())
                        .sum()
                })
                .collect(),
        )
    }

    #[test]
    fn test_finds_each_gaussian_bump() {
        let centers = [50.3, 120.7, 200.0, 260.4];
        let profile = bumps(300, &centers, 3.0);
        let mut peaks = detect_peaks(&profile, &PeakParams::default());
        assert_eq!(peaks.len(), centers.len());
        peaks.sort_by(|a, b| a.position.total_cmp(&b.position));
        for (peak, c) in peaks.iter().zip(centers) {
            assert!((peak.position - c).abs() < 0.5, "{} vs {c}", peak.position);
            assert!(peak.confidence > 0.9 && peak.confidence <= 1.0);
        }
    }

    #[test]
    fn test_short_and_flat_profiles_have_no_peaks() {
        let short = IntensityProfile::from_intensities(vec![0.0, 1.0]);
        assert!(detect_peaks(&short, &PeakParams::default()).is_empty());
        let flat = IntensityProfile::from_intensities(vec![0.4; 50]);
        assert!(detect_peaks(&flat, &PeakParams::default()).is_empty());
    }

    #[test]
    fn test_plateau_resolves_to_middle() {
        let x = [0.0, 1.0, 2.0, 2.0, 2.0, 1.0, 0.0];
        assert_eq!(local_maxima(&x), vec![3]);
        // An edge plateau is not a peak.
        assert!(local_maxima(&[0.0, 1.0, 1.0]).is_empty());
    }

    #[test]
    fn test_prominence_filter_drops_ripples() {
        let mut values: Vec<f64> = bumps(200, &[100.0], 4.0).intensities().to_vec();
        values[30] += 0.02;
        let profile = IntensityProfile::from_intensities(values);
        let peaks = detect_peaks(&profile, &PeakParams::default());
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 100);
    }

    #[test]
    fn test_distance_keeps_higher_peak() {
        let mut values = vec![0.0; 40];
        values[10] = 1.0;
        values[14] = 0.8;
        values[30] = 0.9;
        let profile = IntensityProfile::from_intensities(values);
        let params = PeakParams {
            min_distance: Some(6.0),
            ..PeakParams::default()
        };
        let mut idx: Vec<usize> = detect_peaks(&profile, &params).iter().map(|p| p.index).collect();
        idx.sort();
        assert_eq!(idx, vec![10, 30]);
    }

    #[test]
    fn test_width_and_count_limits() {
        let mut values: Vec<f64> = bumps(300, &[60.0], 2.0).intensities().to_vec();
        for (v, w) in values.iter_mut().zip(bumps(300, &[200.0], 12.0).intensities()) {
            *v += 0.8 * w;
        }
        let profile = IntensityProfile::from_intensities(values);

        let all = detect_peaks(&profile, &PeakParams::default());
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].index, 60);
        // FWHM of a Gaussian is about 2.355 sigma.
        assert_abs_diff_eq!(all[0].width, 2.355 * 2.0, epsilon = 0.3);

        let narrow = PeakParams {
            width_range: Some((0.0, 10.0)),
            ..PeakParams::default()
        };
        let found = detect_peaks(&profile, &narrow);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].index, 60);

        let top = PeakParams {
            max_peaks: Some(1),
            ..PeakParams::default()
        };
        assert_eq!(detect_peaks(&profile, &top).len(), 1);
    }

    #[test]
    fn test_parabolic_refinement() {
        let x = [0.0, 1.0, 3.0, 2.0, 0.0];
        let r = refine_parabolic(&x, 2);
        assert_abs_diff_eq!(r, 2.0 + (1.0 - 2.0) / (2.0 * (1.0 - 6.0 + 2.0)), epsilon = 1e-12);
        assert_eq!(refine_parabolic(&x, 0), 0.0);
    }

    #[test]
    fn test_gaussian_fit_recovers_parameters() {
        let truth = GaussianFit {
            amplitude: 2.0,
            center: 30.3,
            sigma: 3.0,
        };
        let profile = IntensityProfile::from_intensities((0..60).map(|i| truth.eval(i as f64)).collect());
        let fit = fit_gaussian(&profile, 30.0, DEFAULT_GAUSSIAN_WINDOW).unwrap();
        assert_abs_diff_eq!(fit.amplitude, 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.center, 30.3, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.sigma, 3.0, epsilon = 1e-4);
    }

    #[test]
    fn test_gaussian_fit_from_nearby_position() {
        let truth = GaussianFit {
            amplitude: 1.5,
            center: 24.6,
            sigma: 2.5,
        };
        let profile = IntensityProfile::from_intensities((0..50).map(|i| truth.eval(i as f64)).collect());
        let fit = fit_gaussian(&profile, 25.4, DEFAULT_GAUSSIAN_WINDOW).unwrap();
        assert_abs_diff_eq!(fit.center, 24.6, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.fwhm(), 2.355 * 2.5, epsilon = 1e-2);
    }

    #[test]
    fn test_nearest_sample_rounds_to_closest() {
        let positions = [0.0, 1.0, 2.0, 3.0];
        assert_eq!(nearest_sample(&positions, 1.1), Some(1));
        assert_eq!(nearest_sample(&positions, 1.6), Some(2));
        assert_eq!(nearest_sample(&positions, 1.5), Some(1));
        assert_eq!(nearest_sample(&positions, -2.0), Some(0));
        assert_eq!(nearest_sample(&positions, 9.0), Some(3));
        assert_eq!(nearest_sample(&[], 1.0), None);
    }

    #[test]
    fn test_gaussian_fit_rejects_flat_or_tiny_windows() {
        let flat = IntensityProfile::from_intensities(vec![0.0; 40]);
        assert!(fit_gaussian(&flat, 20.0, DEFAULT_GAUSSIAN_WINDOW).is_none());
        let bump = bumps(40, &[20.0], 2.0);
        assert!(fit_gaussian(&bump, 20.0, 4).is_none());
    }
}

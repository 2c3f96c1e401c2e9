use std::sync::Arc;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrumError};
use crate::spectrum::Peak;

/// Default polynomial order of a new model.
pub const DEFAULT_ORDER: usize = 2;
const NEWTON_MAX_ITER: usize = 100;

// ---------------------------------------------------------------------------
// CalibrationPoint – one known (pixel, wavelength) pair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub pixel: f64,
    /// Wavelength in nm.
    pub wavelength: f64,
    #[serde(default)]
    pub label: Option<String>,
}

impl CalibrationPoint {
    pub fn new(pixel: f64, wavelength: f64) -> Self {
        Self {
            pixel,
            wavelength,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

// ---------------------------------------------------------------------------
// FitQuality / CalibrationFit – immutable fit snapshot
// ---------------------------------------------------------------------------

/// Goodness-of-fit diagnostics. Residuals are `observed − predicted`, in
/// point order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FitQuality {
    pub r_squared: f64,
    pub rmse: f64,
    pub max_error: f64,
    pub residuals: Vec<f64>,
}

/// A fitted pixel → wavelength polynomial.
///
/// Coefficients are stored highest degree first, the layout of persisted
/// calibration records.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationFit {
    order: usize,
    coefficients: Vec<f64>,
    quality: FitQuality,
    pixel_range: (f64, f64),
}

impl CalibrationFit {
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn quality(&self) -> &FitQuality {
        &self.quality
    }

    /// `(min, max)` pixel of the points the polynomial was fitted to.
    pub fn pixel_range(&self) -> (f64, f64) {
        self.pixel_range
    }

    /// Evaluate the polynomial at one pixel position (Horner).
    pub fn evaluate(&self, pixel: f64) -> f64 {
        polyval(&self.coefficients, pixel)
    }

    pub fn pixel_to_wavelength(&self, pixels: &[f64]) -> Vec<f64> {
        pixels.iter().map(|&p| self.evaluate(p)).collect()
    }

    /// Approximate inverse mapping.
    ///
    /// Linear fits are solved exactly. Higher orders run Newton's method
    /// from the middle of the calibrated pixel range; the result is one
    /// root, not necessarily the only one, and is only meaningful where the
    /// polynomial is monotonic.
    pub fn wavelength_to_pixel(&self, wavelength: f64) -> Result<f64> {
        if let &[a, b] = self.coefficients.as_slice() {
            if a.abs() < 1e-12 {
                return Err(SpectrumError::NumericInstability(
                    "linear calibration has zero slope".to_string(),
                ));
            }
            return Ok((wavelength - b) / a);
        }

        let derivative = polyder(&self.coefficients);
        let mut x = (self.pixel_range.0 + self.pixel_range.1) / 2.0;
        for _ in 0..NEWTON_MAX_ITER {
            let slope = polyval(&derivative, x);
            if slope.abs() < 1e-12 {
                return Err(SpectrumError::NumericInstability(format!(
                    "vanishing derivative at pixel {x:.3}"
                )));
            }
            let step = (polyval(&self.coefficients, x) - wavelength) / slope;
            x -= step;
            if !x.is_finite() {
                return Err(SpectrumError::NumericInstability(
                    "inverse iteration diverged".to_string(),
                ));
            }
            if step.abs() <= 1e-9 * (1.0 + x.abs()) {
                return Ok(x);
            }
        }
        Err(SpectrumError::NumericInstability(format!(
            "no convergence for {wavelength} nm after {NEWTON_MAX_ITER} iterations"
        )))
    }
}

fn polyval(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().fold(0.0, |acc, &c| acc * x + c)
}

fn polyder(coefficients: &[f64]) -> Vec<f64> {
    let n = coefficients.len();
    coefficients
        .iter()
        .take(n.saturating_sub(1))
        .enumerate()
        .map(|(i, &c)| c * (n - 1 - i) as f64)
        .collect()
}

fn quality_of(coefficients: &[f64], points: &[CalibrationPoint]) -> FitQuality {
    if points.is_empty() {
        return FitQuality::default();
    }
    let n = points.len() as f64;
    let residuals: Vec<f64> = points
        .iter()
        .map(|p| p.wavelength - polyval(coefficients, p.pixel))
        .collect();
    let mean = points.iter().map(|p| p.wavelength).sum::<f64>() / n;
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let ss_tot: f64 = points.iter().map(|p| (p.wavelength - mean).powi(2)).sum();
    FitQuality {
        r_squared: 1.0 - ss_res / (ss_tot + 1e-10),
        rmse: (ss_res / n).sqrt(),
        max_error: residuals.iter().fold(0.0, |m, r| m.max(r.abs())),
        residuals,
    }
}

fn pixel_range_of(points: &[CalibrationPoint]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    points.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
        (lo.min(p.pixel), hi.max(p.pixel))
    })
}

/// Least-squares polynomial fit of wavelength against pixel.
///
/// Needs at least two points with distinct pixel positions. When there are
/// too few distinct pixels for `order`, the order is lowered to fit (with a
/// warning) rather than failing.
pub fn fit_polynomial(points: &[CalibrationPoint], order: usize) -> Result<CalibrationFit> {
    let mut pixels: Vec<f64> = points.iter().map(|p| p.pixel).collect();
    pixels.sort_by(f64::total_cmp);
    pixels.dedup();
    if points.len() < 2 || pixels.len() < 2 {
        return Err(SpectrumError::InsufficientData {
            needed: 2,
            got: pixels.len(),
        });
    }

    let requested = order.max(1);
    let order = requested.min(pixels.len() - 1);
    if order < requested {
        log::warn!(
            "Need at least {} points for an order {requested} polynomial; fitting order {order}",
            requested + 1
        );
    }

    // Vandermonde matrix, highest power first, with unit-norm columns.
    let cols = order + 1;
    let mut a = DMatrix::from_fn(points.len(), cols, |i, j| {
        points[i].pixel.powi((order - j) as i32)
    });
    let scale: Vec<f64> = (0..cols)
        .map(|j| {
            let norm = a.column(j).norm();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        })
        .collect();
    for (j, s) in scale.iter().enumerate() {
        a.column_mut(j).scale_mut(1.0 / s);
    }
    let b = DVector::from_iterator(points.len(), points.iter().map(|p| p.wavelength));

    let solution = a
        .svd(true, true)
        .solve(&b, 1e-12)
        .map_err(|e| SpectrumError::NumericInstability(e.to_string()))?;
    let coefficients: Vec<f64> = solution.iter().zip(&scale).map(|(c, s)| c / s).collect();
    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(SpectrumError::NumericInstability(
            "fit produced non-finite coefficients".to_string(),
        ));
    }

    let quality = quality_of(&coefficients, points);
    log::info!(
        "Fitted polynomial (order {order}): R²={:.4}, RMSE={:.3} nm",
        quality.r_squared,
        quality.rmse
    );
    Ok(CalibrationFit {
        order,
        coefficients,
        quality,
        pixel_range: pixel_range_of(points),
    })
}

// ---------------------------------------------------------------------------
// CalibrationModel – the mutable calibration workflow
// ---------------------------------------------------------------------------

/// Calibration points plus the polynomial fitted to them.
///
/// Any change to the points or the order drops the fit; mapping functions
/// return [`SpectrumError::UnfittedModel`] until [`fit`](Self::fit) runs
/// again.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    order: usize,
    points: Vec<CalibrationPoint>,
    fit: Option<Arc<CalibrationFit>>,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER)
    }
}

impl CalibrationModel {
    pub fn new(order: usize) -> Self {
        Self {
            order: order.max(1),
            points: Vec::new(),
            fit: None,
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn add_point(&mut self, pixel: f64, wavelength: f64, label: Option<String>) {
        log::info!("Added calibration point: pixel={pixel:.1}, λ={wavelength} nm");
        self.points.push(CalibrationPoint {
            pixel,
            wavelength,
            label,
        });
        self.fit = None;
    }

    /// Remove the point at `index`; out-of-range indices change nothing.
    pub fn remove_point(&mut self, index: usize) -> Option<CalibrationPoint> {
        if index >= self.points.len() {
            return None;
        }
        self.fit = None;
        Some(self.points.remove(index))
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.fit = None;
    }

    pub fn set_order(&mut self, order: usize) {
        self.order = order.max(1);
        self.fit = None;
    }

    /// Fit the polynomial, optionally switching to a new order first.
    pub fn fit(&mut self, order: Option<usize>) -> Result<Arc<CalibrationFit>> {
        if let Some(order) = order {
            self.set_order(order);
        }
        self.fit = None;
        let fit = Arc::new(fit_polynomial(&self.points, self.order)?);
        self.fit = Some(Arc::clone(&fit));
        Ok(fit)
    }

    pub fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }

    /// Shared handle to the current fit.
    pub fn snapshot(&self) -> Option<Arc<CalibrationFit>> {
        self.fit.clone()
    }

    pub fn fit_quality(&self) -> Option<&FitQuality> {
        self.fit.as_deref().map(CalibrationFit::quality)
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fit.as_deref().map(CalibrationFit::coefficients)
    }

    fn fitted(&self) -> Result<&CalibrationFit> {
        self.fit.as_deref().ok_or(SpectrumError::UnfittedModel)
    }

    pub fn pixel_to_wavelength(&self, pixels: &[f64]) -> Result<Vec<f64>> {
        Ok(self.fitted()?.pixel_to_wavelength(pixels))
    }

    pub fn wavelength_to_pixel(&self, wavelength: f64) -> Result<f64> {
        self.fitted()?.wavelength_to_pixel(wavelength)
    }

    /// `(min, max)` pixel over the points, `None` without points.
    pub fn pixel_range(&self) -> Option<(f64, f64)> {
        (!self.points.is_empty()).then(|| pixel_range_of(&self.points))
    }

    /// `(min, max)` wavelength over the points, `None` without points.
    pub fn wavelength_range(&self) -> Option<(f64, f64)> {
        if self.points.is_empty() {
            return None;
        }
        Some(self.points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), p| (lo.min(p.wavelength), hi.max(p.wavelength)),
        ))
    }

    // -- persistence --

    pub fn to_record(&self) -> CalibrationRecord {
        CalibrationRecord {
            polynomial_order: self.fit.as_deref().map_or(self.order, CalibrationFit::order),
            points: self.points.clone(),
            coefficients: self.coefficients().map(<[f64]>::to_vec),
            fit_quality: self.fit_quality().cloned(),
        }
    }

    /// Rebuild a model. Stored coefficients are trusted as-is, so a record
    /// that was fitted comes back fitted without refitting.
    pub fn from_record(record: CalibrationRecord) -> Self {
        let points = record.points;
        let fit = record
            .coefficients
            .filter(|c| !c.is_empty())
            .map(|coefficients| {
                let quality = record
                    .fit_quality
                    .unwrap_or_else(|| quality_of(&coefficients, &points));
                Arc::new(CalibrationFit {
                    order: coefficients.len() - 1,
                    coefficients,
                    quality,
                    pixel_range: pixel_range_of(&points),
                })
            });
        Self {
            order: record.polynomial_order.max(1),
            points,
            fit,
        }
    }
}

/// Serialized form of a [`CalibrationModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub polynomial_order: usize,
    pub points: Vec<CalibrationPoint>,
    #[serde(default)]
    pub coefficients: Option<Vec<f64>>,
    #[serde(default)]
    pub fit_quality: Option<FitQuality>,
}

/// Pair detected peaks, left to right, with known wavelengths in
/// ascending order. Extra peaks or wavelengths are ignored.
pub fn points_from_peaks(peaks: &[Peak], wavelengths: &[f64]) -> Vec<CalibrationPoint> {
    let mut positions: Vec<f64> = peaks.iter().map(|p| p.position).collect();
    positions.sort_by(f64::total_cmp);
    let mut wavelengths = wavelengths.to_vec();
    wavelengths.sort_by(f64::total_cmp);
    positions
        .into_iter()
        .zip(wavelengths)
        .map(|(pixel, wavelength)| {
            CalibrationPoint::new(pixel, wavelength).with_label(format!("{wavelength} nm"))
        })
        .collect()
}

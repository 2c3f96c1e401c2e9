//! Plain synchronous entry points of the extraction and calibration
//! pipeline.
//!
//! Every function takes its inputs by reference and returns a fresh
//! value; nothing is cached between calls.

use image::RgbImage;

use crate::calibration::{fit_polynomial, CalibrationFit, CalibrationModel, CalibrationPoint};
use crate::error::Result;
use crate::spectrum::{
    self, IntensityProfile, LineCandidate, LineLocator, PathGeometry, Peak, PeakParams,
    SourceImage,
};

/// Locate the spectrum with the default locator thresholds.
pub fn detect_line(image: &SourceImage) -> Result<LineCandidate> {
    LineLocator::default().detect(image)
}

pub fn extract_profile(
    image: &SourceImage,
    path: &PathGeometry,
    thickness: usize,
    smoothing_window: Option<usize>,
) -> Result<IntensityProfile> {
    spectrum::extract_profile(image, path, thickness, smoothing_window)
}

pub fn extract_color_strip(
    image: &SourceImage,
    path: &PathGeometry,
    thickness: usize,
    strip_height: u32,
) -> Result<RgbImage> {
    spectrum::extract_color_strip(image, path, thickness, strip_height)
}

pub fn detect_peaks(profile: &IntensityProfile, params: &PeakParams) -> Vec<Peak> {
    spectrum::detect_peaks(profile, params)
}

pub fn fit_calibration(points: &[CalibrationPoint], order: usize) -> Result<CalibrationFit> {
    fit_polynomial(points, order)
}

pub fn pixel_to_wavelength(model: &CalibrationModel, positions: &[f64]) -> Result<Vec<f64>> {
    model.pixel_to_wavelength(positions)
}

pub fn wavelength_to_pixel(model: &CalibrationModel, wavelength: f64) -> Result<f64> {
    model.wavelength_to_pixel(wavelength)
}

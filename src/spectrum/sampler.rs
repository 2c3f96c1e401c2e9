use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use super::geometry::PathGeometry;
use super::image::{Plane, SourceImage};
use super::smoothing;
use crate::error::{Result, SpectrumError};

/// Polynomial degree of the optional profile smoothing.
pub const PROFILE_SMOOTHING_DEGREE: usize = 2;

// ---------------------------------------------------------------------------
// IntensityProfile – the 1D cross-section
// ---------------------------------------------------------------------------

/// Intensity sampled along a path.
///
/// `positions` is non-decreasing: cumulative arc-length along the path in
/// whole-pixel steps. `intensities` has the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntensityProfile {
    positions: Vec<f64>,
    intensities: Vec<f64>,
}

impl IntensityProfile {
    /// Build a profile from matching position and intensity columns.
    ///
    /// Panics if the columns differ in length.
    pub fn new(positions: Vec<f64>, intensities: Vec<f64>) -> Self {
        assert_eq!(
            positions.len(),
            intensities.len(),
            "positions and intensities must have the same length"
        );
        IntensityProfile {
            positions,
            intensities,
        }
    }

    /// A profile whose positions are the sample indices.
    pub fn from_intensities(intensities: Vec<f64>) -> Self {
        let positions = (0..intensities.len()).map(|i| i as f64).collect();
        IntensityProfile {
            positions,
            intensities,
        }
    }

    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn intensities(&self) -> &[f64] {
        &self.intensities
    }

    /// `(position, intensity)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.positions
            .iter()
            .copied()
            .zip(self.intensities.iter().copied())
    }

    /// `(min, max)` of the intensities, `None` when empty.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        if self.is_empty() {
            return None;
        }
        Some(self.intensities.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(lo, hi), &v| (lo.min(v), hi.max(v)),
        ))
    }

    /// Peak-to-peak spread of the intensities (0 when empty).
    pub fn value_range(&self) -> f64 {
        self.min_max().map(|(lo, hi)| hi - lo).unwrap_or(0.0)
    }

    /// Position at a fractional sample index, interpolating linearly.
    pub fn position_at(&self, index: f64) -> f64 {
        if self.positions.is_empty() {
            return index;
        }
        let last = self.positions.len() - 1;
        let index = index.clamp(0.0, last as f64);
        let i0 = index.floor() as usize;
        let i1 = (i0 + 1).min(last);
        let t = index - i0 as f64;
        self.positions[i0] * (1.0 - t) + self.positions[i1] * t
    }

    /// A copy smoothed with a Savitzky–Golay filter.
    ///
    /// The window is forced odd and clipped to the profile length; profiles
    /// shorter than three samples come back unchanged.
    pub fn smoothed(&self, window: usize, degree: usize) -> IntensityProfile {
        IntensityProfile {
            positions: self.positions.clone(),
            intensities: smoothing::savgol_filter(&self.intensities, window, degree),
        }
    }
}

// ---------------------------------------------------------------------------
// Path walking
// ---------------------------------------------------------------------------

/// Perpendicular offsets of the cross-section samples, centred on the path.
fn cross_offsets(thickness: usize) -> Vec<f64> {
    if thickness <= 1 {
        return vec![0.0];
    }
    let half = thickness as f64 / 2.0;
    let step = thickness as f64 / (thickness - 1) as f64;
    (0..thickness).map(|i| -half + i as f64 * step).collect()
}

/// Visit every sampling station of `path`.
///
/// Each segment is walked in unit arc-length steps `s = 0 .. floor(len)`;
/// a segment shorter than one pixel contributes nothing. For every station
/// `visit` receives the sample coordinates across the path.
fn walk_path(path: &PathGeometry, thickness: usize, mut visit: impl FnMut(&[(f64, f64)])) {
    let offsets = cross_offsets(thickness);
    let mut coords = Vec::with_capacity(offsets.len());

    for (a, b) in path.segments() {
        let length = a.distance(&b);
        let steps = length.floor() as usize;
        if steps == 0 {
            continue;
        }
        let (tx, ty) = ((b.x - a.x) / length, (b.y - a.y) / length);
        let (px, py) = (-ty, tx);

        for s in 0..steps {
            let cx = a.x + tx * s as f64;
            let cy = a.y + ty * s as f64;
            coords.clear();
            coords.extend(offsets.iter().map(|&o| (cx + o * px, cy + o * py)));
            visit(&coords);
        }
    }
}

fn mean_sample(plane: &Plane, coords: &[(f64, f64)]) -> f64 {
    coords.iter().map(|&(x, y)| plane.sample(x, y)).sum::<f64>() / coords.len() as f64
}

fn check_thickness(thickness: usize) -> Result<()> {
    if thickness == 0 {
        return Err(SpectrumError::DegenerateGeometry(
            "sampling thickness must be at least 1".to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public sampling operations
// ---------------------------------------------------------------------------

/// Extract the luminance cross-section of `image` along `path`.
///
/// The image is decoded to linear light and reduced to BT.709 luminance.
/// At every unit step along the path, `thickness` bilinear samples spread
/// evenly across the path are averaged; positions accumulate across
/// polyline segments without a jump at the joins. With `smoothing_window`
/// set, the result is Savitzky–Golay smoothed.
pub fn extract_profile(
    image: &SourceImage,
    path: &PathGeometry,
    thickness: usize,
    smoothing_window: Option<usize>,
) -> Result<IntensityProfile> {
    check_thickness(thickness)?;
    let luma = image.luminance();

    let mut intensities = Vec::new();
    walk_path(path, thickness, |coords| {
        intensities.push(mean_sample(&luma, coords));
    });

    if intensities.is_empty() {
        return Err(SpectrumError::DegenerateGeometry(
            "every path segment is shorter than one pixel".to_string(),
        ));
    }

    let profile = IntensityProfile::from_intensities(intensities);
    log::debug!(
        "Extracted {} samples along {} segment(s), thickness {thickness}",
        profile.len(),
        path.points().len() - 1
    );

    Ok(match smoothing_window {
        Some(window) if window > 0 => profile.smoothed(window, PROFILE_SMOOTHING_DEGREE),
        _ => profile,
    })
}

/// Render the colours along `path` as a strip `strip_height` rows tall.
///
/// Uses the same geometry as [`extract_profile`] but averages each device
/// channel separately, so column `i` of the strip lines up with sample `i`
/// of the profile. Display only; never feeds calibration.
pub fn extract_color_strip(
    image: &SourceImage,
    path: &PathGeometry,
    thickness: usize,
    strip_height: u32,
) -> Result<RgbImage> {
    check_thickness(thickness)?;
    if strip_height == 0 {
        return Err(SpectrumError::DegenerateGeometry(
            "strip height must be at least 1".to_string(),
        ));
    }
    let channels = [image.channel(0), image.channel(1), image.channel(2)];

    let mut columns: Vec<[u8; 3]> = Vec::new();
    walk_path(path, thickness, |coords| {
        columns.push(channels.each_ref().map(|plane| {
            (mean_sample(plane, coords).clamp(0.0, 1.0) * 255.0).round() as u8
        }));
    });

    if columns.is_empty() {
        return Err(SpectrumError::DegenerateGeometry(
            "every path segment is shorter than one pixel".to_string(),
        ));
    }

    Ok(RgbImage::from_fn(columns.len() as u32, strip_height, |x, _| {
        Rgb(columns[x as usize])
    }))
}

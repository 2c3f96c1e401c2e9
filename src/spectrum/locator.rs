use serde::{Deserialize, Serialize};

use super::edges::{self, HoughParams, Segment};
use super::geometry::{LineCandidate, LocatorMethod, PathGeometry, Point};
use super::image::{Plane, SourceImage};
use super::smoothing::gaussian_filter1d;
use crate::color;
use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Thresholds of both locator strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Gaussian sigma of the row profile, as a fraction of image height.
    pub smoothing_sigma_fraction: f64,
    /// The smoothed peak must exceed the profile mean by this factor.
    pub min_peak_ratio: f64,
    /// Widest accepted bright band, as a fraction of image height.
    pub max_band_fraction: f64,
    /// Brightness candidates at or below this confidence fall through.
    pub brightness_accept: f64,
    pub canny_low: f32,
    pub canny_high: f32,
    pub hough_threshold: i32,
    pub min_line_length: f64,
    pub max_line_gap: usize,
    /// Segments within this many degrees of horizontal get the bonus.
    pub horizontal_tolerance_deg: f64,
    pub horizontal_bonus: f64,
    pub seed: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            smoothing_sigma_fraction: 0.02,
            min_peak_ratio: 1.2,
            max_band_fraction: 0.3,
            brightness_accept: 0.5,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_threshold: 50,
            min_line_length: 100.0,
            max_line_gap: 10,
            horizontal_tolerance_deg: 20.0,
            horizontal_bonus: 1.5,
            seed: HoughParams::default().seed,
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy list
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Strategy {
    Brightness,
    Edges,
}

#[derive(Debug, Clone, Copy)]
enum Acceptance {
    Any,
    Above(f64),
}

impl Acceptance {
    fn accepts(self, candidate: &LineCandidate) -> bool {
        match self {
            Acceptance::Any => true,
            Acceptance::Above(min) => candidate.confidence > min,
        }
    }
}

/// Automatic spectrum-line locator.
///
/// Strategies are tried in order until one produces a candidate that
/// clears its acceptance rule: first the brightest horizontal band, then
/// the strongest (preferably horizontal) straight edge.
#[derive(Debug, Clone, Default)]
pub struct LineLocator {
    config: LocatorConfig,
}

impl LineLocator {
    pub fn new(config: LocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    fn strategies(&self) -> [(Strategy, Acceptance); 2] {
        [
            (
                Strategy::Brightness,
                Acceptance::Above(self.config.brightness_accept),
            ),
            (Strategy::Edges, Acceptance::Any),
        ]
    }

    /// Propose a sampling path for the spectrum in `image`.
    pub fn detect(&self, image: &SourceImage) -> Result<LineCandidate> {
        let luminance = image.luminance();
        for (strategy, acceptance) in self.strategies() {
            let candidate = match strategy {
                Strategy::Brightness => self.detect_by_brightness(&luminance),
                Strategy::Edges => self.detect_by_edges(&display_gray(&luminance)),
            };
            match candidate {
                Some(c) if acceptance.accepts(&c) => {
                    log::info!(
                        "Detected spectrum line via {:?}: confidence {:.2}, angle {:?}",
                        c.method,
                        c.confidence,
                        c.angle
                    );
                    return Ok(c);
                }
                Some(c) => log::debug!(
                    "{strategy:?} candidate rejected (confidence {:.2})",
                    c.confidence
                ),
                None => log::debug!("{strategy:?} strategy found nothing"),
            }
        }
        log::warn!("No spectrum line detected");
        Err(SpectrumError::NoLineDetected)
    }

    /// Brightest horizontal band of a linear-luminance plane.
    pub fn detect_by_brightness(&self, luminance: &Plane) -> Option<LineCandidate> {
        let (width, height) = (luminance.width(), luminance.height());
        if width < 2 || height == 0 {
            return None;
        }
        let profile = gaussian_filter1d(
            &luminance.row_means(),
            height as f64 * self.config.smoothing_sigma_fraction,
        );

        let (peak_y, peak) = profile
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
        let mean = profile.iter().sum::<f64>() / profile.len() as f64;
        if mean <= f64::EPSILON || peak < mean * self.config.min_peak_ratio {
            return None;
        }

        // Walk out from the peak while the profile stays above half maximum.
        let half_max = (peak + mean) / 2.0;
        let above = |y: usize| profile[y] > half_max;
        let mut y_min = peak_y;
        while y_min > 0 && above(y_min) {
            y_min -= 1;
        }
        let mut y_max = peak_y;
        while y_max < height - 1 && above(y_max) {
            y_max += 1;
        }
        let band = y_max - y_min;
        if band as f64 > height as f64 * self.config.max_band_fraction {
            log::debug!("Bright band of {band} rows is too thick for a spectrum");
            return None;
        }

        let yc = ((y_min + y_max) / 2) as f64;
        let path = PathGeometry::straight(Point::new(0.0, yc), Point::new((width - 1) as f64, yc))
            .ok()?;
        Some(LineCandidate {
            path,
            confidence: ((peak - mean) / mean).min(1.0),
            curved: false,
            angle: Some(0.0),
            method: LocatorMethod::Brightness,
        })
    }

    /// Strongest straight edge of an 8-bit-scaled gray plane.
    pub fn detect_by_edges(&self, gray: &Plane) -> Option<LineCandidate> {
        let cfg = &self.config;
        let edge_map = edges::canny(gray, cfg.canny_low, cfg.canny_high);
        let params = HoughParams {
            threshold: cfg.hough_threshold,
            min_line_length: cfg.min_line_length,
            max_line_gap: cfg.max_line_gap,
            seed: cfg.seed,
            ..HoughParams::default()
        };
        let segments = edges::probabilistic_hough(&edge_map, &params);
        log::debug!("Line transform produced {} segments", segments.len());

        let best = segments
            .iter()
            .filter(|s| s.length() > 0.0)
            .max_by(|a, b| self.segment_score(a).total_cmp(&self.segment_score(b)))?;

        let path = PathGeometry::straight(best.start, best.end).ok()?;
        Some(LineCandidate {
            path,
            confidence: (best.length() / gray.width() as f64).min(1.0),
            curved: false,
            angle: Some(best.angle_deg()),
            method: LocatorMethod::Edges,
        })
    }
}

impl LineLocator {
    /// Segment length, boosted when the segment lies within the horizontal
    /// tolerance (inclusive) of either direction.
    fn segment_score(&self, segment: &Segment) -> f64 {
        let angle = segment.angle_deg().abs();
        let tol = self.config.horizontal_tolerance_deg;
        if angle <= tol || angle >= 180.0 - tol {
            segment.length() * self.config.horizontal_bonus
        } else {
            segment.length()
        }
    }
}

/// Display-referred luma on a 0..255 scale, the domain the Canny
/// thresholds are expressed in.
fn display_gray(luminance: &Plane) -> Plane {
    luminance.map(|v| color::to_gamma(v.clamp(0.0, 1.0)) * 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgb32FImage};

    fn image_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> f32) -> SourceImage {
        let rgb = Rgb32FImage::from_fn(w, h, |x, y| {
            let v = f(x, y);
            Rgb([v, v, v])
        });
        SourceImage::from_rgb32f(rgb).unwrap()
    }

    #[test]
    fn test_bright_band_is_found() {
        let img = image_from_fn(400, 120, |_, y| if (60..66).contains(&y) { 0.9 } else { 0.05 });
        let c = LineLocator::default().detect(&img).unwrap();
        assert_eq!(c.method, LocatorMethod::Brightness);
        assert!(c.confidence > 0.5);
        let p = c.path.points();
        assert_eq!(p[0].x, 0.0);
        assert_eq!(p[1].x, 399.0);
        assert!((p[0].y - 62.5).abs() <= 3.0, "y {}", p[0].y);
        assert_eq!(c.angle, Some(0.0));
    }

    #[test]
    fn test_thick_band_is_rejected_by_brightness() {
        let lum = Plane::from_fn(200, 100, |_, y| if y < 60 { 1.0 } else { 0.0 });
        assert!(LineLocator::default().detect_by_brightness(&lum).is_none());
    }

    #[test]
    fn test_black_image_has_no_brightness_candidate() {
        let lum = Plane::from_fn(50, 50, |_, _| 0.0);
        assert!(LineLocator::default().detect_by_brightness(&lum).is_none());
    }

    #[test]
    fn test_tilted_line_falls_back_to_edges() {
        // A thin bright diagonal stripe: no dominant row, but a strong edge.
        let img = image_from_fn(300, 300, |x, y| {
            let d = y as f32 - (0.5 * x as f32 + 40.0);
            if d.abs() < 3.0 {
                1.0
            } else {
                0.0
            }
        });
        let c = LineLocator::default().detect(&img).unwrap();
        assert_eq!(c.method, LocatorMethod::Edges);
        let angle = c.angle.unwrap();
        let slope_deg = 0.5f64.atan().to_degrees();
        assert!(
            (angle.abs() - slope_deg).abs() < 3.0 || (180.0 - angle.abs() - slope_deg).abs() < 3.0,
            "angle {angle}"
        );
        assert!(c.confidence > 0.3);
    }

    #[test]
    fn test_horizontal_segment_wins_over_longer_diagonal() {
        // ~283 px diagonal against a 250 px horizontal line: the bonus decides.
        let gray = Plane::from_fn(400, 400, |x, y| {
            let on_diagonal = (50..=250).contains(&x) && (y as i64 - x as i64).abs() <= 1;
            let on_horizontal = (100..350).contains(&x) && (304..=306).contains(&y);
            if on_diagonal || on_horizontal {
                255.0
            } else {
                0.0
            }
        });
        let c = LineLocator::default().detect_by_edges(&gray).unwrap();
        let angle = c.angle.unwrap();
        assert!(angle.abs() < 2.0 || angle.abs() > 178.0, "angle {angle}");
        for p in c.path.points() {
            assert!((p.y - 305.0).abs() <= 3.0, "y {}", p.y);
        }
    }

    #[test]
    fn test_tolerance_boundary_gets_bonus() {
        // Zero tolerance: only exactly horizontal segments sit on the boundary.
        let locator = LineLocator::new(LocatorConfig {
            horizontal_tolerance_deg: 0.0,
            ..LocatorConfig::default()
        });
        let bonus = locator.config().horizontal_bonus;
        let level = Segment {
            start: Point::new(0.0, 10.0),
            end: Point::new(100.0, 10.0),
        };
        assert_eq!(level.angle_deg(), 0.0);
        assert!((locator.segment_score(&level) - 100.0 * bonus).abs() < 1e-9);

        let tilted = Segment {
            start: Point::new(0.0, 10.0),
            end: Point::new(100.0, 11.0),
        };
        assert!((locator.segment_score(&tilted) - tilted.length()).abs() < 1e-9);
    }

    #[test]
    fn test_flat_image_is_not_detected() {
        let img = image_from_fn(200, 100, |_, _| 0.5);
        assert_eq!(
            LineLocator::default().detect(&img).unwrap_err(),
            SpectrumError::NoLineDetected
        );
    }

    #[test]
    fn test_config_roundtrips_with_defaults() {
        let cfg: LocatorConfig = serde_json::from_str(r#"{"canny_low": 30}"#).unwrap();
        assert_eq!(cfg.canny_low, 30.0);
        assert_eq!(cfg.hough_threshold, 50);
    }
}

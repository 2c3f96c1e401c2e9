use approx::assert_abs_diff_eq;
use image::{Rgb, Rgb32FImage};

use rusty_prism::calibration::{points_from_peaks, CalibrationModel, CalibrationPoint};
use rusty_prism::pipeline;
use rusty_prism::spectrum::{IntensityProfile, PathGeometry, PeakParams, Point, SourceImage};
use rusty_prism::SpectrumError;

fn gray_image(w: u32, h: u32, f: impl Fn(u32, u32) -> f32) -> SourceImage {
    let rgb = Rgb32FImage::from_fn(w, h, |x, y| {
        let v = f(x, y);
        Rgb([v, v, v])
    });
    SourceImage::from_rgb32f(rgb).unwrap()
}

fn horizontal(y: f64, width: u32) -> PathGeometry {
    PathGeometry::straight(Point::new(0.0, y), Point::new(width as f64 - 1.0, y)).unwrap()
}

#[test]
fn mid_gray_band_is_detected_near_horizontal() {
    let data: Vec<u8> = (0..100u32)
        .flat_map(|y| {
            let v = if (45..55).contains(&y) { 128 } else { 0 };
            std::iter::repeat(v).take(500)
        })
        .collect();
    let img = SourceImage::from_gray8(500, 100, &data).unwrap();

    let candidate = pipeline::detect_line(&img).unwrap();
    assert!(candidate.confidence > 0.0);
    let points = candidate.path.points();
    let first = points[0];
    let last = points[points.len() - 1];
    assert!((last.x - first.x).abs() > 400.0);
    assert!((last.y - first.y).abs() < 5.0);
    assert!((first.y - 49.5).abs() <= 6.0, "y {}", first.y);
}

#[test]
fn flat_image_reports_no_line() {
    let img = gray_image(200, 100, |_, _| 0.4);
    assert_eq!(
        pipeline::detect_line(&img).unwrap_err(),
        SpectrumError::NoLineDetected
    );
}

#[test]
fn uniform_image_gives_flat_profile() {
    let img = gray_image(120, 40, |_, _| 0.6);
    let profile = pipeline::extract_profile(&img, &horizontal(20.0, 120), 5, None).unwrap();
    assert!(!profile.is_empty());

    let n = profile.len() as f64;
    let mean = profile.intensities().iter().sum::<f64>() / n;
    let variance = profile
        .intensities()
        .iter()
        .map(|v| (v - mean).powi(2))
        .sum::<f64>()
        / n;
    assert!(variance < 1e-10, "variance {variance}");
}

#[test]
fn horizontal_gradient_gives_monotonic_profile() {
    let img = gray_image(200, 30, |x, _| x as f32 / 199.0);
    let profile = pipeline::extract_profile(&img, &horizontal(15.0, 200), 3, None).unwrap();
    for pair in profile.intensities().windows(2) {
        assert!(pair[1] >= pair[0] - 1e-9, "{} then {}", pair[0], pair[1]);
    }
    let (min, max) = profile.min_max().unwrap();
    assert!(max - min > 0.5);
}

#[test]
fn color_strip_matches_profile_length() {
    let img = gray_image(150, 40, |x, _| if x % 30 == 0 { 1.0 } else { 0.1 });
    let path = horizontal(20.0, 150);
    let profile = pipeline::extract_profile(&img, &path, 5, None).unwrap();
    let strip = pipeline::extract_color_strip(&img, &path, 5, 12).unwrap();
    assert_eq!(strip.width() as usize, profile.len());
    assert_eq!(strip.height(), 12);
}

#[test]
fn bumps_to_peaks_to_linear_calibration() {
    let centres = [100.0, 250.0, 400.0];
    let intensities: Vec<f64> = (0..500)
        .map(|i| {
            let x = i as f64;
            0.05 + centres
                .iter()
                .map(|c| (-(x - c).powi(2) / (2.0 * 4.0f64.powi(2))).exp())
                .sum::<f64>()
        })
        .collect();
    let profile = IntensityProfile::from_intensities(intensities);

    let mut peaks = pipeline::detect_peaks(&profile, &PeakParams::default());
    assert_eq!(peaks.len(), 3);
    peaks.sort_by(|a, b| a.position.total_cmp(&b.position));
    for (peak, centre) in peaks.iter().zip(centres) {
        assert_abs_diff_eq!(peak.position, centre, epsilon = 0.5);
    }

    let points = points_from_peaks(&peaks, &[650.0, 450.0, 550.0]);
    let fit = pipeline::fit_calibration(&points, 1).unwrap();
    assert!(fit.quality().r_squared > 0.999);

    let mut model = CalibrationModel::new(1);
    for p in &points {
        model.add_point(p.pixel, p.wavelength, p.label.clone());
    }
    model.fit(None).unwrap();

    let wavelengths = pipeline::pixel_to_wavelength(&model, &[250.0]).unwrap();
    assert_abs_diff_eq!(wavelengths[0], 550.0, epsilon = 0.5);
    let pixel = pipeline::wavelength_to_pixel(&model, 650.0).unwrap();
    assert_abs_diff_eq!(pixel, 400.0, epsilon = 0.5);
}

#[test]
fn single_point_cannot_be_fitted() {
    let points = [CalibrationPoint::new(10.0, 500.0)];
    assert_eq!(
        pipeline::fit_calibration(&points, 2).unwrap_err(),
        SpectrumError::InsufficientData { needed: 2, got: 1 }
    );
}

#[test]
fn unfitted_model_refuses_conversion() {
    let model = CalibrationModel::new(2);
    assert_eq!(
        pipeline::pixel_to_wavelength(&model, &[1.0]).unwrap_err(),
        SpectrumError::UnfittedModel
    );
}

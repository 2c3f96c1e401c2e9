//! Render a synthetic spectrum photograph plus its ground-truth reference
//! spectrum, for trying the calibrator without a spectroscope.
//!
//! ```text
//! cargo run --bin generate_sample [output_dir]
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use image::{Rgb, RgbImage};

use rusty_prism::color::wavelength_to_srgb;
use rusty_prism::export::record::X_UNIT_KEY;
use rusty_prism::export::{write_spectra, MetadataValue, SpectrumRecord};
use rusty_prism::rng::SimpleRng;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 300;
const BAND_HALF_HEIGHT: f64 = 12.0;
/// Rise of the band over the full image width.
const TILT: f64 = 18.0;

/// Wavelength range mapped linearly onto the image width.
const NM_START: f64 = 400.0;
const NM_END: f64 = 700.0;

/// Fluorescent-lamp emission lines: (nm, relative intensity, sigma px).
const LINES: [(f64, f64, f64); 6] = [
    (435.8, 0.9, 2.0),
    (487.7, 0.35, 2.5),
    (546.1, 1.0, 2.0),
    (577.0, 0.45, 2.0),
    (611.6, 0.8, 3.0),
    (631.1, 0.3, 2.5),
];

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn nm_to_x(nm: f64) -> f64 {
    (nm - NM_START) / (NM_END - NM_START) * (WIDTH - 1) as f64
}

fn x_to_nm(x: f64) -> f64 {
    NM_START + x / (WIDTH - 1) as f64 * (NM_END - NM_START)
}

/// Relative emission at column `x`: weak continuum plus the lamp lines.
fn emission(x: f64) -> f64 {
    let continuum = 0.05;
    continuum
        + LINES
            .iter()
            .map(|&(nm, amp, sigma)| gaussian(x, nm_to_x(nm), sigma, amp))
            .sum::<f64>()
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = SimpleRng::new(42);
    let centre = HEIGHT as f64 / 2.0;

    let img = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let xf = x as f64;
        let band_centre = centre - TILT / 2.0 + TILT * xf / (WIDTH - 1) as f64;
        let dy = (y as f64 - band_centre).abs();
        let profile = if dy <= BAND_HALF_HEIGHT {
            1.0
        } else {
            (-(dy - BAND_HALF_HEIGHT).powi(2) / 8.0).exp()
        };
        let level = (emission(xf) * profile).min(1.0);
        let hue = wavelength_to_srgb(x_to_nm(xf));
        let pixel = hue.map(|c| {
            let v = c as f64 * level + rng.gauss(4.0, 2.0);
            v.clamp(0.0, 255.0).round() as u8
        });
        Rgb(pixel)
    });

    let image_path = out_dir.join("sample_spectrum.png");
    img.save(&image_path)
        .with_context(|| format!("writing {}", image_path.display()))?;

    let x: Vec<f64> = (0..WIDTH).map(|i| x_to_nm(i as f64)).collect();
    let y: Vec<f64> = (0..WIDTH).map(|i| emission(i as f64)).collect();
    let mut metadata = BTreeMap::new();
    metadata.insert("name".to_string(), MetadataValue::from("sample ground truth"));
    metadata.insert(X_UNIT_KEY.to_string(), MetadataValue::from("nm"));
    let reference_path = out_dir.join("sample_reference.parquet");
    write_spectra(&reference_path, &[SpectrumRecord { x, y, metadata }])?;

    let known: Vec<String> = LINES.iter().map(|(nm, _, _)| format!("{nm}")).collect();
    println!(
        "Wrote {} ({WIDTH}×{HEIGHT}) and {}",
        image_path.display(),
        reference_path.display()
    );
    println!("Known lines (nm): {}", known.join(", "));
    Ok(())
}

use palette::{Hsl, IntoColor, Srgb};

// ---------------------------------------------------------------------------
// sRGB transfer function
// ---------------------------------------------------------------------------

/// BT.709 luminance weights. Only meaningful on linear-light RGB.
pub const BT709_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Decode one gamma-encoded component in [0, 1] to linear light.
#[inline]
pub fn to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Encode one linear-light component in [0, 1] back to device values.
#[inline]
pub fn to_gamma(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Photometric luminance of a linear RGB triple.
#[inline]
pub fn luminance(linear: [f32; 3]) -> f32 {
    BT709_WEIGHTS[0] * linear[0] + BT709_WEIGHTS[1] * linear[1] + BT709_WEIGHTS[2] * linear[2]
}

/// Decode a buffer of device components to linear light in place.
pub fn decode_in_place(values: &mut [f32]) {
    for v in values.iter_mut() {
        *v = to_linear(*v);
    }
}

// ---------------------------------------------------------------------------
// Display colours
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<[u8; 3]> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            [
                (rgb.red * 255.0) as u8,
                (rgb.green * 255.0) as u8,
                (rgb.blue * 255.0) as u8,
            ]
        })
        .collect()
}

/// Approximate display colour of a visible wavelength in nanometres.
///
/// Piecewise-linear hue ramp over 380..=780 nm with intensity falloff at
/// both ends of the visible range. Outside that range the result is grey.
pub fn wavelength_to_srgb(nm: f64) -> [u8; 3] {
    let (r, g, b) = match nm {
        w if (380.0..440.0).contains(&w) => (-(w - 440.0) / 60.0, 0.0, 1.0),
        w if (440.0..490.0).contains(&w) => (0.0, (w - 440.0) / 50.0, 1.0),
        w if (490.0..510.0).contains(&w) => (0.0, 1.0, -(w - 510.0) / 20.0),
        w if (510.0..580.0).contains(&w) => ((w - 510.0) / 70.0, 1.0, 0.0),
        w if (580.0..645.0).contains(&w) => (1.0, -(w - 645.0) / 65.0, 0.0),
        w if (645.0..=780.0).contains(&w) => (1.0, 0.0, 0.0),
        _ => return [128, 128, 128],
    };

    let falloff = if nm < 420.0 {
        0.3 + 0.7 * (nm - 380.0) / 40.0
    } else if nm > 700.0 {
        0.3 + 0.7 * (780.0 - nm) / 80.0
    } else {
        1.0
    };

    let channel = |c: f64| ((c * falloff).clamp(0.0, 1.0) * 255.0).round() as u8;
    [channel(r), channel(g), channel(b)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use palette::LinSrgb;

    #[test]
    fn test_round_trip() {
        for i in 0..=100 {
            let v = i as f32 / 100.0;
            assert_abs_diff_eq!(to_gamma(to_linear(v)), v, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_matches_palette_transfer() {
        for i in 0..=20 {
            let v = i as f32 / 20.0;
            let lin: LinSrgb<f32> = Srgb::new(v, v, v).into_linear();
            assert_abs_diff_eq!(to_linear(v), lin.red, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_branch_boundary() {
        assert_abs_diff_eq!(to_linear(0.04045), 0.04045 / 12.92, epsilon = 1e-7);
        assert_abs_diff_eq!(to_linear(1.0), 1.0, epsilon = 1e-6);
        assert_eq!(to_linear(0.0), 0.0);
    }

    #[test]
    fn test_luminance_weights_sum_to_one() {
        assert_abs_diff_eq!(luminance([1.0, 1.0, 1.0]), 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(luminance([0.0, 1.0, 0.0]), 0.7152, epsilon = 1e-6);
    }

    #[test]
    fn test_decode_in_place_matches_scalar() {
        let mut values = [0.0, 0.02, 0.5, 1.0];
        decode_in_place(&mut values);
        for (v, raw) in values.iter().zip([0.0, 0.02, 0.5, 1.0]) {
            assert_abs_diff_eq!(*v, to_linear(raw), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_mid_gray_is_darker_in_linear_light() {
        assert!(to_linear(0.5) < 0.25);
    }

    #[test]
    fn test_palette_size() {
        assert!(generate_palette(0).is_empty());
        assert_eq!(generate_palette(5).len(), 5);
    }

    #[test]
    fn test_wavelength_colours() {
        let green = wavelength_to_srgb(530.0);
        assert!(green[1] > green[0] && green[1] > green[2]);
        let red = wavelength_to_srgb(650.0);
        assert_eq!(red, [255, 0, 0]);
        assert_eq!(wavelength_to_srgb(1200.0), [128, 128, 128]);
    }
}

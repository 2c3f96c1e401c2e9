use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, Rgb32FImage, RgbImage};

use crate::color;
use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// Plane – one float channel of an image
// ---------------------------------------------------------------------------

/// A dense single-channel float raster, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Plane {
    /// Build a plane by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Plane {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Apply `f` to every value, returning a new plane.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Plane {
        Plane {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Bilinear interpolation at a sub-pixel coordinate.
    ///
    /// Coordinates outside the raster are clamped to the nearest edge pixel,
    /// so sampling near the border never fails.
    pub fn sample(&self, x: f64, y: f64) -> f64 {
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let x = if x.is_nan() { 0.0 } else { x.clamp(0.0, max_x) };
        let y = if y.is_nan() { 0.0 } else { y.clamp(0.0, max_y) };

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let top = self.get(x0, y0) as f64 * (1.0 - fx) + self.get(x1, y0) as f64 * fx;
        let bottom = self.get(x0, y1) as f64 * (1.0 - fx) + self.get(x1, y1) as f64 * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Mean value of every row, top to bottom.
    pub fn row_means(&self) -> Vec<f64> {
        if self.width == 0 {
            return Vec::new();
        }
        self.data
            .chunks(self.width)
            .map(|row| row.iter().map(|&v| v as f64).sum::<f64>() / self.width as f64)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// SourceImage – the photograph handed to the pipeline
// ---------------------------------------------------------------------------

/// Byte order of interleaved three-channel input buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// An immutable RGB image with device (gamma-encoded) components in [0, 1].
///
/// Every supported input encoding is normalised to this form once, at
/// ingestion. Grayscale input becomes R = G = B; alpha is dropped.
#[derive(Debug, Clone)]
pub struct SourceImage {
    rgb: Rgb32FImage,
}

impl SourceImage {
    /// Ingest any decoded image (8/16-bit or float, gray or colour).
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        Self::from_rgb32f(img.to_rgb32f())
    }

    /// Ingest a float RGB image whose components are already in [0, 1].
    pub fn from_rgb32f(rgb: Rgb32FImage) -> Result<Self> {
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(SpectrumError::DegenerateGeometry(
                "image has no pixels".to_string(),
            ));
        }
        Ok(SourceImage { rgb })
    }

    /// Ingest an interleaved 8-bit buffer with three channels.
    pub fn from_interleaved8(
        width: u32,
        height: u32,
        data: &[u8],
        order: ChannelOrder,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(SpectrumError::DegenerateGeometry(format!(
                "buffer holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        let floats: Vec<f32> = data
            .chunks_exact(3)
            .flat_map(|px| {
                let [a, b, c] = [px[0], px[1], px[2]].map(|v| v as f32 / 255.0);
                match order {
                    ChannelOrder::Rgb => [a, b, c],
                    ChannelOrder::Bgr => [c, b, a],
                }
            })
            .collect();
        Self::from_raw(width, height, floats)
    }

    /// Ingest a single-channel 8-bit buffer.
    pub fn from_gray8(width: u32, height: u32, data: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(SpectrumError::DegenerateGeometry(format!(
                "buffer holds {} bytes, expected {expected}",
                data.len()
            )));
        }
        let floats: Vec<f32> = data
            .iter()
            .flat_map(|&v| {
                let f = v as f32 / 255.0;
                [f, f, f]
            })
            .collect();
        Self::from_raw(width, height, floats)
    }

    fn from_raw(width: u32, height: u32, floats: Vec<f32>) -> Result<Self> {
        let rgb = Rgb32FImage::from_raw(width, height, floats).ok_or_else(|| {
            SpectrumError::DegenerateGeometry("buffer does not match dimensions".to_string())
        })?;
        Self::from_rgb32f(rgb)
    }

    /// Decode an image file from disk.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("decoding image {}", path.display()))?;
        Ok(Self::from_dynamic(&img)?)
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    /// Device-encoded RGB components.
    pub fn device_rgb(&self) -> &Rgb32FImage {
        &self.rgb
    }

    /// 8-bit copy for display.
    pub fn to_rgb8(&self) -> RgbImage {
        DynamicImage::ImageRgb32F(self.rgb.clone()).to_rgb8()
    }

    /// One device-encoded channel (0 = R, 1 = G, 2 = B).
    pub fn channel(&self, c: usize) -> Plane {
        Plane::from_fn(self.width() as usize, self.height() as usize, |x, y| {
            self.rgb.get_pixel(x as u32, y as u32).0[c]
        })
    }

    /// Photometric luminance in linear light.
    ///
    /// Components are gamma-decoded before the BT.709 weighting; weighting
    /// encoded values directly would bias every average taken downstream.
    pub fn luminance(&self) -> Plane {
        let mut linear = self.rgb.as_raw().clone();
        color::decode_in_place(&mut linear);
        let width = self.width() as usize;
        Plane::from_fn(width, self.height() as usize, |x, y| {
            let i = (y * width + x) * 3;
            color::luminance([linear[i], linear[i + 1], linear[i + 2]])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgb;

    fn ramp() -> Plane {
        Plane::from_fn(4, 3, |x, y| (x + 10 * y) as f32)
    }

    #[test]
    fn test_bilinear_midpoints() {
        let p = ramp();
        assert_abs_diff_eq!(p.sample(1.5, 0.0), 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(p.sample(0.0, 0.5), 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.sample(2.25, 1.5), 17.25, epsilon = 1e-9);
    }

    #[test]
    fn test_sampling_clamps_to_edges() {
        let p = ramp();
        assert_abs_diff_eq!(p.sample(-5.0, -5.0), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.sample(100.0, 100.0), 23.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.sample(3.0, 2.0), 23.0, epsilon = 1e-9);
    }

    #[test]
    fn test_row_means() {
        let means = ramp().row_means();
        assert_eq!(means, vec![1.5, 11.5, 21.5]);
    }

    #[test]
    fn test_bgr_buffer_is_swapped() {
        let img = SourceImage::from_interleaved8(1, 1, &[255, 0, 0], ChannelOrder::Bgr).unwrap();
        assert_eq!(img.device_rgb().get_pixel(0, 0).0, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_gray_buffer_replicates_channels() {
        let img = SourceImage::from_gray8(2, 1, &[0, 255]).unwrap();
        assert_eq!(img.device_rgb().get_pixel(1, 0).0, [1.0, 1.0, 1.0]);
        assert_abs_diff_eq!(img.luminance().get(1, 0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_luminance_is_linear_light() {
        let img = SourceImage::from_rgb32f(Rgb32FImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([0.5, 0.5, 0.5])
            } else {
                Rgb([0.0, 1.0, 0.0])
            }
        }))
        .unwrap();
        let lum = img.luminance();
        assert_abs_diff_eq!(lum.get(0, 0), color::to_linear(0.5), epsilon = 1e-6);
        assert_abs_diff_eq!(lum.get(1, 0), 0.7152, epsilon = 1e-6);
    }

    #[test]
    fn test_wrong_buffer_length_is_rejected() {
        assert!(SourceImage::from_gray8(2, 2, &[0, 1, 2]).is_err());
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let empty = Rgb32FImage::new(0, 0);
        assert!(SourceImage::from_rgb32f(empty).is_err());
    }
}

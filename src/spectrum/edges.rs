//! Edge detection and line-segment extraction for the edge-based locator.
//!
//! [`canny`] produces a binary edge map from an 8-bit-scaled gray plane;
//! [`probabilistic_hough`] extracts straight segments from it with the
//! progressive probabilistic Hough transform.

use std::f64::consts::PI;

use super::geometry::Point;
use super::image::Plane;
use crate::rng::SimpleRng;

/// Binary edge map, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    width: usize,
    height: usize,
    edges: Vec<bool>,
}

impl EdgeMap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_edge(&self, x: usize, y: usize) -> bool {
        self.edges[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.edges.iter().filter(|&&e| e).count()
    }
}

// ---------------------------------------------------------------------------
// Canny
// ---------------------------------------------------------------------------

/// Canny edge detector.
///
/// 3×3 Sobel gradients with replicated borders, L1 gradient magnitude,
/// non-maximum suppression along the quantised gradient direction, then
/// hysteresis: pixels above `high` seed edges, which grow through
/// 8-connected pixels above `low`. Thresholds are swapped if given in the
/// wrong order.
pub fn canny(gray: &Plane, low: f32, high: f32) -> EdgeMap {
    let (low, high) = if low <= high { (low, high) } else { (high, low) };
    let (w, h) = (gray.width(), gray.height());
    let mut edges = vec![false; w * h];
    if w < 3 || h < 3 {
        return EdgeMap {
            width: w,
            height: h,
            edges,
        };
    }

    let at = |x: isize, y: isize| -> f32 {
        let x = x.clamp(0, w as isize - 1) as usize;
        let y = y.clamp(0, h as isize - 1) as usize;
        gray.get(x, y)
    };

    let mut gx = vec![0f32; w * h];
    let mut gy = vec![0f32; w * h];
    let mut mag = vec![0f32; w * h];
    for y in 0..h as isize {
        for x in 0..w as isize {
            let dx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let dy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            let i = y as usize * w + x as usize;
            gx[i] = dx;
            gy[i] = dy;
            mag[i] = dx.abs() + dy.abs();
        }
    }

    // Non-maximum suppression; the one-pixel border never holds edges.
    let tan22 = (22.5f32).to_radians().tan();
    let tan67 = (67.5f32).to_radians().tan();
    let mut candidate = vec![false; w * h];
    let mut stack = Vec::new();
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let i = y * w + x;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let (ax, ay) = (gx[i].abs(), gy[i].abs());
            let is_max = if ay <= ax * tan22 {
                m > mag[i - 1] && m >= mag[i + 1]
            } else if ay > ax * tan67 {
                m > mag[i - w] && m >= mag[i + w]
            } else if (gx[i] > 0.0) == (gy[i] > 0.0) {
                m > mag[i - w - 1] && m > mag[i + w + 1]
            } else {
                m > mag[i - w + 1] && m > mag[i + w - 1]
            };
            if !is_max {
                continue;
            }
            candidate[i] = true;
            if m > high {
                edges[i] = true;
                stack.push(i);
            }
        }
    }

    // Hysteresis.
    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if candidate[j] && !edges[j] {
                    edges[j] = true;
                    stack.push(j);
                }
            }
        }
    }

    EdgeMap {
        width: w,
        height: h,
        edges,
    }
}

// ---------------------------------------------------------------------------
// Progressive probabilistic Hough transform
// ---------------------------------------------------------------------------

/// Parameters of [`probabilistic_hough`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughParams {
    /// Distance resolution of the accumulator, in pixels.
    pub rho: f64,
    /// Angle resolution of the accumulator, in radians.
    pub theta: f64,
    /// Accumulator votes needed before a line is traced.
    pub threshold: i32,
    /// Shortest segment reported, in pixels.
    pub min_line_length: f64,
    /// Largest run of non-edge pixels bridged while tracing.
    pub max_line_gap: usize,
    /// Seed of the random point order.
    pub seed: u64,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            rho: 1.0,
            theta: PI / 180.0,
            threshold: 50,
            min_line_length: 100.0,
            max_line_gap: 10,
            seed: 0x5eed,
        }
    }
}

/// A detected straight segment between two edge pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }

    /// Angle of `end - start` from the +x axis, in degrees (−180..=180).
    pub fn angle_deg(&self) -> f64 {
        (self.end.y - self.start.y)
            .atan2(self.end.x - self.start.x)
            .to_degrees()
    }
}

const SHIFT: i64 = 16;

/// Extract straight segments from an edge map.
///
/// Edge pixels are visited in random order. Each one votes in a (ρ, θ)
/// accumulator; once the strongest line through it reaches the vote
/// threshold, the line is traced in both directions across gaps of at most
/// `max_line_gap` pixels. Traced pixels are removed from the map (and their
/// votes withdrawn when the segment is long enough), so each pixel belongs
/// to at most one segment.
pub fn probabilistic_hough(edges: &EdgeMap, params: &HoughParams) -> Vec<Segment> {
    let (w, h) = (edges.width as i64, edges.height as i64);
    let num_angle = (PI / params.theta).round() as usize;
    let num_rho = (((w + h) * 2 + 1) as f64 / params.rho).round() as usize;
    if num_angle == 0 || num_rho == 0 {
        return Vec::new();
    }
    let half_rho = (num_rho as i64 - 1) / 2;
    let trig: Vec<(f64, f64)> = (0..num_angle)
        .map(|n| {
            let a = n as f64 * params.theta;
            (a.cos() / params.rho, a.sin() / params.rho)
        })
        .collect();

    let mut mask = edges.edges.clone();
    let mut accum = vec![0i32; num_angle * num_rho];
    let mut points: Vec<(i64, i64)> = (0..edges.height)
        .flat_map(|y| (0..edges.width).map(move |x| (x, y)))
        .filter(|&(x, y)| edges.is_edge(x, y))
        .map(|(x, y)| (x as i64, y as i64))
        .collect();

    let rho_index = |n: usize, x: i64, y: i64| -> usize {
        let (c, s) = trig[n];
        ((x as f64 * c + y as f64 * s).round() as i64 + half_rho) as usize
    };

    let mut rng = SimpleRng::new(params.seed);
    let mut segments = Vec::new();

    while !points.is_empty() {
        let pick = rng.below(points.len());
        let (px, py) = points.swap_remove(pick);
        if !mask[(py * w + px) as usize] {
            continue;
        }

        // Vote and find the strongest line through this point.
        let mut max_val = params.threshold - 1;
        let mut max_n = 0;
        for n in 0..num_angle {
            let slot = &mut accum[n * num_rho + rho_index(n, px, py)];
            *slot += 1;
            if *slot > max_val {
                max_val = *slot;
                max_n = n;
            }
        }
        if max_val < params.threshold {
            continue;
        }

        // Walk along the line direction in fixed point.
        let (c, s) = trig[max_n];
        let (a, b) = (-s, c);
        let (mut x0, mut y0) = (px, py);
        let (dx0, dy0, xflag);
        if a.abs() > b.abs() {
            xflag = true;
            dx0 = if a > 0.0 { 1 } else { -1 };
            dy0 = (b * (1i64 << SHIFT) as f64 / a.abs()).round() as i64;
            y0 = (y0 << SHIFT) + (1 << (SHIFT - 1));
        } else {
            xflag = false;
            dy0 = if b > 0.0 { 1 } else { -1 };
            dx0 = (a * (1i64 << SHIFT) as f64 / b.abs()).round() as i64;
            x0 = (x0 << SHIFT) + (1 << (SHIFT - 1));
        }
        let to_pixel = |x: i64, y: i64| -> (i64, i64) {
            if xflag {
                (x, y >> SHIFT)
            } else {
                (x >> SHIFT, y)
            }
        };

        let mut line_end = [(px, py); 2];
        for (k, end) in line_end.iter_mut().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut x, mut y) = (x0, y0);
            let mut gap = 0;
            loop {
                let (j1, i1) = to_pixel(x, y);
                if j1 < 0 || j1 >= w || i1 < 0 || i1 >= h {
                    break;
                }
                if mask[(i1 * w + j1) as usize] {
                    gap = 0;
                    *end = (j1, i1);
                } else {
                    gap += 1;
                    if gap > params.max_line_gap {
                        break;
                    }
                }
                x += dx;
                y += dy;
            }
        }

        let good_line = ((line_end[1].0 - line_end[0].0).abs() as f64) >= params.min_line_length
            || ((line_end[1].1 - line_end[0].1).abs() as f64) >= params.min_line_length;

        // Clear the traced pixels; withdraw their votes for accepted lines.
        for (k, end) in line_end.iter().enumerate() {
            let (dx, dy) = if k == 0 { (dx0, dy0) } else { (-dx0, -dy0) };
            let (mut x, mut y) = (x0, y0);
            loop {
                let (j1, i1) = to_pixel(x, y);
                if j1 < 0 || j1 >= w || i1 < 0 || i1 >= h {
                    break;
                }
                let idx = (i1 * w + j1) as usize;
                if mask[idx] {
                    if good_line {
                        for n in 0..num_angle {
                            accum[n * num_rho + rho_index(n, j1, i1)] -= 1;
                        }
                    }
                    mask[idx] = false;
                }
                if (j1, i1) == *end {
                    break;
                }
                x += dx;
                y += dy;
            }
        }

        if good_line {
            segments.push(Segment {
                start: Point::new(line_end[0].0 as f64, line_end[0].1 as f64),
                end: Point::new(line_end[1].0 as f64, line_end[1].1 as f64),
            });
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band_plane(w: usize, h: usize, rows: std::ops::Range<usize>) -> Plane {
        Plane::from_fn(w, h, |_, y| if rows.contains(&y) { 255.0 } else { 0.0 })
    }

    #[test]
    fn test_flat_plane_has_no_edges() {
        let flat = Plane::from_fn(50, 50, |_, _| 128.0);
        assert_eq!(canny(&flat, 50.0, 150.0).count(), 0);
    }

    #[test]
    fn test_step_edge_is_thin() {
        let plane = Plane::from_fn(40, 40, |x, _| if x < 20 { 0.0 } else { 255.0 });
        let edges = canny(&plane, 50.0, 150.0);
        assert!(edges.count() > 0);
        // Each interior row carries a single edge pixel after suppression.
        for y in 2..38 {
            let n = (0..40).filter(|&x| edges.is_edge(x, y)).count();
            assert_eq!(n, 1, "row {y}");
        }
    }

    #[test]
    fn test_hough_finds_band_edges() {
        let plane = band_plane(300, 80, 38..44);
        let edges = canny(&plane, 50.0, 150.0);
        let segments = probabilistic_hough(&edges, &HoughParams::default());
        assert!(!segments.is_empty());
        let longest = segments
            .iter()
            .max_by(|a, b| a.length().total_cmp(&b.length()))
            .unwrap();
        assert!(longest.length() >= 100.0);
        let angle = longest.angle_deg().abs();
        assert!(angle < 2.0 || angle > 178.0, "angle {angle}");
        let y = longest.start.y;
        assert!((36.0..=45.0).contains(&y), "y {y}");
    }

    #[test]
    fn test_hough_ignores_short_segments() {
        let plane = Plane::from_fn(300, 80, |x, y| {
            if (38..44).contains(&y) && (10..40).contains(&x) {
                255.0
            } else {
                0.0
            }
        });
        let edges = canny(&plane, 50.0, 150.0);
        assert!(probabilistic_hough(&edges, &HoughParams::default()).is_empty());
    }

    #[test]
    fn test_hough_is_deterministic() {
        let plane = band_plane(300, 80, 20..30);
        let edges = canny(&plane, 50.0, 150.0);
        let a = probabilistic_hough(&edges, &HoughParams::default());
        let b = probabilistic_hough(&edges, &HoughParams::default());
        assert_eq!(a, b);
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectrumError};

// ---------------------------------------------------------------------------
// Point
// ---------------------------------------------------------------------------

/// A position in image coordinates (x to the right, y down), in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Point { x, y }
    }
}

// ---------------------------------------------------------------------------
// PathGeometry – the sampling path
// ---------------------------------------------------------------------------

/// An ordered polyline of at least two points.
///
/// Two points describe a straight spectrum; more describe a curved one.
/// The path is immutable once built; callers replace it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct PathGeometry {
    points: Vec<Point>,
}

impl PathGeometry {
    /// Validate and build a path.
    ///
    /// Fails with [`SpectrumError::DegenerateGeometry`] for fewer than two
    /// points, non-finite coordinates, or two consecutive identical points.
    pub fn new(points: Vec<Point>) -> Result<Self> {
        if points.len() < 2 {
            return Err(SpectrumError::DegenerateGeometry(format!(
                "a path needs at least 2 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(SpectrumError::DegenerateGeometry(
                "path contains non-finite coordinates".to_string(),
            ));
        }
        if let Some(i) = points.windows(2).position(|w| w[0] == w[1]) {
            return Err(SpectrumError::DegenerateGeometry(format!(
                "points {i} and {} coincide",
                i + 1
            )));
        }
        Ok(PathGeometry { points })
    }

    /// A straight two-point path.
    pub fn straight(start: Point, end: Point) -> Result<Self> {
        Self::new(vec![start, end])
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// More than two points.
    pub fn is_curved(&self) -> bool {
        self.points.len() > 2
    }

    /// Consecutive point pairs.
    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }

    /// Total Euclidean length in pixels.
    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(&b)).sum()
    }
}

impl TryFrom<Vec<Point>> for PathGeometry {
    type Error = SpectrumError;

    fn try_from(points: Vec<Point>) -> Result<Self> {
        PathGeometry::new(points)
    }
}

impl From<PathGeometry> for Vec<Point> {
    fn from(path: PathGeometry) -> Self {
        path.points
    }
}

// ---------------------------------------------------------------------------
// LineCandidate – output of the line locator
// ---------------------------------------------------------------------------

/// Which locator strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocatorMethod {
    Brightness,
    Edges,
}

/// A proposed sampling path with a confidence score in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineCandidate {
    pub path: PathGeometry,
    pub confidence: f64,
    pub curved: bool,
    /// Angle from the +x axis in degrees; straight candidates only.
    pub angle: Option<f64>,
    pub method: LocatorMethod,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_needs_two_points() {
        let err = PathGeometry::new(vec![Point::new(0.0, 0.0)]).unwrap_err();
        assert!(matches!(err, SpectrumError::DegenerateGeometry(_)));
    }

    #[test]
    fn test_rejects_repeated_point() {
        let p = Point::new(3.0, 4.0);
        assert!(PathGeometry::new(vec![Point::new(0.0, 0.0), p, p]).is_err());
    }

    #[test]
    fn test_length_and_curvature() {
        let path = PathGeometry::new(vec![
            Point::new(0.0, 0.0),
            Point::new(3.0, 4.0),
            Point::new(3.0, 10.0),
        ])
        .unwrap();
        assert!(path.is_curved());
        assert_relative_eq!(path.length(), 11.0);
        assert_eq!(path.segments().count(), 2);
    }

    #[test]
    fn test_serde_validates() {
        let json = r#"[{"x":1.0,"y":2.0}]"#;
        assert!(serde_json::from_str::<PathGeometry>(json).is_err());
        let json = r#"[{"x":1.0,"y":2.0},{"x":5.0,"y":2.0}]"#;
        let path: PathGeometry = serde_json::from_str(json).unwrap();
        assert!(!path.is_curved());
    }
}

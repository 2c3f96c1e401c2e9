use std::collections::BTreeMap;
use std::fmt;

use chrono::{Local, SecondsFormat};

use crate::calibration::CalibrationFit;
use crate::spectrum::IntensityProfile;

// ---------------------------------------------------------------------------
// MetadataValue – a single metadata cell
// ---------------------------------------------------------------------------

/// A dynamically-typed metadata value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataValue::String(s) => write!(f, "{s}"),
            MetadataValue::Integer(i) => write!(f, "{i}"),
            MetadataValue::Float(v) => write!(f, "{v}"),
            MetadataValue::Bool(b) => write!(f, "{b}"),
            MetadataValue::Null => Ok(()),
        }
    }
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Float(v) => Some(*v),
            MetadataValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::String(s.to_string())
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Integer(v)
    }
}

// ---------------------------------------------------------------------------
// SpectrumRecord – one exported spectrum
// ---------------------------------------------------------------------------

/// Metadata key naming the unit of the `x` axis.
pub const X_UNIT_KEY: &str = "x_unit";

/// One spectrum in the x/y dataset schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpectrumRecord {
    /// Wavelength (nm) or position along the path (px).
    pub x: Vec<f64>,
    /// Intensity, same length as `x`.
    pub y: Vec<f64>,
    /// Metadata columns: column name → value.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl SpectrumRecord {
    /// Record for an extracted profile. With a calibration the x axis is in
    /// nanometres, otherwise in pixels along the path.
    pub fn from_profile(
        name: &str,
        profile: &IntensityProfile,
        calibration: Option<&CalibrationFit>,
    ) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("name".to_string(), MetadataValue::from(name));
        metadata.insert(
            "created".to_string(),
            MetadataValue::String(Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)),
        );

        let x = match calibration {
            Some(fit) => {
                metadata.insert(X_UNIT_KEY.to_string(), MetadataValue::from("nm"));
                metadata.insert(
                    "polynomial_order".to_string(),
                    MetadataValue::Integer(fit.order() as i64),
                );
                fit.pixel_to_wavelength(profile.positions())
            }
            None => {
                metadata.insert(X_UNIT_KEY.to_string(), MetadataValue::from("px"));
                profile.positions().to_vec()
            }
        };

        SpectrumRecord {
            x,
            y: profile.intensities().to_vec(),
            metadata,
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Display name: the `name` column when present.
    pub fn name(&self) -> Option<&str> {
        self.metadata.get("name").and_then(MetadataValue::as_str)
    }

    /// Whether the x axis is in nanometres.
    pub fn is_calibrated(&self) -> bool {
        self.metadata.get(X_UNIT_KEY).and_then(MetadataValue::as_str) == Some("nm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{fit_polynomial, CalibrationPoint};

    #[test]
    fn test_pixel_axis_without_calibration() {
        let profile = IntensityProfile::from_intensities(vec![0.1, 0.5, 0.2]);
        let rec = SpectrumRecord::from_profile("lamp", &profile, None);
        assert_eq!(rec.x, vec![0.0, 1.0, 2.0]);
        assert_eq!(rec.name(), Some("lamp"));
        assert!(!rec.is_calibrated());
    }

    #[test]
    fn test_wavelength_axis_with_calibration() {
        let fit = fit_polynomial(
            &[CalibrationPoint::new(0.0, 400.0), CalibrationPoint::new(2.0, 410.0)],
            1,
        )
        .unwrap();
        let profile = IntensityProfile::from_intensities(vec![0.1, 0.5, 0.2]);
        let rec = SpectrumRecord::from_profile("lamp", &profile, Some(&fit));
        assert!(rec.is_calibrated());
        assert!((rec.x[1] - 405.0).abs() < 1e-9);
        assert_eq!(rec.metadata["polynomial_order"], MetadataValue::Integer(1));
    }
}

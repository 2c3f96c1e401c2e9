use thiserror::Error;

// ---------------------------------------------------------------------------
// Pipeline error taxonomy
// ---------------------------------------------------------------------------

/// Failures surfaced by the extraction and calibration pipeline.
///
/// Only three situations are recovered silently inside the pipeline:
/// sampling coordinates clamped to the image border, the locator falling
/// back from the brightness strategy to the edge strategy, and the fit
/// lowering the polynomial order when there are too few points. Everything
/// else ends up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpectrumError {
    /// A fit was attempted with fewer points than the minimum.
    #[error("need at least {needed} calibration points, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Neither the brightness nor the edge strategy found a spectrum line.
    #[error("no spectrum line detected in the image")]
    NoLineDetected,

    /// The sampling path cannot produce samples.
    #[error("degenerate sampling geometry: {0}")]
    DegenerateGeometry(String),

    /// A mapping was requested from a model with no valid fit.
    #[error("calibration model is not fitted")]
    UnfittedModel,

    /// Inverse mapping failed to converge.
    #[error("numeric instability: {0}")]
    NumericInstability(String),
}

impl SpectrumError {
    /// Text suitable for the status line of the GUI.
    pub fn user_message(&self) -> String {
        match self {
            SpectrumError::NoLineDetected => "Could not detect a spectrum line in the image. \
                 Draw the line manually, make sure the spectrum is clearly visible, \
                 or check image brightness and contrast."
                .to_string(),
            SpectrumError::InsufficientData { needed, got } => format!(
                "Calibration needs at least {needed} points with distinct pixel positions \
                 (currently {got})."
            ),
            SpectrumError::UnfittedModel => {
                "Fit the calibration before converting to wavelengths.".to_string()
            }
            SpectrumError::DegenerateGeometry(detail) => {
                format!("The sampling line is unusable: {detail}.")
            }
            SpectrumError::NumericInstability(detail) => {
                format!("Wavelength lookup failed: {detail}.")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SpectrumError>;

/// Calibration layer: pixel → wavelength model, profile library, shared
/// current fit.
pub mod model;
pub mod profile;
pub mod shared;

pub use model::{
    fit_polynomial, points_from_peaks, CalibrationFit, CalibrationModel, CalibrationPoint,
    CalibrationRecord, FitQuality,
};
pub use profile::{ProfileStore, ProfileSummary};
pub use shared::CurrentCalibration;

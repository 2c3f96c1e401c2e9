use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbImage;
use serde_json::Map;

use rusty_prism::calibration::{
    points_from_peaks, CalibrationModel, CurrentCalibration, ProfileStore,
};
use rusty_prism::config::AppConfig;
use rusty_prism::export::{self, SpectrumRecord};
use rusty_prism::spectrum::{
    self, IntensityProfile, LineCandidate, LineLocator, PathGeometry, Peak, Point, SourceImage,
};
use rusty_prism::SpectrumError;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full UI state, independent of rendering.
pub struct AppState {
    pub config: AppConfig,
    pub config_path: PathBuf,

    /// Loaded photograph and where it came from.
    pub image: Option<SourceImage>,
    pub image_path: Option<PathBuf>,
    /// Bumped whenever `image` changes so the view re-uploads its texture.
    pub image_generation: u64,

    /// Sampling path under construction (image coordinates).
    pub path_points: Vec<Point>,
    /// When set, clicks on the image append path points.
    pub editing_path: bool,
    /// Last automatic detection result.
    pub candidate: Option<LineCandidate>,

    pub profile: Option<IntensityProfile>,
    pub strip: Option<RgbImage>,
    pub strip_generation: u64,
    pub peaks: Vec<Peak>,

    pub calibration: CalibrationModel,
    pub current: Arc<CurrentCalibration>,
    pub profiles: Option<ProfileStore>,

    /// Reference spectra overlaid on the plot.
    pub references: Vec<SpectrumRecord>,

    /// Text fields of the "add point" form.
    pub new_point_pixel: String,
    pub new_point_wavelength: String,
    /// Comma-separated known wavelengths for peak pairing.
    pub known_wavelengths: String,
    pub profile_name: String,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
    pub status_is_error: bool,
}

impl AppState {
    pub fn with_config(config: AppConfig, config_path: PathBuf) -> Self {
        let profiles = match ProfileStore::new(&config.calibration.profiles_dir) {
            Ok(store) => Some(store),
            Err(e) => {
                log::warn!("Profile library unavailable: {e:#}");
                None
            }
        };
        Self {
            calibration: CalibrationModel::new(config.calibration.polynomial_order),
            config,
            config_path,
            image: None,
            image_path: None,
            image_generation: 0,
            path_points: Vec::new(),
            editing_path: false,
            candidate: None,
            profile: None,
            strip: None,
            strip_generation: 0,
            peaks: Vec::new(),
            current: Arc::new(CurrentCalibration::new()),
            profiles,
            references: Vec::new(),
            new_point_pixel: String::new(),
            new_point_wavelength: String::new(),
            known_wavelengths: String::new(),
            profile_name: String::new(),
            status_message: None,
            status_is_error: false,
        }
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_is_error = false;
    }

    fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        log::error!("{msg}");
        self.status_message = Some(msg);
        self.status_is_error = true;
    }

    fn pipeline_error(&mut self, e: &SpectrumError) {
        self.error(e.user_message());
    }

    // -- image & path --

    pub fn open_image(&mut self, path: &Path) {
        match SourceImage::open(path) {
            Ok(img) => {
                log::info!(
                    "Opened {} ({}×{})",
                    path.display(),
                    img.width(),
                    img.height()
                );
                self.image = Some(img);
                self.image_path = Some(path.to_path_buf());
                self.image_generation += 1;
                self.clear_path();
                self.config.add_recent_file(path);
                self.info(format!("Opened {}", path.display()));
                if self.config.processing.auto_detect {
                    self.auto_detect();
                }
            }
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    /// Run the line locator and adopt its path.
    pub fn auto_detect(&mut self) {
        let Some(img) = &self.image else {
            self.error("Open an image first.");
            return;
        };
        match LineLocator::new(self.config.locator.clone()).detect(img) {
            Ok(candidate) => {
                self.path_points = candidate.path.points().to_vec();
                self.info(format!(
                    "Line detected ({:?}, confidence {:.2})",
                    candidate.method, candidate.confidence
                ));
                self.candidate = Some(candidate);
                self.refresh_profile();
            }
            Err(e) => self.pipeline_error(&e),
        }
    }

    pub fn add_path_point(&mut self, p: Point) {
        if self.path_points.last() == Some(&p) {
            return;
        }
        self.path_points.push(p);
        self.candidate = None;
        if self.path_points.len() >= 2 {
            self.refresh_profile();
        }
    }

    pub fn clear_path(&mut self) {
        self.path_points.clear();
        self.candidate = None;
        self.profile = None;
        self.strip = None;
        self.strip_generation += 1;
        self.peaks.clear();
    }

    /// Re-sample the profile and color strip along the current path.
    pub fn refresh_profile(&mut self) {
        let Some(img) = &self.image else {
            return;
        };
        let processing = &self.config.processing;
        let result = PathGeometry::new(self.path_points.clone()).and_then(|path| {
            let profile = spectrum::extract_profile(
                img,
                &path,
                processing.thickness,
                processing.smoothing_window,
            )?;
            let strip = spectrum::extract_color_strip(
                img,
                &path,
                processing.thickness,
                processing.strip_height,
            )?;
            Ok((profile, strip))
        });
        match result {
            Ok((profile, strip)) => {
                log::debug!("Extracted profile with {} samples", profile.len());
                self.profile = Some(profile);
                self.strip = Some(strip);
                self.strip_generation += 1;
                self.peaks.clear();
            }
            Err(e) => self.pipeline_error(&e),
        }
    }

    /// Profile as displayed: optionally Savitzky–Golay smoothed.
    pub fn display_profile(&self) -> Option<IntensityProfile> {
        let profile = self.profile.as_ref()?;
        let graph = &self.config.graph;
        Some(if graph.show_smoothed {
            profile.smoothed(graph.savgol_window, graph.savgol_order)
        } else {
            profile.clone()
        })
    }

    // -- peaks --

    pub fn find_peaks(&mut self) {
        let Some(profile) = &self.profile else {
            self.error("Extract a profile first.");
            return;
        };
        self.peaks = spectrum::detect_peaks(profile, &self.config.peaks);
        let n = self.peaks.len();
        self.info(format!("{n} peaks found"));
    }

    // -- calibration --

    fn calibration_changed(&mut self) {
        self.current.retract();
    }

    pub fn add_calibration_point(&mut self, pixel: f64, wavelength: f64, label: Option<String>) {
        self.calibration.add_point(pixel, wavelength, label);
        self.calibration_changed();
    }

    /// Parse the "add point" form fields and add the point.
    pub fn add_point_from_form(&mut self) {
        let pixel = self.new_point_pixel.trim().parse::<f64>();
        let wavelength = self.new_point_wavelength.trim().parse::<f64>();
        match (pixel, wavelength) {
            (Ok(p), Ok(w)) => {
                self.add_calibration_point(p, w, None);
                self.new_point_pixel.clear();
                self.new_point_wavelength.clear();
            }
            _ => self.error("Pixel and wavelength must be numbers."),
        }
    }

    /// Pair the detected peaks with the known wavelengths typed by the user.
    pub fn pair_peaks_with_wavelengths(&mut self) {
        let parsed: Result<Vec<f64>, _> = self
            .known_wavelengths
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<f64>)
            .collect();
        let Ok(wavelengths) = parsed else {
            self.error("Known wavelengths must be comma-separated numbers.");
            return;
        };
        let points = points_from_peaks(&self.peaks, &wavelengths);
        if points.is_empty() {
            self.error("Need detected peaks and known wavelengths to pair.");
            return;
        }
        let n = points.len();
        for p in points {
            self.calibration.add_point(p.pixel, p.wavelength, p.label);
        }
        self.calibration_changed();
        self.info(format!("Added {n} calibration points from peaks"));
    }

    pub fn remove_calibration_point(&mut self, index: usize) {
        if self.calibration.remove_point(index).is_some() {
            self.calibration_changed();
        }
    }

    pub fn clear_calibration(&mut self) {
        self.calibration.clear();
        self.calibration_changed();
    }

    pub fn set_polynomial_order(&mut self, order: usize) {
        self.calibration.set_order(order);
        self.config.calibration.polynomial_order = self.calibration.order();
        self.calibration_changed();
    }

    pub fn fit_calibration(&mut self) {
        match self.calibration.fit(None) {
            Ok(fit) => {
                self.info(format!(
                    "Calibrated (order {}, R² = {:.4})",
                    fit.order(),
                    fit.quality().r_squared
                ));
                self.current.publish(fit);
            }
            Err(e) => {
                self.calibration_changed();
                self.pipeline_error(&e);
            }
        }
    }

    /// Positions of the current profile mapped through the calibration, or
    /// the raw positions when uncalibrated.
    pub fn x_axis(&self, profile: &IntensityProfile) -> Vec<f64> {
        match self.current.current() {
            Some(fit) => fit.pixel_to_wavelength(profile.positions()),
            None => profile.positions().to_vec(),
        }
    }

    // -- profiles --

    pub fn save_profile(&mut self) {
        let name = self.profile_name.trim().to_string();
        let Some(store) = &self.profiles else {
            self.error("Profile library unavailable.");
            return;
        };
        let mut metadata = Map::new();
        if let Some(path) = &self.image_path {
            metadata.insert("source_image".into(), path.display().to_string().into());
        }
        match store.save(&self.calibration, &name, "", metadata) {
            Ok(path) => {
                self.config.add_recent_profile(&name);
                self.info(format!("Saved profile to {}", path.display()));
            }
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    pub fn load_profile(&mut self, name_or_path: &str) {
        let Some(store) = &self.profiles else {
            self.error("Profile library unavailable.");
            return;
        };
        match store.load(name_or_path) {
            Ok(model) => {
                self.calibration = model;
                match self.calibration.snapshot() {
                    Some(fit) => self.current.publish(fit),
                    None => self.calibration_changed(),
                }
                self.config.add_recent_profile(name_or_path);
                self.info(format!("Loaded profile {name_or_path}"));
            }
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    pub fn delete_profile(&mut self, name: &str) {
        let Some(store) = &self.profiles else {
            return;
        };
        if let Err(e) = store.delete(name) {
            self.error(format!("Error: {e:#}"));
        }
    }

    pub fn export_profile(&mut self, name: &str, destination: &Path) {
        let Some(store) = &self.profiles else {
            self.error("Profile library unavailable.");
            return;
        };
        match store.export(name, destination) {
            Ok(()) => self.info(format!("Exported profile to {}", destination.display())),
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    pub fn import_profile(&mut self, path: &Path) {
        let Some(store) = &self.profiles else {
            self.error("Profile library unavailable.");
            return;
        };
        match store.import(path, None) {
            Ok(stored) => self.info(format!("Imported profile to {}", stored.display())),
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    // -- export & references --

    pub fn export_spectrum(&mut self, path: &Path) {
        let Some(profile) = &self.profile else {
            self.error("Nothing to export yet.");
            return;
        };
        let name = self
            .image_path
            .as_ref()
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .unwrap_or("spectrum")
            .to_string();
        let fit = self.current.current();
        let record = SpectrumRecord::from_profile(&name, profile, fit.as_deref());
        match export::write_spectra(path, &[record]) {
            Ok(()) => self.info(format!("Exported spectrum to {}", path.display())),
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    pub fn load_reference(&mut self, path: &Path) {
        match export::load_spectra(path) {
            Ok(records) => {
                let n = records.len();
                self.references.extend(records);
                self.info(format!("Loaded {n} reference spectra"));
            }
            Err(e) => self.error(format!("Error: {e:#}")),
        }
    }

    pub fn save_config(&mut self) {
        if let Err(e) = self.config.save(&self.config_path) {
            self.error(format!("Error: {e:#}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgb32FImage};

    fn state_in(dir: &Path) -> AppState {
        let mut config = AppConfig::default();
        config.calibration.profiles_dir = dir.join("profiles");
        AppState::with_config(config, dir.join("cfg.json"))
    }

    fn band_image() -> SourceImage {
        let rgb = Rgb32FImage::from_fn(300, 80, |x, y| {
            let v = if (38..44).contains(&y) && x % 50 == 25 { 1.0 } else if (38..44).contains(&y) { 0.6 } else { 0.02 };
            Rgb([v, v, v])
        });
        SourceImage::from_rgb32f(rgb).unwrap()
    }

    #[test]
    fn test_detect_then_calibrate_flow() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        state.image = Some(band_image());

        state.auto_detect();
        assert_eq!(state.path_points.len(), 2);
        let profile = state.profile.clone().unwrap();
        assert_eq!(profile.len(), 299);

        state.add_calibration_point(25.0, 450.0, None);
        state.add_calibration_point(275.0, 650.0, None);
        state.set_polynomial_order(1);
        state.fit_calibration();
        assert!(state.current.current().is_some());
        let axis = state.x_axis(&profile);
        assert!((axis[25] - 450.0).abs() < 1e-6);

        state.remove_calibration_point(0);
        assert!(!state.current.current().is_some());
    }

    #[test]
    fn test_failed_detection_sets_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        let flat = Rgb32FImage::from_pixel(100, 50, Rgb([0.5, 0.5, 0.5]));
        state.image = Some(SourceImage::from_rgb32f(flat).unwrap());
        state.auto_detect();
        assert!(state.status_is_error);
        assert!(state.path_points.is_empty());
    }

    #[test]
    fn test_profile_save_and_reload_publishes_fit() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_in(dir.path());
        state.add_calibration_point(0.0, 400.0, None);
        state.add_calibration_point(100.0, 500.0, None);
        state.add_calibration_point(200.0, 650.0, None);
        state.fit_calibration();
        state.profile_name = "bench".into();
        state.save_profile();

        state.clear_calibration();
        assert!(!state.current.current().is_some());
        state.load_profile("bench");
        assert!(state.current.current().is_some());
        assert_eq!(state.calibration.points().len(), 3);
    }
}

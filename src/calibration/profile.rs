use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::model::{CalibrationModel, CalibrationRecord};

/// Default location of the profile library.
pub const DEFAULT_PROFILES_DIR: &str = "config/calibration_profiles";

// ---------------------------------------------------------------------------
// On-disk format
// ---------------------------------------------------------------------------

/// One saved calibration profile.
///
/// ```json
/// {
///   "name": "lab grating",
///   "description": "",
///   "created": "2024-05-01T14:03:11.120512+02:00",
///   "metadata": { "camera": "A7" },
///   "model": { "polynomial_order": 2, "points": [...], ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Creation timestamp. Kept as text: older files carry timestamps
    /// without an offset.
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub metadata: Map<String, JsonValue>,
    pub model: CalibrationRecord,
}

/// Listing entry returned by [`ProfileStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileSummary {
    pub name: String,
    pub description: String,
    pub created: String,
    pub path: PathBuf,
    pub num_points: usize,
}

// ---------------------------------------------------------------------------
// ProfileStore – a directory of profile files
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Open (and create if needed) a profile directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating profile directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_filename(name)))
    }

    /// Interpret `name_or_path` as an existing file first, then as a
    /// profile name inside the store.
    pub fn resolve(&self, name_or_path: &str) -> Result<PathBuf> {
        let direct = PathBuf::from(name_or_path);
        if direct.is_file() {
            return Ok(direct);
        }
        let named = self.path_for(name_or_path);
        if named.is_file() {
            return Ok(named);
        }
        bail!("Profile not found: {name_or_path}")
    }

    pub fn save(
        &self,
        model: &CalibrationModel,
        name: &str,
        description: &str,
        metadata: Map<String, JsonValue>,
    ) -> Result<PathBuf> {
        let profile = ProfileFile {
            name: name.to_string(),
            description: description.to_string(),
            created: Local::now().to_rfc3339_opts(SecondsFormat::Micros, false),
            metadata,
            model: model.to_record(),
        };
        let path = self.path_for(name);
        write_profile(&path, &profile)?;
        log::info!("Saved calibration profile: {}", path.display());
        Ok(path)
    }

    pub fn load(&self, name_or_path: &str) -> Result<CalibrationModel> {
        let path = self.resolve(name_or_path)?;
        let profile = read_profile(&path)?;
        log::info!("Loaded calibration profile: {}", path.display());
        Ok(CalibrationModel::from_record(profile.model))
    }

    /// All readable profiles, newest first. Files that fail to parse are
    /// skipped with a warning.
    pub fn list(&self) -> Result<Vec<ProfileSummary>> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("listing {}", self.dir.display()))?;

        let mut profiles = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_profile(&path) {
                Ok(p) => profiles.push(ProfileSummary {
                    name: p.name,
                    description: p.description,
                    created: p.created,
                    num_points: p.model.points.len(),
                    path,
                }),
                Err(e) => log::warn!("Failed to read profile {}: {e:#}", path.display()),
            }
        }
        profiles.sort_by(|a, b| b.created.cmp(&a.created));
        Ok(profiles)
    }

    /// Delete a profile. Returns `false` when it did not exist.
    pub fn delete(&self, name_or_path: &str) -> Result<bool> {
        let Ok(path) = self.resolve(name_or_path) else {
            log::warn!("Profile not found: {name_or_path}");
            return Ok(false);
        };
        std::fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
        log::info!("Deleted calibration profile: {}", path.display());
        Ok(true)
    }

    /// Copy a stored profile, unchanged, to `destination`.
    pub fn export(&self, name_or_path: &str, destination: &Path) -> Result<()> {
        let profile = read_profile(&self.resolve(name_or_path)?)?;
        write_profile(destination, &profile)?;
        log::info!("Exported profile to: {}", destination.display());
        Ok(())
    }

    /// Copy an external profile file into the store, optionally renaming
    /// it. Returns the stored path.
    pub fn import(&self, source: &Path, rename: Option<&str>) -> Result<PathBuf> {
        let mut profile = read_profile(source)?;
        if let Some(name) = rename {
            profile.name = name.to_string();
        }
        if profile.name.is_empty() {
            profile.name = source
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        let path = self.path_for(&profile.name);
        write_profile(&path, &profile)?;
        log::info!("Imported profile: {}", path.display());
        Ok(path)
    }
}

fn read_profile(path: &Path) -> Result<ProfileFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading profile {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing profile {}", path.display()))
}

fn write_profile(path: &Path, profile: &ProfileFile) -> Result<()> {
    let text = serde_json::to_string_pretty(profile).context("serializing profile")?;
    std::fs::write(path, text).with_context(|| format!("writing profile {}", path.display()))
}

/// Make a profile name safe to use as a file stem.
///
/// Path separators become `_`; everything except alphanumerics and
/// `. _ - space` is dropped; surrounding whitespace is trimmed.
pub fn sanitize_filename(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .filter(|&c| c.is_alphanumeric() || "._- ".contains(c))
        .collect();
    let safe = safe.trim();
    if safe.is_empty() {
        "unnamed_profile".to_string()
    } else {
        safe.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitted_model() -> CalibrationModel {
        let mut model = CalibrationModel::new(1);
        model.add_point(100.0, 450.0, Some("blue".into()));
        model.add_point(400.0, 650.0, None);
        model.fit(None).unwrap();
        model
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("  Hg lamp (2024)! "), "Hg lamp 2024");
        assert_eq!(sanitize_filename("??"), "unnamed_profile");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("profiles")).unwrap();
        let model = fitted_model();

        let path = store.save(&model, "lab/grating", "test", Map::new()).unwrap();
        assert_eq!(path.file_name().unwrap(), "lab_grating.json");

        let by_name = store.load("lab/grating").unwrap();
        assert_eq!(by_name, model);
        let by_path = store.load(path.to_str().unwrap()).unwrap();
        assert!(by_path.is_fitted());
    }

    #[test]
    fn test_list_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path()).unwrap();
        store.save(&fitted_model(), "first", "", Map::new()).unwrap();
        store.save(&CalibrationModel::default(), "second", "", Map::new()).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created >= listed[1].created);
        let first = listed.iter().find(|p| p.name == "first").unwrap();
        assert_eq!(first.num_points, 2);
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path()).unwrap();
        store.save(&fitted_model(), "gone", "", Map::new()).unwrap();
        assert!(store.delete("gone").unwrap());
        assert!(!store.delete("gone").unwrap());
        assert!(store.load("gone").is_err());
    }

    #[test]
    fn test_export_then_import_with_rename() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path().join("lib")).unwrap();
        store.save(&fitted_model(), "orig", "desc", Map::new()).unwrap();

        let exported = dir.path().join("shared.json");
        store.export("orig", &exported).unwrap();
        let path = store.import(&exported, Some("copy")).unwrap();
        assert_eq!(path, store.dir().join("copy.json"));
        assert_eq!(store.load("copy").unwrap(), store.load("orig").unwrap());
    }

    #[test]
    fn test_loads_profile_with_naive_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::new(dir.path()).unwrap();
        let json = r#"{
            "name": "legacy",
            "description": "",
            "created": "2023-11-02T10:15:00.000001",
            "metadata": {},
            "model": {"polynomial_order": 2, "points": [], "coefficients": null, "fit_quality": null}
        }"#;
        std::fs::write(dir.path().join("legacy.json"), json).unwrap();
        let model = store.load("legacy").unwrap();
        assert_eq!(model.order(), 2);
        assert!(!model.is_fitted());
    }
}

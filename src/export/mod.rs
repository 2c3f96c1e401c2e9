/// Export layer: calibrated spectra in the x/y dataset schema.
///
/// Architecture:
/// ```text
///   IntensityProfile + CalibrationFit
///        │
///        ▼
///   ┌──────────────┐
///   │SpectrumRecord │  x (nm or px), y, metadata
///   └──────────────┘
///        │                     ▲
///        ▼                     │
///   ┌──────────┐         ┌──────────┐
///   │  writer   │ ──────▶ │  reader   │  .parquet / .json / .csv
///   └──────────┘  file   └──────────┘  (reference overlays)
/// ```
pub mod reader;
pub mod record;
pub mod writer;

pub use reader::load_spectra;
pub use record::{MetadataValue, SpectrumRecord};
pub use writer::write_spectra;

/// Spectrum layer: image ingestion, line location, sampling, peaks.
///
/// Architecture:
/// ```text
///   photograph / frame
///        │
///        ▼
///   ┌─────────────┐
///   │ SourceImage  │  device RGB in [0,1], luminance planes
///   └─────────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ locator   │  brightness band → edges + line transform → LineCandidate
///   └──────────┘
///        │ PathGeometry
///        ▼
///   ┌──────────┐
///   │ sampler   │  perpendicular cross-sections → IntensityProfile, color strip
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  peaks    │  filtered local maxima → Vec<Peak>
///   └──────────┘
/// ```

pub mod edges;
pub mod geometry;
pub mod image;
pub mod locator;
pub mod peaks;
pub mod sampler;
pub mod smoothing;

pub use geometry::{LineCandidate, LocatorMethod, PathGeometry, Point};
pub use image::{ChannelOrder, Plane, SourceImage};
pub use locator::{LineLocator, LocatorConfig};
pub use peaks::{detect_peaks, fit_gaussian, GaussianFit, Peak, PeakParams};
pub use sampler::{extract_color_strip, extract_profile, IntensityProfile};

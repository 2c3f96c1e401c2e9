//! Spectrum extraction and wavelength calibration.
//!
//! The [`pipeline`] module exposes the plain synchronous operations; the
//! other modules hold the building blocks and the file-level layers used
//! by the desktop app (configuration, calibration profiles, export).

pub mod calibration;
pub mod color;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod rng;
pub mod spectrum;

pub use error::{Result, SpectrumError};

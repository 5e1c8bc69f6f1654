//! Turn dual-sensor thermal captures into a registered
//! RGB / thermal object-detection dataset.
//!
//! A FLIR One capture is a radiometric JPEG holding a visible
//! frame and a lower resolution thermal frame taken by a
//! sensor mounted next to the visible camera. This crate
//! prepares such captures, along with their YOLO style
//! labels, for training:
//!
//! 1. [Extract](capture::Extractor) the visible frame and the
//! raw sensor values, converting the latter to
//! [temperature]. Captures are read either directly from the
//! R-JPEG FFF segment or from `exiftool -b -j` output.
//!
//! 2. [Normalize](normalize) temperatures to 8-bit
//! intensities.
//!
//! 3. [Register](register) the thermal frame onto the
//! visible one with per-resolution [calibration] constants.
//!
//! 4. [Orient](orientation) the pair and its
//! [labels](label) so every item shares one layout.
//!
//! [`Pipeline`] runs these steps over a directory; the
//! `thermal-dataset` binary wraps it.
//!
//! ```rust
//! # fn test_compile() -> anyhow::Result<()> {
//! use thermal_dataset::{FlirExtractor, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder("captures").build()?;
//! let report = Pipeline::new(FlirExtractor, config).run()?;
//! println!("{} items written", report.processed.len());
//! # Ok(())
//! # }
//! ```
//!
//! The temperature conversion is a port of the [Thermimage
//! R library] and its [python port][read_thermal.py].
//!
//! [read_thermal.py]: //github.com/Nervengift/read_thermal.py/blob/master/flir_image_extractor.py
//! [Thermimage R library]: //github.com/gtatters/Thermimage/blob/master/R/raw2temp.R

#[macro_use]
mod parse;
pub(crate) mod flir;

pub mod error;
pub mod temperature;
pub mod exif;
pub mod capture;

pub mod normalize;
pub mod calibration;
pub mod warp;
pub mod register;
pub mod label;
pub mod orientation;
pub mod enhance;
pub mod viz;

pub mod pipeline;
pub mod logger;
pub mod cli;

pub use crate::calibration::{CalibrationProfile, CalibrationTable, Orientation};
pub use crate::capture::{Capture, ExiftoolExtractor, Extractor, FlirExtractor};
pub use crate::error::{DatasetError, Result};
pub use crate::exif::ThermalExiftoolJson;
pub use crate::label::BoundingBox;
pub use crate::pipeline::{BatchReport, Pipeline, PipelineConfig};
pub use crate::register::AlignedPair;

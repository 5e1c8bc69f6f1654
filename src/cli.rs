//! Helpers to parse CLI arguments in the accompanying
//! binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::path::Path;

pub use clap::{App, Arg};
pub use inflector::Inflector;
use itertools::Either;

use crate::{
    calibration::CalibrationTable,
    capture::{Capture, ExiftoolExtractor, Extractor, FlirExtractor},
    error::Result,
};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Either extractor, picked at runtime.
pub type GenericExtractor = Either<FlirExtractor, ExiftoolExtractor>;

impl Extractor for GenericExtractor {
    fn extract(&self, path: &Path) -> Result<Capture> {
        match self {
            Either::Left(flir) => flir.extract(path),
            Either::Right(exiftool) => exiftool.extract(path),
        }
    }
}

pub fn extractor(use_exiftool: bool) -> GenericExtractor {
    if use_exiftool {
        Either::Right(ExiftoolExtractor)
    } else {
        Either::Left(FlirExtractor)
    }
}

/// The table in `path`, or the built-in one.
pub fn calibration(path: Option<&Path>) -> Result<CalibrationTable> {
    match path {
        Some(path) => CalibrationTable::from_json_path(path),
        None => Ok(CalibrationTable::default()),
    }
}

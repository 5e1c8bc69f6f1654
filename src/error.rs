use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning captures into dataset items.
///
/// Everything except [`Io`](DatasetError::Io) on the batch
/// directories is scoped to a single capture: the pipeline
/// records it in the [`BatchReport`](crate::pipeline::BatchReport)
/// and moves on.
#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("thermal field has no dynamic range (min = max = {min})")]
    DegenerateInput { min: f64, max: f64 },

    #[error("no label file at {}", .0.display())]
    MissingLabel(PathBuf),

    #[error("malformed label in {}:{line}: {reason}", .path.display())]
    MalformedLabel {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("no calibration profile for RGB frame {width}x{height}")]
    UnsupportedResolution { height: u32, width: u32 },

    #[error("could not extract capture {}: {source:#}", .path.display())]
    Extraction {
        path: PathBuf,
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DatasetError>;

//! Map a temperature field onto 8-bit intensities.
use image::GrayImage;
use ndarray::Array2;
use tracing::warn;

use crate::error::{DatasetError, Result};

/// Finite min and max of a field, `None` if it has no finite
/// values.
pub fn finite_range(field: &Array2<f64>) -> Option<(f64, f64)> {
    field
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Linearly rescale `field` so that its minimum maps to 0 and
/// its maximum to 255, rounding to the nearest level.
/// Non-finite values map to 0.
///
/// Fails with [`DatasetError::DegenerateInput`] when the field
/// has no dynamic range.
pub fn try_normalize(field: &Array2<f64>) -> Result<Array2<u8>> {
    let (min, max) = finite_range(field).unwrap_or((0., 0.));
    if max <= min {
        return Err(DatasetError::DegenerateInput { min, max });
    }

    let scale = 255. / (max - min);
    Ok(field.mapv(|t| {
        if t.is_finite() {
            (scale * (t - min)).round().max(0.).min(255.) as u8
        } else {
            0
        }
    }))
}

/// [`try_normalize`], falling back to an all-zero image for
/// fields without dynamic range.
pub fn normalize(field: &Array2<f64>) -> Array2<u8> {
    try_normalize(field).unwrap_or_else(|e| {
        warn!("{}; using a blank thermal frame", e);
        Array2::zeros(field.dim())
    })
}

/// View a `height x width` array as a grayscale image.
pub fn to_gray_image(values: &Array2<u8>) -> GrayImage {
    let (height, width) = values.dim();
    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        image::Luma([values[(y as usize, x as usize)]])
    })
}

//! Align the thermal frame with the visible frame.
use image::{imageops, imageops::FilterType, GrayImage, RgbImage};
use ndarray::Array2;
use tracing::debug;

use crate::{
    calibration::{CalibrationProfile, CalibrationTable},
    error::Result,
    normalize::{normalize, to_gray_image},
    warp::warp_affine,
};

/// A visible frame and the thermal frame registered onto it.
#[derive(Debug, Clone)]
pub struct AlignedPair {
    pub rgb: RgbImage,
    pub thermal: GrayImage,
}

/// Scale a normalized thermal frame to `profile`'s fraction of
/// the RGB size, then shift it into place on an RGB-sized
/// canvas.
pub fn register_with_profile(
    thermal: &GrayImage,
    (rgb_width, rgb_height): (u32, u32),
    profile: &CalibrationProfile,
) -> GrayImage {
    let (scaled_width, scaled_height) = profile.scaled_size(rgb_width, rgb_height);
    let scaled = imageops::resize(thermal, scaled_width, scaled_height, FilterType::Triangle);
    warp_affine(&scaled, &profile.affine(), (rgb_width, rgb_height))
}

/// Normalize the temperature field and register it onto
/// `rgb` with the profile matching the RGB resolution.
pub fn register<'t>(
    rgb: RgbImage,
    thermal: &Array2<f64>,
    table: &'t CalibrationTable,
) -> Result<(AlignedPair, &'t CalibrationProfile)> {
    let (width, height) = rgb.dimensions();
    let profile = table.lookup(width, height)?;
    debug!(
        profile = %profile.name,
        width,
        height,
        "registering thermal frame"
    );

    let normalized = to_gray_image(&normalize(thermal));
    let thermal = register_with_profile(&normalized, (width, height), profile);
    Ok((AlignedPair { rgb, thermal }, profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{calibration::Orientation, error::DatasetError};

    fn profile(translation: (f64, f64)) -> CalibrationProfile {
        CalibrationProfile {
            name: "test".into(),
            rgb_height: 100,
            scale_factor: 0.81,
            translation,
            orientation: Orientation::Native,
        }
    }

    #[test]
    fn output_matches_rgb_shape() {
        let thermal = GrayImage::from_pixel(16, 12, image::Luma([200]));
        for &(w, h) in &[(100, 100), (37, 100), (160, 100), (1, 100)] {
            let out = register_with_profile(&thermal, (w, h), &profile((5., 7.)));
            assert_eq!(out.dimensions(), (w, h));
        }
    }

    #[test]
    fn translation_places_the_frame() {
        let thermal = GrayImage::from_pixel(16, 12, image::Luma([200]));
        let out = register_with_profile(&thermal, (100, 100), &profile((10., 20.)));

        // scaled frame is 81x81, shifted by (10, 20)
        assert_eq!(out.get_pixel(9, 50)[0], 0);
        assert_eq!(out.get_pixel(10, 20)[0], 200);
        assert_eq!(out.get_pixel(90, 100 - 1)[0], 200);
        assert_eq!(out.get_pixel(91, 50)[0], 0);
        assert_eq!(out.get_pixel(50, 19)[0], 0);
    }

    #[test]
    fn selects_profile_by_height() -> anyhow::Result<()> {
        let table = CalibrationTable::default();
        let field = Array2::from_shape_fn((12, 16), |(r, c)| (r * 16 + c) as f64);

        let (pair, profile) = register(RgbImage::new(1440, 1080), &field, &table)?;
        assert_eq!(profile.translation, (180., 85.));
        assert_eq!(pair.thermal.dimensions(), (1440, 1080));
        assert_eq!(pair.thermal.get_pixel(179, 500)[0], 0);

        let (pair, profile) = register(RgbImage::new(1080, 1440), &field, &table)?;
        assert_eq!(profile.translation, (120., 185.));
        assert_eq!(pair.thermal.dimensions(), (1080, 1440));
        Ok(())
    }

    #[test]
    fn unsupported_resolution_is_reported() {
        let field = Array2::from_shape_fn((2, 2), |(r, c)| (r + c) as f64);
        let table = CalibrationTable::default();
        let res = register(RgbImage::new(640, 480), &field, &table);
        assert!(matches!(
            res,
            Err(DatasetError::UnsupportedResolution { height: 480, .. })
        ));
    }
}

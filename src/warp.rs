//! Affine warping of single-channel images.
use image::{imageops, GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

use crate::calibration::AffineMatrix;

/// `m` as a projection of the source shifted by one pixel of
/// zero padding.
fn padded_projection(m: &AffineMatrix) -> Option<Projection> {
    let [[a, b, c], [d, e, f]] = *m;
    #[rustfmt::skip]
    let matrix = [
        a as f32, b as f32, c as f32,
        d as f32, e as f32, f as f32,
        0., 0., 1.,
    ];
    Projection::from_matrix(matrix).map(|p| Projection::translate(-1., -1.).and_then(p))
}

/// Warp `src` with the forward transform `m` onto a canvas of
/// `(width, height)`, bilinear.
///
/// Pixels mapping outside `src` are 0, and samples near the
/// edge blend with that zero border. A singular `m` gives a
/// blank canvas.
pub fn warp_affine(src: &GrayImage, m: &AffineMatrix, (width, height): (u32, u32)) -> GrayImage {
    let mut out = GrayImage::new(width, height);
    let projection = match padded_projection(m) {
        Some(projection) if width > 0 && height > 0 => projection,
        _ => return out,
    };

    // imageproc's bilinear sampler drops any sample with an
    // off-image neighbour
    let mut padded = GrayImage::new(src.width() + 2, src.height() + 2);
    imageops::replace(&mut padded, src, 1, 1);

    warp_into(&padded, &projection, Interpolation::Bilinear, Luma([0]), &mut out);
    out
}

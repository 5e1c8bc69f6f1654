//! Cosmetic adjustment of the visible frame.
use image::RgbImage;

/// Lookup table brightening (`gamma > 1`) or darkening
/// (`gamma < 1`) intensities: `((i / 255) ^ (1 / gamma)) * 255`,
/// truncated.
pub fn gamma_table(gamma: f64) -> [u8; 256] {
    let inv_gamma = 1. / gamma;
    let mut table = [0u8; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        *slot = ((i as f64 / 255.).powf(inv_gamma) * 255.).max(0.).min(255.) as u8;
    }
    table
}

/// Apply [`gamma_table`] to every channel of `rgb`.
pub fn adjust_gamma(rgb: &mut RgbImage, gamma: f64) {
    let table = gamma_table(gamma);
    for v in rgb.iter_mut() {
        *v = table[*v as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn unit_gamma_is_identity() {
        let table = gamma_table(1.);
        assert!(table.iter().enumerate().all(|(i, &v)| v as usize == i));
    }

    #[test]
    fn gamma_two_brightens() {
        let table = gamma_table(2.);
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
        // sqrt(64 / 255) * 255 = 127.75
        assert_eq!(table[64], 127);
        assert!(table.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn adjusts_every_channel() {
        let mut rgb = RgbImage::from_pixel(2, 2, Rgb([0, 64, 255]));
        adjust_gamma(&mut rgb, 2.);
        assert_eq!(rgb.get_pixel(1, 1), &Rgb([0, 127, 255]));
    }
}

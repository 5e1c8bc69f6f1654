//! Overlays for checking registration and labels by eye.
use image::{GrayImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
    error::{DatasetError, Result},
    label::{BoundingBox, PixelBox},
};

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Thermal intensity in the red channel, green and blue from
/// the visible frame. Misregistration shows up as red fringes.
pub fn composite(rgb: &RgbImage, thermal: &GrayImage) -> Result<RgbImage> {
    if rgb.dimensions() != thermal.dimensions() {
        let (width, height) = thermal.dimensions();
        return Err(DatasetError::Config(format!(
            "thermal frame is {}x{}, RGB frame is {}x{}",
            width,
            height,
            rgb.width(),
            rgb.height()
        )));
    }
    Ok(RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([_, g, b]) = *rgb.get_pixel(x, y);
        Rgb([thermal.get_pixel(x, y)[0], g, b])
    }))
}

/// Draw a pixel-unit box as a one pixel wide outline. Boxes
/// are clipped to the canvas.
pub fn draw_box(canvas: &mut RgbImage, bbox: &PixelBox, color: Rgb<u8>) {
    let (x, y) = bbox.origin();
    let width = bbox.width.round().max(1.) as u32;
    let height = bbox.height.round().max(1.) as u32;
    let rect = Rect::at(x.round() as i32, y.round() as i32).of_size(width, height);
    draw_hollow_rect_mut(canvas, rect, color);
}

/// Draw normalized boxes onto `canvas`.
pub fn draw_boxes(canvas: &mut RgbImage, boxes: &[BoundingBox], color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    for bbox in boxes {
        draw_box(canvas, &bbox.to_pixels(width, height), color);
    }
}

/// Composite of a dataset item with its boxes drawn on top.
pub fn render_preview(rgb: &RgbImage, thermal: &GrayImage, boxes: &[BoundingBox]) -> Result<RgbImage> {
    let mut canvas = composite(rgb, thermal)?;
    draw_boxes(&mut canvas, boxes, BOX_COLOR);
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn thermal_replaces_red() -> anyhow::Result<()> {
        let rgb = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let thermal = GrayImage::from_pixel(3, 2, Luma([200]));
        let out = composite(&rgb, &thermal)?;
        assert_eq!(out.get_pixel(2, 1), &Rgb([200, 20, 30]));
        Ok(())
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let rgb = RgbImage::new(3, 2);
        let thermal = GrayImage::new(2, 3);
        assert!(composite(&rgb, &thermal).is_err());
    }

    #[test]
    fn draws_box_outline() -> anyhow::Result<()> {
        let rgb = RgbImage::new(100, 50);
        let thermal = GrayImage::new(100, 50);
        let boxes = [BoundingBox {
            class_id: 0,
            x: 0.5,
            y: 0.5,
            width: 0.2,
            height: 0.4,
        }];

        let out = render_preview(&rgb, &thermal, &boxes)?;
        // 20x20 box with its top-left corner at (40, 15)
        assert_eq!(out.get_pixel(40, 15), &BOX_COLOR);
        assert_eq!(out.get_pixel(59, 34), &BOX_COLOR);
        assert_eq!(out.get_pixel(50, 15), &BOX_COLOR);
        assert_eq!(out.get_pixel(50, 25), &Rgb([0, 0, 0]));
        Ok(())
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() {
        let mut canvas = RgbImage::new(10, 10);
        let bbox = PixelBox {
            class_id: 1,
            x: 9.,
            y: 9.,
            width: 6.,
            height: 6.,
        };
        draw_box(&mut canvas, &bbox, BOX_COLOR);
        assert_eq!(canvas.get_pixel(6, 6), &BOX_COLOR);
    }
}

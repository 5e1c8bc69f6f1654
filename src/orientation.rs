//! Bring captures into the dataset's layout.
use image::imageops;

use crate::{calibration::Orientation, label::BoundingBox, register::AlignedPair};

/// Apply `orientation` to both frames of `pair`. Both frames
/// are turned with the same rotation so they stay registered.
pub fn orient_pair(pair: AlignedPair, orientation: Orientation) -> AlignedPair {
    match orientation {
        Orientation::Native => pair,
        Orientation::RotateQuarterTurn => AlignedPair {
            // 270 degrees clockwise is a quarter turn counter-clockwise
            rgb: imageops::rotate270(&pair.rgb),
            thermal: imageops::rotate270(&pair.thermal),
        },
    }
}

/// Apply `orientation` to every box.
pub fn orient_labels(boxes: &[BoundingBox], orientation: Orientation) -> Vec<BoundingBox> {
    match orientation {
        Orientation::Native => boxes.to_vec(),
        Orientation::RotateQuarterTurn => boxes.iter().map(BoundingBox::rotate_quarter_turn).collect(),
    }
}

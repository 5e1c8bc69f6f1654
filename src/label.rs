//! Bounding-box labels in normalized (YOLO) coordinates.
//!
//! A label file holds one box per line:
//! `class x_center y_center width height`, the spatial
//! fields as fractions of the image width and height.
use std::{
    fmt,
    fs::read_to_string,
    io::ErrorKind,
    path::Path,
    str::FromStr,
};

use crate::error::{DatasetError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A box in pixel units, centre and size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelBox {
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelBox {
    /// Top-left corner.
    pub fn origin(&self) -> (f64, f64) {
        (self.x - self.width / 2., self.y - self.height / 2.)
    }
}

impl BoundingBox {
    /// The same box after the image it annotates is turned a
    /// quarter turn counter-clockwise.
    ///
    /// Pixel `(x, y)` of a `W`-wide image lands on
    /// `(y, W - 1 - x)`; in normalized coordinates the centre
    /// moves to `(y, 1 - x)` and width and height swap.
    pub fn rotate_quarter_turn(&self) -> Self {
        BoundingBox {
            class_id: self.class_id,
            x: self.y,
            y: 1. - self.x,
            width: self.height,
            height: self.width,
        }
    }

    pub fn to_pixels(&self, image_width: u32, image_height: u32) -> PixelBox {
        let (w, h) = (image_width as f64, image_height as f64);
        PixelBox {
            class_id: self.class_id,
            x: self.x * w,
            y: self.y * h,
            width: self.width * w,
            height: self.height * h,
        }
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.class_id, self.x, self.y, self.width, self.height
        )
    }
}

impl FromStr for BoundingBox {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(format!("expected 5 fields, found {}", tokens.len()));
        }

        let class_id = tokens[0]
            .parse()
            .map_err(|_| format!("class id `{}` is not a non-negative integer", tokens[0]))?;
        let mut coords = [0f64; 4];
        for (slot, tok) in coords.iter_mut().zip(&tokens[1..]) {
            *slot = tok
                .parse()
                .map_err(|_| format!("coordinate `{}` is not a number", tok))?;
        }
        let [x, y, width, height] = coords;
        Ok(BoundingBox {
            class_id,
            x,
            y,
            width,
            height,
        })
    }
}

/// Parse the contents of a label file. Blank lines are
/// skipped; any other bad line fails the whole file.
pub fn parse_labels(text: &str, path: &Path) -> Result<Vec<BoundingBox>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            line.parse().map_err(|reason| DatasetError::MalformedLabel {
                path: path.to_path_buf(),
                line: idx + 1,
                reason,
            })
        })
        .collect()
}

/// Read and parse a label file, returning the raw text with
/// the parsed boxes.
pub fn read_labels(path: &Path) -> Result<(String, Vec<BoundingBox>)> {
    let text = match read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(DatasetError::MissingLabel(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let boxes = parse_labels(&text, path)?;
    Ok((text, boxes))
}

/// One line per box, newline-terminated.
pub fn format_labels(boxes: &[BoundingBox]) -> String {
    boxes.iter().map(|b| format!("{}\n", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn bbox(x: f64, y: f64, width: f64, height: f64) -> BoundingBox {
        BoundingBox {
            class_id: 0,
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn quarter_turn_worked_example() {
        let rotated = bbox(0.5, 0.2, 0.1, 0.4).rotate_quarter_turn();
        assert_abs_diff_eq!(rotated.x, 0.2);
        assert_abs_diff_eq!(rotated.y, 0.5);
        assert_abs_diff_eq!(rotated.width, 0.4);
        assert_abs_diff_eq!(rotated.height, 0.1);
        assert_eq!(rotated.class_id, 0);
    }

    #[test]
    fn four_quarter_turns_are_identity() {
        for &b in &[
            bbox(0.5, 0.2, 0.1, 0.4),
            bbox(0.13, 0.87, 0.05, 0.22),
            bbox(0.999, 0.001, 0.3, 0.7),
        ] {
            let back = b
                .rotate_quarter_turn()
                .rotate_quarter_turn()
                .rotate_quarter_turn()
                .rotate_quarter_turn();
            assert_abs_diff_eq!(back.x, b.x, epsilon = 1e-12);
            assert_abs_diff_eq!(back.y, b.y, epsilon = 1e-12);
            assert_abs_diff_eq!(back.width, b.width, epsilon = 1e-12);
            assert_abs_diff_eq!(back.height, b.height, epsilon = 1e-12);
        }
    }

    #[test]
    fn parses_and_formats_lines() -> anyhow::Result<()> {
        let text = "0 0.5 0.2 0.1 0.4\n\n3 0.25 0.75 0.125 0.0625\n";
        let boxes = parse_labels(text, Path::new("a.txt"))?;
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1].class_id, 3);
        assert_eq!(
            format_labels(&boxes),
            "0 0.5 0.2 0.1 0.4\n3 0.25 0.75 0.125 0.0625\n"
        );
        Ok(())
    }

    #[test]
    fn wrong_token_count_is_malformed() {
        let err = parse_labels("0 0.5 0.2 0.1 0.4\n0 0.5 0.2\n", Path::new("a.txt")).unwrap_err();
        match err {
            DatasetError::MalformedLabel { line, reason, .. } => {
                assert_eq!(line, 2);
                assert!(reason.contains("found 3"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn non_numeric_token_is_malformed() {
        for line in &["person 0.5 0.2 0.1 0.4", "0 0.5 abc 0.1 0.4", "-1 0.5 0.2 0.1 0.4"] {
            assert!(matches!(
                parse_labels(line, Path::new("a.txt")),
                Err(DatasetError::MalformedLabel { line: 1, .. })
            ));
        }
    }

    #[test]
    fn missing_file_is_reported() {
        assert!(matches!(
            read_labels(Path::new("/nonexistent/labels/FLIR0001.txt")),
            Err(DatasetError::MissingLabel(_))
        ));
    }

    #[test]
    fn pixel_box_origin() {
        let px = bbox(0.5, 0.25, 0.1, 0.5).to_pixels(200, 100);
        assert_eq!((px.x, px.y, px.width, px.height), (100., 25., 20., 50.));
        assert_eq!(px.origin(), (90., 0.));
    }
}

//! Fixed registration constants per camera resolution.
//!
//! The thermal and visible sensors of a FLIR One sit side by
//! side, so the thermal frame is scaled and shifted onto the
//! visible one with constants measured once per resolution.
//! The resolution also tells how the capture was held, and
//! therefore whether it has to be turned.
use std::{fs::File, io::BufReader, path::Path};

use serde_derive::*;

use crate::error::{DatasetError, Result};

/// Scale applied to the RGB frame size to get the size of the
/// thermal frame before translation.
pub const DEFAULT_SCALE_FACTOR: f64 = 0.81;

/// How a capture is laid out relative to the dataset.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Kept as captured.
    Native,
    /// Turned a quarter turn counter-clockwise, labels
    /// included.
    RotateQuarterTurn,
}

/// 2x3 affine matrix `[[a, b, c], [d, e, f]]` mapping source
/// pixel `(x, y)` to `(a x + b y + c, d x + e y + f)`.
pub type AffineMatrix = [[f64; 3]; 2];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationProfile {
    pub name: String,
    pub rgb_height: u32,
    #[serde(default = "default_scale_factor")]
    pub scale_factor: f64,
    /// `(dx, dy)` in RGB pixels.
    pub translation: (f64, f64),
    pub orientation: Orientation,
}

fn default_scale_factor() -> f64 {
    DEFAULT_SCALE_FACTOR
}

impl CalibrationProfile {
    pub fn affine(&self) -> AffineMatrix {
        let (dx, dy) = self.translation;
        [[1., 0., dx], [0., 1., dy]]
    }

    /// Size `(width, height)` of the scaled thermal frame for an
    /// RGB frame of the given size.
    pub fn scaled_size(&self, rgb_width: u32, rgb_height: u32) -> (u32, u32) {
        let scale = |v: u32| (self.scale_factor * v as f64).round().max(1.) as u32;
        (scale(rgb_width), scale(rgb_height))
    }
}

/// The known profiles, looked up by RGB frame height.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    profiles: Vec<CalibrationProfile>,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        CalibrationTable {
            profiles: vec![
                CalibrationProfile {
                    name: "landscape-1080".into(),
                    rgb_height: 1080,
                    scale_factor: DEFAULT_SCALE_FACTOR,
                    translation: (180., 85.),
                    orientation: Orientation::RotateQuarterTurn,
                },
                CalibrationProfile {
                    name: "portrait-1440".into(),
                    rgb_height: 1440,
                    scale_factor: DEFAULT_SCALE_FACTOR,
                    translation: (120., 185.),
                    orientation: Orientation::Native,
                },
            ],
        }
    }
}

impl CalibrationTable {
    pub fn new(profiles: Vec<CalibrationProfile>) -> Result<Self> {
        let table = CalibrationTable { profiles };
        table.validate()?;
        Ok(table)
    }

    /// Load a table from JSON:
    /// `{"profiles": [{"name": .., "rgb_height": .., "translation": [dx, dy], "orientation": "native"}]}`.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let table: CalibrationTable = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DatasetError::Config(format!("{}: {}", path.display(), e)))?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        if self.profiles.is_empty() {
            return Err(DatasetError::Config("calibration table is empty".into()));
        }
        for (idx, profile) in self.profiles.iter().enumerate() {
            if !(profile.scale_factor > 0. && profile.scale_factor <= 1.) {
                return Err(DatasetError::Config(format!(
                    "profile `{}`: scale factor must be within (0, 1], got {}",
                    profile.name, profile.scale_factor
                )));
            }
            if self.profiles[..idx]
                .iter()
                .any(|p| p.rgb_height == profile.rgb_height)
            {
                return Err(DatasetError::Config(format!(
                    "profile `{}`: duplicate RGB height {}",
                    profile.name, profile.rgb_height
                )));
            }
        }
        Ok(())
    }

    pub fn profiles(&self) -> &[CalibrationProfile] {
        &self.profiles
    }

    /// The profile for an RGB frame of the given size.
    pub fn lookup(&self, rgb_width: u32, rgb_height: u32) -> Result<&CalibrationProfile> {
        self.profiles
            .iter()
            .find(|p| p.rgb_height == rgb_height)
            .ok_or(DatasetError::UnsupportedResolution {
                height: rgb_height,
                width: rgb_width,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profiles() -> anyhow::Result<()> {
        let table = CalibrationTable::default();

        let wide = table.lookup(1440, 1080)?;
        assert_eq!(wide.affine(), [[1., 0., 180.], [0., 1., 85.]]);
        assert_eq!(wide.orientation, Orientation::RotateQuarterTurn);

        let tall = table.lookup(1080, 1440)?;
        assert_eq!(tall.affine(), [[1., 0., 120.], [0., 1., 185.]]);
        assert_eq!(tall.orientation, Orientation::Native);
        Ok(())
    }

    #[test]
    fn unknown_height_is_an_error() {
        let err = CalibrationTable::default().lookup(640, 480).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::UnsupportedResolution {
                height: 480,
                width: 640
            }
        ));
    }

    #[test]
    fn scaled_size_rounds() {
        let table = CalibrationTable::default();
        let profile = table.lookup(1440, 1080).unwrap();
        // 0.81 * 1440 = 1166.4, 0.81 * 1080 = 874.8
        assert_eq!(profile.scaled_size(1440, 1080), (1166, 875));
    }

    #[test]
    fn loads_json_table() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("calibration.json");
        std::fs::write(
            &path,
            r#"{"profiles": [
                {"name": "boson", "rgb_height": 512, "translation": [4, -2], "orientation": "native"}
            ]}"#,
        )?;

        let table = CalibrationTable::from_json_path(&path)?;
        let profile = table.lookup(640, 512)?;
        assert_eq!(profile.scale_factor, DEFAULT_SCALE_FACTOR);
        assert_eq!(profile.translation, (4., -2.));
        assert!(table.lookup(1440, 1080).is_err());
        Ok(())
    }

    #[test]
    fn rejects_duplicate_heights() {
        let mut profiles = CalibrationTable::default().profiles().to_vec();
        profiles.push(profiles[0].clone());
        assert!(matches!(
            CalibrationTable::new(profiles),
            Err(DatasetError::Config(_))
        ));
    }

    #[test]
    fn rejects_bad_scale() {
        let mut profiles = CalibrationTable::default().profiles().to_vec();
        profiles[1].scale_factor = 0.;
        assert!(CalibrationTable::new(profiles).is_err());
    }

    #[test]
    fn rejects_oversized_scale() {
        for &scale in &[1.5, 1e300, f64::INFINITY, f64::NAN] {
            let mut profiles = CalibrationTable::default().profiles().to_vec();
            profiles[0].scale_factor = scale;
            assert!(matches!(
                CalibrationTable::new(profiles),
                Err(DatasetError::Config(_))
            ));
        }
        let mut profiles = CalibrationTable::default().profiles().to_vec();
        profiles[0].scale_factor = 1.;
        assert!(CalibrationTable::new(profiles).is_ok());
    }
}

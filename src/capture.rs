//! Split a dual-sensor capture into its visible frame and
//! temperature field.
use std::{
    fs::{read, File},
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context};
use image::RgbImage;
use img_parts::jpeg::Jpeg;
use ndarray::Array2;

use crate::{
    error::{DatasetError, Result},
    exif::ThermalExiftoolJson,
    flir::FlirSegment,
    temperature::ThermalSettings,
};

/// One capture: the decoded visible frame and the
/// temperature (°C) of every thermal pixel.
#[derive(Debug, Clone)]
pub struct Capture {
    pub rgb: RgbImage,
    pub thermal: Array2<f64>,
}

/// Turns a capture file into a [`Capture`].
pub trait Extractor: Sync {
    fn extract(&self, path: &Path) -> Result<Capture>;
}

fn extraction_error(path: &Path) -> impl FnOnce(anyhow::Error) -> DatasetError + '_ {
    move |source| DatasetError::Extraction {
        path: path.to_path_buf(),
        source,
    }
}

fn decode_visible(bytes: &[u8]) -> anyhow::Result<RgbImage> {
    Ok(image::load_from_memory(bytes)
        .context("decoding embedded visible image")?
        .into_rgb8())
}

/// Reads FLIR R-JPEGs directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlirExtractor;

impl FlirExtractor {
    pub fn extract_jpeg(&self, jpeg: &Jpeg) -> anyhow::Result<Capture> {
        let segment = FlirSegment::try_from_jpeg(jpeg)?;
        let raw = segment
            .try_parse_raw_data()?
            .ok_or_else(|| anyhow!("no raw data found"))?;
        let settings: ThermalSettings = (&segment
            .try_parse_camera_params()?
            .ok_or_else(|| anyhow!("no camera params found"))?)
            .into();
        let rgb = decode_visible(
            segment
                .embedded_image()?
                .ok_or_else(|| anyhow!("no embedded visible image found"))?,
        )?;

        Ok(Capture {
            rgb,
            thermal: settings.temperature_field(&raw),
        })
    }
}

impl Extractor for FlirExtractor {
    fn extract(&self, path: &Path) -> Result<Capture> {
        let bytes = read(path)?;
        Jpeg::from_bytes(bytes.into())
            .map_err(anyhow::Error::from)
            .and_then(|jpeg| self.extract_jpeg(&jpeg))
            .map_err(extraction_error(path))
    }
}

/// Reads the `exiftool -b -j` JSON stored next to each
/// capture (`FLIR0001.jpg` → `FLIR0001.json`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ExiftoolExtractor;

impl ExiftoolExtractor {
    pub fn sidecar_path(path: &Path) -> PathBuf {
        path.with_extension("json")
    }

    pub fn extract_json(&self, json: &ThermalExiftoolJson) -> anyhow::Result<Capture> {
        let raw = json.raw_values()?;
        Ok(Capture {
            rgb: decode_visible(json.embedded_image())?,
            thermal: json.settings.temperature_field(&raw),
        })
    }
}

impl Extractor for ExiftoolExtractor {
    fn extract(&self, path: &Path) -> Result<Capture> {
        let sidecar = Self::sidecar_path(path);
        let file = File::open(&sidecar)?;
        ThermalExiftoolJson::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing {}", sidecar.display()))
            .and_then(|json| self.extract_json(&json))
            .map_err(extraction_error(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flir::tests::{camera_record, fff_blob, raw_record};
    use approx::assert_abs_diff_eq;
    use image::{codecs::jpeg::JpegEncoder, ColorType, DynamicImage, ImageOutputFormat, Rgb};
    use img_parts::{
        jpeg::{markers, JpegSegment},
        Bytes,
    };
    use std::io::Cursor;

    /// FFF data of a 3x2 capture: the top row reads 25 °C and
    /// the bottom row 35 °C under the ideal camera record, with
    /// a 5x4 PNG as the visible image.
    fn capture_fff() -> anyhow::Result<Vec<u8>> {
        let raw: Vec<u16> = vec![18365, 18365, 18365, 20337, 20337, 20337];
        let visible = RgbImage::from_pixel(5, 4, Rgb([10, 200, 30]));
        let mut embedded = vec![0u8; 0x20];
        DynamicImage::ImageRgb8(visible)
            .write_to(&mut Cursor::new(&mut embedded), ImageOutputFormat::Png)?;

        Ok(fff_blob(&[
            (0x20, 1, camera_record()),
            (0x01, 2, raw_record(3, 2, &raw)),
            (0x0e, 1, embedded),
        ]))
    }

    /// FLIR APP1 contents carrying `data` split in `count`
    /// numbered pieces.
    fn flir_segments(data: &[u8], count: usize) -> Vec<Vec<u8>> {
        let size = (data.len() + count - 1) / count;
        let pieces: Vec<&[u8]> = data.chunks(size).collect();
        let last = pieces.len() as u8 - 1;
        pieces
            .iter()
            .enumerate()
            .map(|(idx, piece)| {
                let mut contents = b"FLIR\0\x01".to_vec();
                contents.extend_from_slice(&[idx as u8, last]);
                contents.extend_from_slice(piece);
                contents
            })
            .collect()
    }

    /// A small baseline JPEG with `segments` as APP1 segments.
    fn rjpeg(segments: Vec<Vec<u8>>) -> anyhow::Result<Jpeg> {
        let mut bytes = vec![];
        JpegEncoder::new(&mut bytes).encode(&[0u8; 4 * 4 * 3], 4, 4, ColorType::Rgb8)?;
        let mut jpeg = Jpeg::from_bytes(bytes.into())?;
        for contents in segments.into_iter().rev() {
            jpeg.segments_mut()
                .insert(0, JpegSegment::new_with_contents(markers::APP1, Bytes::from(contents)));
        }
        Ok(jpeg)
    }

    #[test]
    fn extracts_rjpeg_from_unordered_segments() -> anyhow::Result<()> {
        let mut segments = flir_segments(&capture_fff()?, 3);
        segments.rotate_left(1);
        let capture = FlirExtractor.extract_jpeg(&rjpeg(segments)?)?;

        assert_eq!(capture.rgb.dimensions(), (5, 4));
        assert_eq!(capture.rgb.get_pixel(4, 3), &Rgb([10, 200, 30]));
        assert_eq!(capture.thermal.dim(), (2, 3));
        assert!(capture.thermal.iter().all(|t| t.is_finite()));
        assert_abs_diff_eq!(capture.thermal[(0, 0)], 25., epsilon = 0.05);
        assert_abs_diff_eq!(capture.thermal[(1, 2)], 35., epsilon = 0.05);
        Ok(())
    }

    #[test]
    fn extracts_rjpeg_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("FLIR0001.jpg");
        let mut bytes = vec![];
        rjpeg(flir_segments(&capture_fff()?, 2))?.encoder().write_to(&mut bytes)?;
        std::fs::write(&path, bytes)?;

        let capture = FlirExtractor.extract(&path)?;
        assert_eq!(capture.rgb.dimensions(), (5, 4));
        assert_eq!(capture.thermal.dim(), (2, 3));
        Ok(())
    }

    #[test]
    fn rejects_duplicate_and_missing_segments() -> anyhow::Result<()> {
        let segments = flir_segments(&capture_fff()?, 3);

        let mut duplicated = segments.clone();
        duplicated.insert(2, segments[1].clone());
        let err = FlirExtractor.extract_jpeg(&rjpeg(duplicated)?).unwrap_err();
        assert!(format!("{:#}", err).contains("duplicate FLIR segment"));

        let missing = vec![segments[0].clone(), segments[2].clone()];
        let err = FlirExtractor.extract_jpeg(&rjpeg(missing)?).unwrap_err();
        assert!(format!("{:#}", err).contains("missing FLIR segment: idx = 1"));

        let err = FlirExtractor.extract_jpeg(&rjpeg(vec![])?).unwrap_err();
        assert!(format!("{:#}", err).contains("no FLIR segments"));
        Ok(())
    }

    #[test]
    fn sidecar_sits_next_to_capture() {
        assert_eq!(
            ExiftoolExtractor::sidecar_path(Path::new("data/FLIR0001.jpg")),
            Path::new("data/FLIR0001.json")
        );
    }

    #[test]
    fn flir_extractor_reports_path_on_garbage() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not a jpeg")?;

        match FlirExtractor.extract(&path) {
            Err(DatasetError::Extraction { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
        Ok(())
    }

    #[test]
    fn missing_sidecar_is_io_error() {
        let res = ExiftoolExtractor.extract(Path::new("/nonexistent/FLIR0001.jpg"));
        assert!(matches!(res, Err(DatasetError::Io(_))));
    }
}

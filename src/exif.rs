//! Captures described by ExifTool JSON.
//!
//! `exiftool -b -j capture.jpg` dumps the FLIR metadata
//! together with base64-encoded binary tags: the raw
//! thermal image (PNG or TIFF) and the embedded visible
//! image.
use std::io::Read;

use anyhow::{bail, Context, Result};
use ndarray::Array2;
use serde_derive::*;

use crate::{flir::decode_png_raw, temperature::ThermalSettings};

#[derive(Deserialize, Debug)]
pub struct ThermalExiftoolJson {
    #[serde(flatten)]
    pub settings: ThermalSettings,

    #[serde(rename = "RawThermalImageType")]
    raw_type: String,

    #[serde(
        rename = "RawThermalImage",
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    raw_bytes: Vec<u8>,

    #[serde(
        rename = "EmbeddedImage",
        deserialize_with = "serde_helpers::base64_bytes"
    )]
    embedded_bytes: Vec<u8>,
}

impl ThermalExiftoolJson {
    /// Reads the first (and only expected) entry of an
    /// ExifTool JSON array.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Self> {
        let mut values: Vec<Self> = serde_json::from_reader(rdr)?;
        match values.len() {
            1 => Ok(values.remove(0)),
            n => bail!("expected exiftool json array with one item, found {}", n),
        }
    }

    /// Raw sensor values as a `height x width` array.
    pub fn raw_values(&self) -> Result<Array2<f64>> {
        match self.raw_type.as_str() {
            "PNG" => decode_png_raw(&self.raw_bytes),
            "TIFF" => {
                let tiff = image::load_from_memory_with_format(
                    &self.raw_bytes,
                    image::ImageFormat::Tiff,
                )
                .context("decoding TIFF raw data")?
                .into_luma16();
                let (width, height) = tiff.dimensions();
                let values = tiff.into_raw().into_iter().map(f64::from).collect();
                Ok(Array2::from_shape_vec(
                    (height as usize, width as usize),
                    values,
                )?)
            }
            ty => bail!("unsupported raw thermal image type: {}", ty),
        }
    }

    pub fn embedded_image(&self) -> &[u8] {
        &self.embedded_bytes
    }
}

mod serde_helpers {
    use lazy_static::lazy_static;
    use regex::Regex;
    use serde::*;

    pub fn base64_bytes<'de, D>(de: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^base64:").unwrap();
        }

        use serde::de::Error;
        let str_rep = <String as Deserialize>::deserialize(de)?;

        let prefix = RE
            .find(&str_rep)
            .ok_or_else(|| Error::custom("unexpected format: must begin with `base64:`"))?;

        base64::decode(&str_rep[prefix.end()..]).map_err(Error::custom)
    }
}

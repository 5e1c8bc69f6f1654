//! Parse FLIR R-JPEGs.
//!
//! This is an incomplete port of the FLIR parts of the
//! excellent [ExifTool] by Phil Harvey. It reads the FFF
//! record directory spread over the APP1 segments and knows
//! three record types: the raw sensor values, the camera
//! parameters needed to compute temperatures from them, and
//! the embedded visible-light image.
//!
//! [ExifTool]: //exiftool.org
use anyhow::{anyhow, bail, ensure, Context, Result};
use img_parts::jpeg::{markers, Jpeg};
use ndarray::Array2;

use crate::parse::parse_at;

const RECORD_RAW_DATA: u16 = 0x01;
const RECORD_EMBEDDED_IMAGE: u16 = 0x0e;
const RECORD_CAMERA_INFO: u16 = 0x20;

/// Image payloads (raw data, embedded image) start after a
/// 32 byte header.
const PAYLOAD_OFFSET: usize = 0x20;

/// Data collected from the FLIR segment(s) of an R-JPEG.
#[derive(Debug)]
pub struct FlirSegment {
    data: Vec<u8>,
    dir: Vec<FlirRecordDirEntry>,
}

impl FlirSegment {
    /// Collect all the FLIR segments of a [`Jpeg`] and parse
    /// the FFF record directory.
    pub fn try_from_jpeg(image: &Jpeg) -> Result<Self> {
        let data = collect_flir_segment_data_from_jpeg(image)?;
        Self::try_from_fff(data)
    }

    /// Parse the record directory of concatenated FFF data.
    pub fn try_from_fff(data: Vec<u8>) -> Result<Self> {
        let dir = parse_flir_directory(&data)?;
        Ok(FlirSegment { data, dir })
    }

    fn record(&self, ty: u16) -> Result<Option<(&FlirRecordDirEntry, &[u8])>> {
        match self.dir.iter().find(|e| e.ty == ty) {
            None => Ok(None),
            Some(entry) => {
                let data = entry.data(&self.data).ok_or_else(|| {
                    anyhow!("unexpected end of FLIR segment while reading record {:#x}", ty)
                })?;
                Ok(Some((entry, data)))
            }
        }
    }

    /// Raw sensor values as a `height x width` array.
    /// `None` if the capture has no raw data record.
    pub fn try_parse_raw_data(&self) -> Result<Option<Array2<f64>>> {
        let (entry, data) = match self.record(RECORD_RAW_DATA)? {
            Some(rec) => rec,
            None => return Ok(None),
        };

        ensure!(
            data.len() > PAYLOAD_OFFSET,
            "raw data record too short: {} bytes",
            data.len()
        );
        let is_le = record_is_little_endian(data)?;
        let dims: ImageDims = parse_at(data, 2, is_le)?;
        let (width, height) = (dims.width, dims.height);

        let payload = &data[PAYLOAD_OFFSET..];
        if entry.sub_type == 3 || payload.starts_with(PNG_SIGNATURE) {
            let raw = decode_png_raw(payload)?;
            ensure!(
                raw.dim() == (height, width),
                "PNG raw data is {}x{}, record says {}x{}",
                raw.ncols(),
                raw.nrows(),
                width,
                height
            );
            return Ok(Some(raw));
        }

        let expected = 2 * width * height;
        ensure!(
            payload.len() >= expected,
            "raw data record size mismatch: expected {} bytes, found {}",
            PAYLOAD_OFFSET + expected,
            data.len()
        );
        let values = payload[..expected]
            .chunks_exact(2)
            .map(|px| {
                let px = [px[0], px[1]];
                let val = if is_le {
                    u16::from_le_bytes(px)
                } else {
                    u16::from_be_bytes(px)
                };
                val as f64
            })
            .collect();

        Ok(Some(Array2::from_shape_vec((height, width), values)?))
    }

    /// Camera parameters needed to compute temperatures.
    pub fn try_parse_camera_params(&self) -> Result<Option<FlirCameraParams>> {
        let (_, data) = match self.record(RECORD_CAMERA_INFO)? {
            Some(rec) => rec,
            None => return Ok(None),
        };

        ensure!(
            data.len() >= 0x318,
            "camera info record too short: expected at least {} bytes, found {}",
            0x318,
            data.len()
        );
        let is_le = record_is_little_endian(data)?;

        Ok(Some(FlirCameraParams {
            temperature_params: parse_at(data, 0x20, is_le)?,
            extra_params: parse_at(data, 0x308, is_le)?,
        }))
    }

    /// The encoded (JPEG or PNG) visible-light image.
    pub fn embedded_image(&self) -> Result<Option<&[u8]>> {
        let (_, data) = match self.record(RECORD_EMBEDDED_IMAGE)? {
            Some(rec) => rec,
            None => return Ok(None),
        };
        ensure!(
            data.len() > PAYLOAD_OFFSET,
            "embedded image record too short: {} bytes",
            data.len()
        );
        Ok(Some(&data[PAYLOAD_OFFSET..]))
    }
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG";

/// FLIR stores 16-bit PNG samples little-endian, while PNG
/// mandates big-endian, so every sample is byte-swapped.
pub(crate) fn decode_png_raw(bytes: &[u8]) -> Result<Array2<f64>> {
    let png = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)
        .context("decoding PNG raw data")?
        .into_luma16();
    let (width, height) = png.dimensions();
    let values = png.into_raw().into_iter().map(|v| v.swap_bytes() as f64).collect();
    Ok(Array2::from_shape_vec((height as usize, width as usize), values)?)
}

/// Collect FLIR data from Jpeg APP1 segments.
///
/// FLIR data is stored as a collection of APP1 segments
/// with the following format:
///
/// - 0x0: signature: "FLIR\0"
/// - 0x6: segment number: zero-based idx
/// - 0x7: last segment number (= total segments - 1)
/// - 0x8..: data
fn collect_flir_segment_data_from_jpeg(image: &Jpeg) -> Result<Vec<u8>> {
    let mut flir_segments: Vec<Option<Vec<u8>>> = vec![];

    for segment in image.segments_by_marker(markers::APP1) {
        let contents = segment.contents();
        if contents.len() < 8 || &contents[0..5] != b"FLIR\0" {
            continue;
        }

        let current_segment = contents[6] as usize;
        let total_segments = contents[7] as usize + 1;

        match flir_segments.len() {
            0 => flir_segments.resize(total_segments, None),
            l if l != total_segments => bail!(
                "inconsistent count of total FLIR segments: {} != {}",
                l,
                total_segments
            ),
            _ => (),
        }
        ensure!(
            current_segment < total_segments,
            "FLIR segment idx out of bounds: {} >= {}",
            current_segment,
            total_segments
        );

        let slot = &mut flir_segments[current_segment];
        ensure!(
            slot.is_none(),
            "duplicate FLIR segment: idx = {}",
            current_segment
        );
        *slot = Some(contents[8..].to_vec());
    }

    ensure!(!flir_segments.is_empty(), "no FLIR segments found");

    let mut flir_data = vec![];
    for (idx, seg) in flir_segments.into_iter().enumerate() {
        let seg = seg.ok_or_else(|| anyhow!("missing FLIR segment: idx = {}", idx))?;
        flir_data.extend_from_slice(&seg);
    }
    Ok(flir_data)
}

declare_parseable_structs! {
    // # FLIR file header (ref 3)
    // # 0x00 - string[4] file format ID = "FFF\0"
    // # 0x04 - string[16] file creator
    // # 0x14 - int32u file format version = 100
    // # 0x18 - int32u offset to record directory
    // # 0x1c - int32u number of entries in record directory
    struct FlirHeader {
        format => [u8; 4],
        creator => [u8; 16],
        version => u32,
        offset => u32 as usize,
        num_entries => u32 as usize,
    }

    // # FLIR record entry (ref 3):
    // # 0x00 - int16u record type
    // # 0x02 - int16u record subtype: RawData 1=BE, 2=LE, 3=PNG; 1 for other record types
    // # 0x04 - int32u record version
    // # 0x08 - int32u index id = 1
    // # 0x0c - int32u record offset from start of FLIR data
    // # 0x10 - int32u record length
    // # 0x14 - int32u parent = 0 (?)
    // # 0x18 - int32u object number = 0 (?)
    // # 0x1c - int32u checksum: 0 for no checksum
    #[derive(Debug)]
    pub struct FlirRecordDirEntry {
        ty => u16,
        sub_type => u16,
        version => u32,
        id => u32,
        offset => u32 as usize,
        length => u32 as usize,
        parent => u32,
        obj_num => u32,
        checksum => u32,
    }

    struct ImageDims {
        width => u16 as usize,
        height => u16 as usize,
    }

    /// Camera info record, from offset 0x20. Temperatures
    /// are in Kelvin.
    #[derive(Debug, Clone)]
    pub struct FlirTemperatureParams {
        pub(crate) emissivity => f32,
        pub(crate) object_distance => f32,
        pub(crate) reflected_apparent_temperature => f32,
        pub(crate) atmospheric_temperature => f32,
        pub(crate) ir_window_temperature => f32,
        pub(crate) ir_window_transmission => f32,
        _reserved_0 => u32,
        pub(crate) relative_humidity => f32,
        _reserved_1 => [u32; 6],
        pub(crate) planck_r1 => f32,
        pub(crate) planck_b => f32,
        pub(crate) planck_f => f32,
        _reserved_2 => [u32; 3],
        pub(crate) atmospheric_transmission_alpha_1 => f32,
        pub(crate) atmospheric_transmission_alpha_2 => f32,
        pub(crate) atmospheric_transmission_beta_1 => f32,
        pub(crate) atmospheric_transmission_beta_2 => f32,
        pub(crate) atmospheric_transmission_x => f32,
    }

    /// Camera info record, from offset 0x308.
    #[derive(Debug, Clone)]
    pub struct FlirExtraParams {
        pub(crate) planck_o => i32,
        pub(crate) planck_r2 => f32,
    }
}

impl FlirRecordDirEntry {
    pub fn data<'a>(&self, segment: &'a [u8]) -> Option<&'a [u8]> {
        segment.get(self.offset..self.offset.checked_add(self.length)?)
    }
}

#[derive(Debug, Clone)]
pub struct FlirCameraParams {
    pub(crate) temperature_params: FlirTemperatureParams,
    pub(crate) extra_params: FlirExtraParams,
}

/// The FFF version is stored in the byte order of the whole
/// segment; a plausible value read as little-endian means the
/// segment is little-endian.
fn is_segment_little_endian(segment: &[u8]) -> Result<bool> {
    ensure!(segment.len() >= 0x20, "FLIR segment too short for FFF header");
    ensure!(&segment[0..4] == b"FFF\0", "unexpected signature in FLIR segment");

    let version: u32 = parse_at(segment, 0x14, true)?;
    Ok((100..200).contains(&version))
}

/// Records store their own byte order: the first `u16` reads
/// as 2 in the record's byte order.
fn record_is_little_endian(record: &[u8]) -> Result<bool> {
    Ok(parse_at::<u16>(record, 0, true)? == 2)
}

fn parse_flir_directory(segment: &[u8]) -> Result<Vec<FlirRecordDirEntry>> {
    let is_le = is_segment_little_endian(segment)?;
    let hdr: FlirHeader = parse_at(segment, 0, is_le)?;

    (0..hdr.num_entries)
        .map(|idx| {
            parse_at(segment, hdr.offset + idx * 0x20, is_le)
                .with_context(|| format!("reading FLIR record directory entry {}", idx))
        })
        .collect()
}

//! Batch conversion of a directory of captures into a
//! dataset.
//!
//! Input layout: `<root>/<capture>.jpg` and
//! `<root>/labels/<capture>.txt`. Output layout:
//! `<root>/RGB/<capture>.jpg`, `<root>/Thermal/<capture>.jpg`
//! and `<root>/NewLabels/<capture>.txt`. All directories can
//! be overridden through [`PipelineConfig`].
//!
//! Captures are independent. Each one is claimed by the
//! running pipeline before it is processed and its outputs
//! are renamed into place when complete, RGB frame last, so
//! an existing RGB output always means a finished item and
//! re-running the pipeline only picks up what is missing.
//! Nothing an interrupted run leaves behind blocks the next
//! one.
use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use image::{codecs::jpeg::JpegEncoder, ColorType, GrayImage, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde_derive::*;
use tracing::{info, instrument, warn};

use crate::{
    calibration::{CalibrationTable, Orientation},
    capture::Extractor,
    enhance::adjust_gamma,
    error::{DatasetError, Result},
    label::{format_labels, read_labels},
    orientation::{orient_labels, orient_pair},
    register::register,
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_dir: PathBuf,
    pub labels_dir: PathBuf,
    pub rgb_dir: PathBuf,
    pub thermal_dir: PathBuf,
    pub labels_out_dir: PathBuf,
    /// Extension of capture files, matched case-insensitively.
    pub extension: String,
    pub calibration: CalibrationTable,
    /// Gamma applied to the visible frame, if any.
    pub gamma: Option<f64>,
    pub jpeg_quality: u8,
    pub parallel: bool,
    pub show_progress: bool,
}

impl PipelineConfig {
    pub fn builder<P: Into<PathBuf>>(root: P) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn label_path(&self, capture: &Path) -> PathBuf {
        self.labels_dir.join(label_file_name(capture))
    }

    pub fn rgb_path(&self, capture: &Path) -> PathBuf {
        self.rgb_dir.join(file_name(capture))
    }

    pub fn thermal_path(&self, capture: &Path) -> PathBuf {
        self.thermal_dir.join(file_name(capture))
    }

    pub fn label_out_path(&self, capture: &Path) -> PathBuf {
        self.labels_out_dir.join(label_file_name(capture))
    }
}

#[derive(Default)]
pub struct PipelineConfigBuilder {
    root: PathBuf,
    labels_dir: Option<PathBuf>,
    rgb_dir: Option<PathBuf>,
    thermal_dir: Option<PathBuf>,
    labels_out_dir: Option<PathBuf>,
    extension: Option<String>,
    calibration: Option<CalibrationTable>,
    gamma: Option<Option<f64>>,
    jpeg_quality: Option<u8>,
    parallel: Option<bool>,
    show_progress: Option<bool>,
}

impl PipelineConfigBuilder {
    pub fn labels_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.labels_dir = Some(dir.into());
        self
    }

    pub fn rgb_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.rgb_dir = Some(dir.into());
        self
    }

    pub fn thermal_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.thermal_dir = Some(dir.into());
        self
    }

    pub fn labels_out_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.labels_out_dir = Some(dir.into());
        self
    }

    pub fn extension<S: Into<String>>(mut self, ext: S) -> Self {
        self.extension = Some(ext.into());
        self
    }

    pub fn calibration(mut self, table: CalibrationTable) -> Self {
        self.calibration = Some(table);
        self
    }

    pub fn gamma(mut self, gamma: Option<f64>) -> Self {
        self.gamma = Some(gamma);
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = Some(quality);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = Some(show);
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let root = self.root;
        let gamma = self.gamma.unwrap_or(Some(2.0));
        if let Some(g) = gamma {
            if g.is_nan() || g <= 0. {
                return Err(DatasetError::Config(format!("gamma must be positive, got {}", g)));
            }
        }
        let jpeg_quality = self.jpeg_quality.unwrap_or(95);
        if !(1..=100).contains(&jpeg_quality) {
            return Err(DatasetError::Config(format!(
                "JPEG quality must be within 1..=100, got {}",
                jpeg_quality
            )));
        }

        Ok(PipelineConfig {
            labels_dir: self.labels_dir.unwrap_or_else(|| root.join("labels")),
            rgb_dir: self.rgb_dir.unwrap_or_else(|| root.join("RGB")),
            thermal_dir: self.thermal_dir.unwrap_or_else(|| root.join("Thermal")),
            labels_out_dir: self.labels_out_dir.unwrap_or_else(|| root.join("NewLabels")),
            extension: self.extension.unwrap_or_else(|| "jpg".into()),
            calibration: self.calibration.unwrap_or_default(),
            gamma,
            jpeg_quality,
            parallel: self.parallel.unwrap_or(true),
            show_progress: self.show_progress.unwrap_or(false),
            source_dir: root,
        })
    }
}

fn file_name(capture: &Path) -> &std::ffi::OsStr {
    capture.file_name().unwrap_or_else(|| capture.as_os_str())
}

fn label_file_name(capture: &Path) -> PathBuf {
    Path::new(file_name(capture)).with_extension("txt")
}

/// What happened to the labels of a processed capture.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum LabelStatus {
    Copied { boxes: usize },
    Transformed { boxes: usize },
    Missing,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyProcessed,
    /// Another worker holds the claim.
    Claimed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Processed {
        profile: String,
        orientation: Orientation,
        labels: LabelStatus,
    },
    Skipped(SkipReason),
}

#[derive(Serialize, Debug, Clone)]
pub struct ProcessedItem {
    pub capture: PathBuf,
    pub profile: String,
    pub orientation: Orientation,
    pub labels: LabelStatus,
}

#[derive(Serialize, Debug, Clone)]
pub struct SkippedItem {
    pub capture: PathBuf,
    pub reason: SkipReason,
}

#[derive(Serialize, Debug, Clone)]
pub struct FailedItem {
    pub capture: PathBuf,
    pub error: String,
}

/// Per-capture results of a batch run.
#[derive(Serialize, Debug, Clone, Default)]
pub struct BatchReport {
    pub processed: Vec<ProcessedItem>,
    pub skipped: Vec<SkippedItem>,
    pub failed: Vec<FailedItem>,
}

impl BatchReport {
    fn push(&mut self, capture: PathBuf, result: Result<ItemOutcome>) {
        match result {
            Ok(ItemOutcome::Processed {
                profile,
                orientation,
                labels,
            }) => self.processed.push(ProcessedItem {
                capture,
                profile,
                orientation,
                labels,
            }),
            Ok(ItemOutcome::Skipped(reason)) => self.skipped.push(SkippedItem { capture, reason }),
            Err(e) => self.failed.push(FailedItem {
                capture,
                error: e.to_string(),
            }),
        }
    }

    /// Processed captures that had no label file.
    pub fn missing_labels(&self) -> impl Iterator<Item = &Path> {
        self.processed
            .iter()
            .filter(|item| item.labels == LabelStatus::Missing)
            .map(|item| item.capture.as_path())
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.missing_labels().next().is_none()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| DatasetError::Io(e.into()))?;
        writer.flush()?;
        Ok(())
    }

    pub fn log_summary(&self) {
        info!(
            processed = self.processed.len(),
            skipped = self.skipped.len(),
            failed = self.failed.len(),
            "batch complete"
        );
        for path in self.missing_labels() {
            warn!(capture = %path.display(), "processed without labels");
        }
        for item in &self.failed {
            warn!(capture = %item.capture.display(), "failed: {}", item.error);
        }
    }
}

/// Captures currently being processed by a [`Pipeline`].
#[derive(Default)]
struct ClaimSet(Mutex<HashSet<PathBuf>>);

/// Ownership of one capture, released on drop.
struct Claim<'a> {
    set: &'a ClaimSet,
    path: PathBuf,
}

impl ClaimSet {
    fn acquire(&self, path: &Path) -> Option<Claim<'_>> {
        let mut held = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if held.insert(path.to_path_buf()) {
            Some(Claim {
                set: self,
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        let mut held = self.set.0.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.path);
    }
}

/// Write through a hidden temporary next to `path`, renamed
/// over `path` once complete.
fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let name = file_name(path).to_string_lossy();
    let tmp = path.with_file_name(format!(".{}.partial", name));

    let written = File::create(&tmp)
        .map_err(DatasetError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        });
    match written {
        Ok(()) => Ok(fs::rename(&tmp, path)?),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn write_jpeg(path: &Path, data: &[u8], (width, height): (u32, u32), color: ColorType, quality: u8) -> Result<()> {
    write_atomically(path, |w| {
        JpegEncoder::new_with_quality(w, quality).encode(data, width, height, color)?;
        Ok(())
    })
}

fn write_rgb(path: &Path, img: &RgbImage, quality: u8) -> Result<()> {
    write_jpeg(path, img.as_raw(), img.dimensions(), ColorType::Rgb8, quality)
}

fn write_gray(path: &Path, img: &GrayImage, quality: u8) -> Result<()> {
    write_jpeg(path, img.as_raw(), img.dimensions(), ColorType::L8, quality)
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

pub struct Pipeline<X: Extractor> {
    extractor: X,
    config: PipelineConfig,
    claims: ClaimSet,
}

impl<X: Extractor> Pipeline<X> {
    pub fn new(extractor: X, config: PipelineConfig) -> Self {
        Pipeline {
            extractor,
            config,
            claims: ClaimSet::default(),
        }
    }

    /// Create the output directories.
    pub fn prepare_output_dirs(&self) -> Result<()> {
        for dir in &[
            &self.config.rgb_dir,
            &self.config.thermal_dir,
            &self.config.labels_out_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    /// Capture files in the source directory, sorted by name.
    pub fn list_captures(&self) -> Result<Vec<PathBuf>> {
        let mut captures = vec![];
        for entry in fs::read_dir(&self.config.source_dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.config.extension))
                .unwrap_or(false);
            if matches && path.is_file() {
                captures.push(path);
            }
        }
        captures.sort();
        Ok(captures)
    }

    /// Process every capture of the source directory.
    ///
    /// Only failing to list the source directory or to create
    /// the output directories aborts the run; every per-capture
    /// error ends up in the returned report.
    pub fn run(&self) -> Result<BatchReport> {
        self.prepare_output_dirs()?;
        let captures = self.list_captures()?;
        info!(
            source = %self.config.source_dir.display(),
            captures = captures.len(),
            "processing captures"
        );

        let bar = progress_bar(captures.len(), self.config.show_progress);
        let process = |path: &PathBuf| {
            let result = self.process_capture(path);
            if let Err(e) = &result {
                warn!(capture = %path.display(), "{}", e);
            }
            bar.inc(1);
            (path.clone(), result)
        };
        let results: Vec<_> = if self.config.parallel {
            captures.par_iter().map(process).collect()
        } else {
            captures.iter().map(process).collect()
        };
        bar.finish_and_clear();

        let mut report = BatchReport::default();
        for (path, result) in results {
            report.push(path, result);
        }
        report.log_summary();
        Ok(report)
    }

    /// Turn one capture into a dataset item.
    #[instrument(skip(self, path), fields(capture = %path.display()))]
    pub fn process_capture(&self, path: &Path) -> Result<ItemOutcome> {
        let config = &self.config;
        let rgb_out = config.rgb_path(path);
        if rgb_out.exists() {
            return Ok(ItemOutcome::Skipped(SkipReason::AlreadyProcessed));
        }
        let _claim = match self.claims.acquire(&config.rgb_path(path)) {
            Some(claim) => claim,
            None => return Ok(ItemOutcome::Skipped(SkipReason::Claimed)),
        };
        // finished by another worker between the check and the claim
        if rgb_out.exists() {
            return Ok(ItemOutcome::Skipped(SkipReason::AlreadyProcessed));
        }

        let labels = match read_labels(&config.label_path(path)) {
            Ok(labels) => Some(labels),
            Err(DatasetError::MissingLabel(label_path)) => {
                warn!(labels = %label_path.display(), "no label file, writing images only");
                None
            }
            Err(e) => return Err(e),
        };

        let mut capture = self.extractor.extract(path)?;
        if let Some(gamma) = config.gamma {
            adjust_gamma(&mut capture.rgb, gamma);
        }
        let (pair, profile) = register(capture.rgb, &capture.thermal, &config.calibration)?;
        let orientation = profile.orientation;
        let pair = orient_pair(pair, orientation);

        let label_status = match labels {
            None => LabelStatus::Missing,
            Some((text, boxes)) => {
                let (text, status) = match orientation {
                    Orientation::Native => (text, LabelStatus::Copied { boxes: boxes.len() }),
                    Orientation::RotateQuarterTurn => (
                        format_labels(&orient_labels(&boxes, orientation)),
                        LabelStatus::Transformed { boxes: boxes.len() },
                    ),
                };
                write_atomically(&config.label_out_path(path), |w| Ok(w.write_all(text.as_bytes())?))?;
                status
            }
        };

        write_gray(&config.thermal_path(path), &pair.thermal, config.jpeg_quality)?;
        write_rgb(&rgb_out, &pair.rgb, config.jpeg_quality)?;

        Ok(ItemOutcome::Processed {
            profile: profile.name.clone(),
            orientation,
            labels: label_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Capture;

    #[test]
    fn default_layout_follows_root() -> anyhow::Result<()> {
        let config = PipelineConfig::builder("/data/flir").build()?;
        let capture = Path::new("/data/flir/FLIR0001.jpg");

        assert_eq!(config.label_path(capture), Path::new("/data/flir/labels/FLIR0001.txt"));
        assert_eq!(config.rgb_path(capture), Path::new("/data/flir/RGB/FLIR0001.jpg"));
        assert_eq!(config.thermal_path(capture), Path::new("/data/flir/Thermal/FLIR0001.jpg"));
        assert_eq!(
            config.label_out_path(capture),
            Path::new("/data/flir/NewLabels/FLIR0001.txt")
        );
        assert_eq!(config.gamma, Some(2.0));
        assert_eq!(config.jpeg_quality, 95);
        Ok(())
    }

    #[test]
    fn builder_overrides() -> anyhow::Result<()> {
        let config = PipelineConfig::builder("in")
            .rgb_dir("out/rgb")
            .gamma(None)
            .parallel(false)
            .extension("JPG")
            .build()?;
        assert_eq!(config.rgb_dir, Path::new("out/rgb"));
        assert_eq!(config.thermal_dir, Path::new("in/Thermal"));
        assert_eq!(config.gamma, None);
        assert!(!config.parallel);
        assert_eq!(config.extension, "JPG");
        Ok(())
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(PipelineConfig::builder("in").gamma(Some(0.)).build().is_err());
        assert!(PipelineConfig::builder("in").jpeg_quality(0).build().is_err());
    }

    struct NoCaptures;

    impl Extractor for NoCaptures {
        fn extract(&self, path: &Path) -> Result<Capture> {
            Err(DatasetError::Extraction {
                path: path.to_path_buf(),
                source: anyhow::anyhow!("unreadable"),
            })
        }
    }

    #[test]
    fn claims_are_exclusive() {
        let claims = ClaimSet::default();
        let path = Path::new("RGB/a.jpg");

        let first = claims.acquire(path);
        assert!(first.is_some());
        assert!(claims.acquire(path).is_none());
        assert!(claims.acquire(Path::new("RGB/b.jpg")).is_some());
        drop(first);
        assert!(claims.acquire(path).is_some());
    }

    #[test]
    fn claimed_capture_is_skipped() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let capture = dir.path().join("FLIR0001.jpg");
        fs::write(&capture, "")?;
        let pipeline = Pipeline::new(NoCaptures, PipelineConfig::builder(dir.path()).build()?);
        pipeline.prepare_output_dirs()?;

        let claim = pipeline.claims.acquire(&pipeline.config.rgb_path(&capture));
        assert!(claim.is_some());
        assert_eq!(
            pipeline.process_capture(&capture)?,
            ItemOutcome::Skipped(SkipReason::Claimed)
        );

        drop(claim);
        assert!(matches!(
            pipeline.process_capture(&capture),
            Err(DatasetError::Extraction { .. })
        ));
        Ok(())
    }

    #[test]
    fn failed_writes_leave_nothing_behind() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("out.txt");

        let res = write_atomically(&path, |_| Err(DatasetError::Config("boom".into())));
        assert!(res.is_err());
        assert_eq!(fs::read_dir(dir.path())?.count(), 0);

        write_atomically(&path, |w| Ok(w.write_all(b"done")?))?;
        assert_eq!(fs::read_to_string(&path)?, "done");
        assert_eq!(fs::read_dir(dir.path())?.count(), 1);
        Ok(())
    }
}

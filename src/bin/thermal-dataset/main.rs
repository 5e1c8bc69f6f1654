mod args;

use anyhow::{Context, Result};
use thermal_dataset::{cli, logger, Pipeline, PipelineConfig};
use tracing::info;

use crate::args::Args;

fn main() -> Result<()> {
    logger::init();
    let args = Args::from_cmd_line()?;
    let root = args.root.clone();

    let mut builder = PipelineConfig::builder(&args.root)
        .calibration(cli::calibration(args.calibration.as_deref())?)
        .gamma(args.gamma)
        .jpeg_quality(args.jpeg_quality)
        .parallel(!args.serial)
        .show_progress(true);
    if let Some(dir) = args.labels {
        builder = builder.labels_dir(dir);
    }
    if let Some(dir) = args.rgb_output {
        builder = builder.rgb_dir(dir);
    }
    if let Some(dir) = args.thermal_output {
        builder = builder.thermal_dir(dir);
    }
    if let Some(dir) = args.labels_output {
        builder = builder.labels_out_dir(dir);
    }
    let config = builder.build()?;

    let report = Pipeline::new(cli::extractor(args.exiftool), config)
        .run()
        .with_context(|| format!("processing {}", root.display()))?;

    if let Some(path) = &args.report {
        report.write_json(path)?;
        info!(report = %path.display(), "wrote batch report");
    }
    if !report.failed.is_empty() {
        eprintln!(
            "{} of {} captures failed",
            report.failed.len(),
            report.processed.len() + report.skipped.len() + report.failed.len()
        );
    }
    Ok(())
}

mod args;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::{Either, Itertools};
use rayon::prelude::*;
use thermal_dataset::{label::read_labels, logger, viz::render_preview, DatasetError};
use tracing::{info, warn};

use crate::args::Args;

fn preview(args: &Args, rgb_path: &Path) -> Result<PathBuf> {
    let name = rgb_path
        .file_name()
        .context("dataset entry without a file name")?;
    let rgb = image::open(rgb_path)
        .with_context(|| format!("reading {}", rgb_path.display()))?
        .into_rgb8();
    let thermal_path = args.thermal.join(name);
    let thermal = image::open(&thermal_path)
        .with_context(|| format!("reading {}", thermal_path.display()))?
        .into_luma8();

    let boxes = match read_labels(&args.labels.join(name).with_extension("txt")) {
        Ok((_, boxes)) => boxes,
        Err(DatasetError::MissingLabel(path)) => {
            warn!(labels = %path.display(), "no label file");
            vec![]
        }
        Err(e) => return Err(e.into()),
    };

    let out = args.output.join(name).with_extension("png");
    render_preview(&rgb, &thermal, &boxes)?.save(&out)?;
    Ok(out)
}

fn main() -> Result<()> {
    logger::init();
    let args = Args::from_cmd_line()?;
    fs::create_dir_all(&args.output)?;

    let mut entries = vec![];
    for entry in fs::read_dir(&args.rgb).with_context(|| format!("listing {}", args.rgb.display()))? {
        let path = entry?.path();
        if path.is_file() && !path.file_name().map_or(true, |n| n.to_string_lossy().starts_with('.')) {
            entries.push(path);
        }
    }

    let results: Vec<_> = entries
        .par_iter()
        .map(|path| preview(&args, path).map_err(|e| (path, e)))
        .collect();
    let (written, failed): (Vec<_>, Vec<_>) = results.into_iter().partition_map(|res| match res {
        Ok(out) => Either::Left(out),
        Err(err) => Either::Right(err),
    });

    for (path, e) in &failed {
        warn!(entry = %path.display(), "{:#}", e);
    }
    info!(
        written = written.len(),
        failed = failed.len(),
        output = %args.output.display(),
        "previews done"
    );
    Ok(())
}

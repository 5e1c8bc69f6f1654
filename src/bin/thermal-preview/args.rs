use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermal_dataset::{arg, args_parser, opt};

pub struct Args {
    pub rgb: PathBuf,
    pub thermal: PathBuf,
    pub labels: PathBuf,
    pub output: PathBuf,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-preview")
            .about("Overlay thermal frames and labels on the RGB frames of a dataset.")
            .arg(opt!("rgb").help("RGB directory (default: ROOT/RGB)"))
            .arg(opt!("thermal").help("Thermal directory (default: ROOT/Thermal)"))
            .arg(opt!("labels").help("Label directory (default: ROOT/NewLabels)"))
            .arg(
                opt!("output")
                    .short("o")
                    .help("Preview directory (default: ROOT/Preview)"),
            )
            .arg(
                arg!("root")
                    .required(true)
                    .help("Dataset root written by thermal-dataset"),
            )
            .get_matches();

        let root = value_t_or_exit!(matches, "root", PathBuf);
        let dir = |name: &str, default: &str| {
            matches
                .value_of(name)
                .map(PathBuf::from)
                .unwrap_or_else(|| root.join(default))
        };

        Ok(Args {
            rgb: dir("rgb", "RGB"),
            thermal: dir("thermal", "Thermal"),
            labels: dir("labels", "NewLabels"),
            output: dir("output", "Preview"),
        })
    }
}

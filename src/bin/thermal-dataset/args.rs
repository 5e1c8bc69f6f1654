use anyhow::Result;
use clap::value_t_or_exit;
use std::path::PathBuf;
use thermal_dataset::{arg, args_parser, opt};

pub struct Args {
    pub root: PathBuf,
    pub labels: Option<PathBuf>,
    pub rgb_output: Option<PathBuf>,
    pub thermal_output: Option<PathBuf>,
    pub labels_output: Option<PathBuf>,
    pub calibration: Option<PathBuf>,
    pub gamma: Option<f64>,
    pub jpeg_quality: u8,
    pub exiftool: bool,
    pub serial: bool,
    pub report: Option<PathBuf>,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-dataset")
            .about("Build a registered RGB / thermal dataset from FLIR captures.")
            .arg(opt!("labels").help("Input label directory (default: ROOT/labels)"))
            .arg(opt!("rgb output").help("Output RGB directory (default: ROOT/RGB)"))
            .arg(opt!("thermal output").help("Output thermal directory (default: ROOT/Thermal)"))
            .arg(opt!("labels output").help("Output label directory (default: ROOT/NewLabels)"))
            .arg(
                opt!("calibration")
                    .short("c")
                    .help("JSON calibration table (default: built-in FLIR One profiles)"),
            )
            .arg(
                opt!("gamma")
                    .short("g")
                    .conflicts_with("no gamma")
                    .help("Gamma applied to the RGB frames.  Default is 2.0"),
            )
            .arg(
                opt!("no gamma")
                    .takes_value(false)
                    .help("Leave the RGB frames untouched"),
            )
            .arg(opt!("jpeg quality").help("Quality of written JPEGs.  Default is 95"))
            .arg(
                opt!("exiftool")
                    .short("j")
                    .takes_value(false)
                    .help("Read `exiftool -b -j` JSON next to each capture (default: parse R-JPEGs)"),
            )
            .arg(
                opt!("serial")
                    .takes_value(false)
                    .help("Process one capture at a time"),
            )
            .arg(opt!("report").help("Write the batch report as JSON"))
            .arg(
                arg!("root")
                    .required(true)
                    .help("Directory of captures"),
            )
            .get_matches();

        let path = |name: &str| matches.value_of(name).map(PathBuf::from);
        let root = value_t_or_exit!(matches, "root", PathBuf);
        let gamma = if matches.is_present("no gamma") {
            None
        } else {
            Some(
                matches
                    .is_present("gamma")
                    .then(|| value_t_or_exit!(matches.value_of("gamma"), f64))
                    .unwrap_or(2.0),
            )
        };
        let jpeg_quality = matches
            .is_present("jpeg quality")
            .then(|| value_t_or_exit!(matches.value_of("jpeg quality"), u8))
            .unwrap_or(95);

        Ok(Args {
            labels: path("labels"),
            rgb_output: path("rgb output"),
            thermal_output: path("thermal output"),
            labels_output: path("labels output"),
            calibration: path("calibration"),
            report: path("report"),
            exiftool: matches.is_present("exiftool"),
            serial: matches.is_present("serial"),
            root,
            gamma,
            jpeg_quality,
        })
    }
}

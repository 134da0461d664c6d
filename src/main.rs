//! dicom-tac CLI: write ROI time-activity curves of a dynamic DICOM series to a text table.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{ArgAction, ArgGroup, Parser};
use dicom_tac::{DicomDirectory, ResampleStrategy, RoiSpec, extract};
use log::info;
use web_time::Instant;

#[derive(Debug, Parser)]
#[command(name = "dicom-tac")]
#[command(about = "Extract ROI time-activity curves from a dynamic DICOM series")]
#[command(version)]
#[command(group(ArgGroup::new("regions").required(true).multiple(true).args(["roi", "mask"])))]
struct Cli {
    /// Directory holding the dynamic image series.
    #[arg(short = 'i', long = "images")]
    images: PathBuf,

    /// Path of the output table.
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    /// ROI to extract: file, voxel value, output column, resampling (none, img or roi).
    #[arg(
        long,
        num_args = 4,
        value_names = ["PATH", "VALUE", "LABEL", "RESAMPLE"],
        action = ArgAction::Append
    )]
    roi: Vec<String>,

    /// Label mask whose every label becomes a column.
    #[arg(long)]
    mask: Option<PathBuf>,

    /// Resampling for --mask (none, img or roi).
    #[arg(long, value_name = "STRATEGY", default_value = "none", requires = "mask")]
    resample: ResampleStrategy,

    /// Labels of --mask to leave out.
    #[arg(long, num_args = 1.., value_name = "LABEL", requires = "mask")]
    ignore: Vec<i64>,

    /// Column name for a label of --mask, as LABEL,NAME.
    #[arg(long = "label", value_name = "LABEL,NAME", value_parser = parse_label_name, requires = "mask")]
    labels: Vec<(i64, String)>,

    /// Store FACTOR * LABEL_IN as LABEL_OUT before writing.
    #[arg(
        long,
        num_args = 3,
        value_names = ["LABEL_IN", "LABEL_OUT", "FACTOR"],
        action = ArgAction::Append
    )]
    scale: Vec<String>,
}

#[derive(Debug, PartialEq)]
struct ScaleDirective {
    from: String,
    to: String,
    factor: f64,
}

fn parse_label_name(s: &str) -> Result<(i64, String), String> {
    let (label, name) = s
        .split_once(',')
        .ok_or_else(|| format!("expected LABEL,NAME, got {s:?}"))?;
    let label = label
        .trim()
        .parse()
        .map_err(|e| format!("invalid label {label:?}: {e}"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("column name must not be empty".to_string());
    }
    Ok((label, name.to_string()))
}

impl Cli {
    fn roi_specs(&self) -> Result<Vec<RoiSpec>> {
        let mut specs = self
            .roi
            .chunks_exact(4)
            .map(|roi| -> Result<RoiSpec> {
                let value = roi[1]
                    .parse::<i64>()
                    .with_context(|| format!("invalid ROI voxel value {:?}", roi[1]))?;
                let strategy = roi[3].parse::<ResampleStrategy>()?;
                Ok(RoiSpec::label(&roi[0], value, &roi[2], strategy))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(mask) = &self.mask {
            let spec = self.labels.iter().fold(
                RoiSpec::all_labels(mask, self.resample).ignoring(self.ignore.iter().copied()),
                |spec, (label, name)| spec.renaming(*label, name),
            );
            specs.push(spec);
        }
        Ok(specs)
    }

    fn scale_directives(&self) -> Result<Vec<ScaleDirective>> {
        self.scale
            .chunks_exact(3)
            .map(|scale| -> Result<ScaleDirective> {
                let factor = scale[2]
                    .parse::<f64>()
                    .map_err(|e| anyhow!("invalid scale factor {:?}: {e}", scale[2]))?;
                Ok(ScaleDirective {
                    from: scale[0].clone(),
                    to: scale[1].clone(),
                    factor,
                })
            })
            .collect()
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start = Instant::now();

    let cli = Cli::parse();
    info!("Starting dicom-tac {}", env!("CARGO_PKG_VERSION"));

    let specs = cli.roi_specs()?;
    let directives = cli.scale_directives()?;

    let series = DicomDirectory::new(&cli.images);
    let mut table = extract(&series, &specs)
        .with_context(|| format!("extracting curves from {}", cli.images.display()))?;

    for directive in &directives {
        table
            .scale(&directive.from, &directive.to, directive.factor)
            .with_context(|| format!("applying scale {} -> {}", directive.from, directive.to))?;
    }

    table
        .write_to_path(&cli.output)
        .with_context(|| format!("writing {}", cli.output.display()))?;

    info!(
        "dicom-tac finished successfully in {:.1} seconds",
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{self, WrapErr};
use rayon::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use section_volume::{
    enums::{DataType, OutputMode},
    label::LabelPalette,
    reconstruct, render,
    series::Series,
    volume_loader::VolumeLoader,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cut the slice matching every section of a series out of a volume
    Slice {
        /// Uncompressed NIfTI-1 volume
        #[arg(long, value_name = "FILE")]
        nifti: PathBuf,
        /// Registration series JSON
        #[arg(long, value_name = "FILE")]
        json: PathBuf,
        /// ITK-SNAP label file for segmentation volumes
        #[arg(long, value_name = "FILE")]
        label: Option<PathBuf>,
        /// Stretch each slice over the full gray range (implied for float volumes)
        #[arg(long)]
        grayscale: bool,
        /// Also dump the raw int32 samples of each slice
        #[arg(long)]
        raw: bool,
        #[arg(long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,
    },
    /// Rebuild an RGB volume from the section images of a series
    Build {
        /// Registration series JSON, images are looked up next to it
        #[arg(long, value_name = "FILE")]
        json: PathBuf,
        /// NIfTI-1 file to create
        #[arg(long, value_name = "FILE")]
        nifti: PathBuf,
    },
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn slice(
    nifti: &Path,
    json: &Path,
    label: Option<&Path>,
    grayscale: bool,
    raw: bool,
    out_dir: &Path,
) -> color_eyre::Result<()> {
    let palette = label
        .map(LabelPalette::load_from_file)
        .transpose()
        .wrap_err("reading label file")?;
    let series = Series::load_from_file(json)
        .wrap_err_with(|| format!("reading {}", json.display()))?
        .propagate()?;
    let volume = VolumeLoader::load_from_file(nifti)?;

    let grayscale = grayscale || volume.datatype() == DataType::Float32;
    let mode = match (grayscale, &palette) {
        (true, _) => OutputMode::Grayscale,
        (false, Some(_)) => OutputMode::Labels,
        (false, None) => OutputMode::Rgb,
    };
    let suffix = stem(nifti);
    info!(sections = series.sections.len(), ?mode, "slicing");

    series.sections.par_iter().try_for_each(|section| -> color_eyre::Result<()> {
        let slice = volume.extract_section(&section.anchoring, grayscale)?;
        let name = format!("{}{}", stem(Path::new(&section.filename)), suffix);
        let png = out_dir.join(format!("{name}.png"));
        render::render(&slice, mode, palette.as_ref())?
            .save(&png)
            .wrap_err_with(|| format!("writing {}", png.display()))?;
        if raw {
            render::save_raw(&slice, out_dir.join(format!("{name}.bin")))?;
        }
        info!(file = %png.display(), "wrote slice");
        Ok(())
    })
}

fn build(json: &Path, nifti: &Path) -> color_eyre::Result<()> {
    if nifti.exists() {
        eyre::bail!("output file {} exists already", nifti.display());
    }
    let series = Series::load_from_file(json)
        .wrap_err_with(|| format!("reading {}", json.display()))?
        .propagate()?;
    let image_dir = json.parent().unwrap_or(Path::new("."));
    reconstruct::build_volume(&series, image_dir, nifti)?;
    Ok(())
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match Cli::parse().command {
        Command::Slice {
            nifti,
            json,
            label,
            grayscale,
            raw,
            out_dir,
        } => slice(&nifti, &json, label.as_deref(), grayscale, raw, &out_dir),
        Command::Build { json, nifti } => build(&json, &nifti),
    }
}

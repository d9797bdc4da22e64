//! Rebuilds a colour volume by splatting every section image into the voxels
//! its pixels land on.

use crate::{
    anchoring::RawAnchoring,
    enums::DataType,
    nifti::{self, NiftiError, NiftiHeader},
    series::ResolvedSeries,
};

use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ReconstructError {
    #[error("series has no target resolution")]
    MissingResolution,

    #[error("target resolution {0:?} does not fit a NIfTI-1 volume")]
    ResolutionTooLarge([usize; 3]),

    #[error("cannot read {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("NIfTI error: {0}")]
    Nifti(#[from] NiftiError),
}

/// Per-voxel colour accumulator.
pub struct Reconstruction {
    dims: [usize; 3],
    sums: Vec<[u32; 3]>,
    counts: Vec<u32>,
}

impl Reconstruction {
    pub fn new(dims: [usize; 3]) -> Self {
        let voxels = dims.iter().product();
        Self {
            dims,
            sums: vec![[0; 3]; voxels],
            counts: vec![0; voxels],
        }
    }

    /// Adds every pixel of `image` to the voxel it maps to. Pixel `(0, 0)`
    /// lands on the origin, the opposite corner on `origin + u + v`.
    pub fn add_section(&mut self, anchoring: &RawAnchoring, image: &RgbImage) {
        let (width, height) = image.dimensions();
        let w = f64::from(width.saturating_sub(1).max(1));
        let h = f64::from(height.saturating_sub(1).max(1));
        let [xdim, ydim, zdim] = self.dims;

        for (x, y, pixel) in image.enumerate_pixels() {
            let point =
                anchoring.origin + anchoring.u * f64::from(x) / w + anchoring.v * f64::from(y) / h;
            let (lx, ly, lz) = (point.x as i64, point.y as i64, point.z as i64);
            let inside = (0..xdim as i64).contains(&lx)
                && (0..ydim as i64).contains(&ly)
                && (0..zdim as i64).contains(&lz);
            if !inside {
                continue;
            }
            let index = lx as usize + ly as usize * xdim + lz as usize * xdim * ydim;
            for (sum, channel) in self.sums[index].iter_mut().zip(pixel.0) {
                *sum += u32::from(channel);
            }
            self.counts[index] += 1;
        }
    }

    /// Averaged RGB triplets, x fastest. Voxels no pixel reached are white.
    pub fn finish(self) -> Vec<u8> {
        self.sums
            .iter()
            .zip(&self.counts)
            .flat_map(|(&sum, &count)| match count {
                0 => [255; 3],
                count => sum.map(|channel| (channel / count) as u8),
            })
            .collect()
    }
}

/// Rebuilds the target volume of `series` from section images found in
/// `image_dir` and writes it as an RGB24 NIfTI file.
#[instrument(skip(series), fields(sections = series.sections.len()))]
pub fn build_volume(
    series: &ResolvedSeries,
    image_dir: &Path,
    output: &Path,
) -> Result<(), ReconstructError> {
    let dims = series.dimensions().ok_or(ReconstructError::MissingResolution)?;
    let header_dims = match dims.map(u16::try_from) {
        [Ok(x), Ok(y), Ok(z)] => [x, y, z],
        _ => return Err(ReconstructError::ResolutionTooLarge(dims)),
    };

    let mut reconstruction = Reconstruction::new(dims);
    for section in &series.sections {
        let path = image_dir.join(&section.filename);
        let image = image::open(&path)
            .map_err(|source| ReconstructError::Image {
                path: path.display().to_string(),
                source,
            })?
            .to_rgb8();
        debug!(filename = %section.filename, "splatting section");
        reconstruction.add_section(&section.anchoring, &image);
    }

    info!(?dims, "writing volume");
    let header = NiftiHeader::new(header_dims, DataType::Rgb24);
    nifti::write_volume(output, &header, &reconstruction.finish())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use image::Rgb;

    #[test]
    fn pixels_average_into_voxels() {
        let mut reconstruction = Reconstruction::new([2, 1, 1]);
        let anchoring = RawAnchoring {
            origin: DVec3::new(0.0, 0.5, 0.5),
            u: DVec3::new(1.0, 0.0, 0.0),
            v: DVec3::ZERO,
        };
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([10, 20, 30]));
        image.put_pixel(1, 0, Rgb([200, 100, 0]));
        reconstruction.add_section(&anchoring, &image);

        image.put_pixel(0, 0, Rgb([30, 40, 50]));
        reconstruction.add_section(&anchoring, &image);

        assert_eq!(reconstruction.finish(), vec![20, 30, 40, 200, 100, 0]);
    }

    #[test]
    fn untouched_voxels_are_white() {
        let reconstruction = Reconstruction::new([1, 1, 2]);
        assert_eq!(reconstruction.finish(), vec![255; 6]);
    }
}

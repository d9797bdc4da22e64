use crate::{
    nifti::{NiftiError, NiftiHeader, Storage},
    volume::{Volume, VolumeDescriptor, VolumeError},
};

use memmap2::Mmap;
use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("NIfTI error: {0}")]
    Nifti(#[from] NiftiError),

    #[error("volume error: {0}")]
    Volume(#[from] VolumeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct VolumeLoader;

impl VolumeLoader {
    fn is_compressed(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
    }

    /// Reads the header of a NIfTI-1 file and describes where its voxels are.
    ///
    /// Returns the descriptor together with the file holding the voxel data,
    /// which differs from `path` for `.hdr`/`.img` pairs.
    ///
    /// # Errors
    ///
    /// Gzip-compressed files are refused before anything is read.
    pub fn read_descriptor(
        path: impl AsRef<Path>,
    ) -> Result<(VolumeDescriptor, PathBuf), VolumeLoaderError> {
        let path = path.as_ref();
        if Self::is_compressed(path) {
            return Err(VolumeError::Compressed.into());
        }
        let header = NiftiHeader::read_from(BufReader::new(File::open(path)?))?;
        let data_path = match header.storage {
            Storage::SingleFile => path.to_path_buf(),
            Storage::Pair => path.with_extension("img"),
        };
        let descriptor = VolumeDescriptor {
            dims: header.dims,
            datatype: header.datatype,
            big_endian: header.big_endian,
            voxel_offset: header.vox_offset,
            compressed: Self::is_compressed(&data_path),
        };
        Ok((descriptor, data_path))
    }

    /// Opens a NIfTI-1 volume for slicing, memory-mapping its voxel data.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Volume<Mmap>, VolumeLoaderError> {
        let (descriptor, data_path) = Self::read_descriptor(path.as_ref())?;
        if descriptor.compressed {
            return Err(VolumeError::Compressed.into());
        }
        let file = File::open(&data_path)?;
        // SAFETY: the mapping is read-only and the file is not modified while
        // the volume is alive.
        let mmap = unsafe { Mmap::map(&file)? };
        info!(
            dims = ?descriptor.dims,
            datatype = %descriptor.datatype,
            big_endian = descriptor.big_endian,
            "opened volume"
        );
        Ok(Volume::new(descriptor, mmap)?)
    }
}

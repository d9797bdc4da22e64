//! Just enough of the NIfTI-1 header to locate and decode voxel data, and to
//! write a plain single-file volume back out.

use crate::enums::DataType;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::Path,
};
use thiserror::Error;

pub const HEADER_SIZE: usize = 348;
/// Header plus the four byte extension flag.
pub const SINGLE_FILE_VOX_OFFSET: u64 = 352;

const DIM: usize = 40;
const DATATYPE: usize = 70;
const BITPIX: usize = 72;
const PIXDIM: usize = 76;
const VOX_OFFSET: usize = 108;
const XYZT_UNITS: usize = 123;
const SFORM_CODE: usize = 254;
const SROW_X: usize = 280;
const MAGIC: usize = 344;

const NIFTI_XFORM_SCANNER_ANAT: i16 = 1;
const NIFTI_UNITS_MM: u8 = 2;

#[derive(Debug, Error)]
pub enum NiftiError {
    #[error("header too short: got {0} bytes, need 348")]
    TooShort(usize),

    #[error("sizeof_hdr is neither 348 little nor big endian")]
    UnknownByteOrder,

    #[error("invalid NIfTI magic {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported data type code {0}")]
    UnsupportedDataType(i16),

    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where the voxels of a header live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// `n+1`: data follows the header in the same file.
    SingleFile,
    /// `ni1`: data sits in a sibling `.img` file.
    Pair,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiftiHeader {
    pub dims: [u16; 3],
    pub datatype: DataType,
    pub big_endian: bool,
    pub vox_offset: u64,
    pub storage: Storage,
}

impl NiftiHeader {
    pub fn new(dims: [u16; 3], datatype: DataType) -> Self {
        Self {
            dims,
            datatype,
            big_endian: false,
            vox_offset: SINGLE_FILE_VOX_OFFSET,
            storage: Storage::SingleFile,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NiftiError> {
        if bytes.len() < HEADER_SIZE {
            return Err(NiftiError::TooShort(bytes.len()));
        }
        if LittleEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
            Self::parse::<LittleEndian>(bytes, false)
        } else if BigEndian::read_i32(&bytes[0..4]) == HEADER_SIZE as i32 {
            Self::parse::<BigEndian>(bytes, true)
        } else {
            Err(NiftiError::UnknownByteOrder)
        }
    }

    pub fn read_from(mut reader: impl Read) -> Result<Self, NiftiError> {
        let mut bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    fn parse<E: ByteOrder>(bytes: &[u8], big_endian: bool) -> Result<Self, NiftiError> {
        let storage = match &bytes[MAGIC..MAGIC + 4] {
            b"n+1\0" => Storage::SingleFile,
            b"ni1\0" => Storage::Pair,
            magic => {
                return Err(NiftiError::InvalidMagic([
                    magic[0], magic[1], magic[2], magic[3],
                ]));
            }
        };

        let ndim = E::read_i16(&bytes[DIM..DIM + 2]);
        if !(1..=7).contains(&ndim) {
            return Err(NiftiError::InvalidDimensions(format!(
                "ndim must be 1..=7, got {ndim}"
            )));
        }
        let mut dims = [1u16; 3];
        for (i, dim) in dims.iter_mut().enumerate().take(ndim as usize) {
            let offset = DIM + 2 + i * 2;
            let raw = E::read_i16(&bytes[offset..offset + 2]);
            *dim = u16::try_from(raw).map_err(|_| {
                NiftiError::InvalidDimensions(format!("dimension {i} is negative: {raw}"))
            })?;
        }

        let code = E::read_i16(&bytes[DATATYPE..DATATYPE + 2]);
        let datatype = DataType::from_code(code).ok_or(NiftiError::UnsupportedDataType(code))?;

        let vox_offset = E::read_f32(&bytes[VOX_OFFSET..VOX_OFFSET + 4]);
        if !vox_offset.is_finite() || vox_offset < 0.0 {
            return Err(NiftiError::InvalidDimensions(format!(
                "vox_offset must be a non-negative number, got {vox_offset}"
            )));
        }

        Ok(Self {
            dims,
            datatype,
            big_endian,
            vox_offset: vox_offset as u64,
            storage,
        })
    }

    /// Little endian single-file header with an identity sform, followed by
    /// an empty extension flag.
    ///
    /// # Errors
    ///
    /// Fails if a dimension does not fit the signed 16-bit header field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NiftiError> {
        let [x, y, z] = match self.dims.map(i16::try_from) {
            [Ok(x), Ok(y), Ok(z)] => [x, y, z],
            _ => {
                return Err(NiftiError::InvalidDimensions(format!(
                    "{:?} exceeds {} voxels per axis",
                    self.dims,
                    i16::MAX
                )));
            }
        };
        let mut bytes = vec![0u8; SINGLE_FILE_VOX_OFFSET as usize];
        LittleEndian::write_i32(&mut bytes[0..4], HEADER_SIZE as i32);

        let dim = [3, x, y, z, 1, 1, 1, 1];
        LittleEndian::write_i16_into(&dim, &mut bytes[DIM..DIM + 16]);
        LittleEndian::write_i16(&mut bytes[DATATYPE..DATATYPE + 2], self.datatype.code());
        LittleEndian::write_i16(
            &mut bytes[BITPIX..BITPIX + 2],
            (self.datatype.bytes_per_voxel() * 8) as i16,
        );
        LittleEndian::write_f32_into(&[1.0f32; 8], &mut bytes[PIXDIM..PIXDIM + 32]);
        LittleEndian::write_f32(
            &mut bytes[VOX_OFFSET..VOX_OFFSET + 4],
            SINGLE_FILE_VOX_OFFSET as f32,
        );
        bytes[XYZT_UNITS] = NIFTI_UNITS_MM;
        LittleEndian::write_i16(
            &mut bytes[SFORM_CODE..SFORM_CODE + 2],
            NIFTI_XFORM_SCANNER_ANAT,
        );

        let srow: [f32; 12] = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ];
        LittleEndian::write_f32_into(&srow, &mut bytes[SROW_X..SROW_X + 48]);
        bytes[MAGIC..MAGIC + 4].copy_from_slice(b"n+1\0");
        Ok(bytes)
    }
}

/// Writes a single-file volume. `data` must hold exactly one voxel per grid
/// cell, x fastest.
pub fn write_volume(
    path: impl AsRef<Path>,
    header: &NiftiHeader,
    data: &[u8],
) -> Result<(), NiftiError> {
    let header_bytes = header.to_bytes()?;
    let [x, y, z] = header.dims.map(usize::from);
    let expected = x * y * z * header.datatype.bytes_per_voxel();
    if data.len() != expected {
        return Err(NiftiError::InvalidDimensions(format!(
            "expected {expected} bytes of voxel data, got {}",
            data.len()
        )));
    }
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_all(&header_bytes)?;
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}

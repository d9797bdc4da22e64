use crate::anchoring::RawAnchoring;
use crate::enums::DataType;
use crate::store::VoxelStore;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use glam::DVec3;
use ndarray::Array2;
use thiserror::Error;
use tracing::{instrument, trace};

/// Upper end of the normalized sample range.
pub const NORMALIZED_MAX: i32 = 65535;
/// Value given to every cell of a slice with no dynamic range.
pub const FLAT_VALUE: i32 = NORMALIZED_MAX / 2;
/// Largest number of cells a single slice may have (1 GiB of samples).
pub const MAX_SLICE_CELLS: usize = 1 << 28;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("compressed volumes are not supported")]
    Compressed,

    #[error("{datatype} uses {bytes} bytes per voxel, at most 4 are supported")]
    UnsupportedBytesPerVoxel { datatype: DataType, bytes: usize },

    #[error("{0} voxels cannot be decoded")]
    UnsupportedDataType(DataType),

    #[error("slice with axes of length {width} x {height} is too large")]
    SliceTooLarge { width: f64, height: f64 },

    #[error("store holds {actual} bytes, the volume needs {expected}")]
    TruncatedStore { expected: u64, actual: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Layout of a voxel grid inside its byte store.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDescriptor {
    pub dims: [u16; 3],
    pub datatype: DataType,
    pub big_endian: bool,
    /// Byte offset of the first voxel.
    pub voxel_offset: u64,
    pub compressed: bool,
}

/// A typed voxel grid that oblique slices can be cut from.
pub struct Volume<S> {
    descriptor: VolumeDescriptor,
    bytes_per_voxel: usize,
    row_stride: u64,
    plane_stride: u64,
    store: S,
}

impl<S: VoxelStore> Volume<S> {
    /// # Errors
    ///
    /// Fails if the store is compressed, the datatype is wider than 4 bytes
    /// or has no decoding, or the store is shorter than the voxel grid.
    pub fn new(descriptor: VolumeDescriptor, store: S) -> Result<Self, VolumeError> {
        if descriptor.compressed {
            return Err(VolumeError::Compressed);
        }
        let datatype = descriptor.datatype;
        let bytes_per_voxel = datatype.bytes_per_voxel();
        if bytes_per_voxel > 4 {
            return Err(VolumeError::UnsupportedBytesPerVoxel {
                datatype,
                bytes: bytes_per_voxel,
            });
        }
        if datatype == DataType::Rgba32 {
            return Err(VolumeError::UnsupportedDataType(datatype));
        }
        let row_stride = u64::from(descriptor.dims[0]) * bytes_per_voxel as u64;
        let plane_stride = row_stride * u64::from(descriptor.dims[1]);
        let expected = descriptor.voxel_offset + plane_stride * u64::from(descriptor.dims[2]);
        if store.len() < expected {
            return Err(VolumeError::TruncatedStore {
                expected,
                actual: store.len(),
            });
        }
        Ok(Self {
            descriptor,
            bytes_per_voxel,
            row_stride,
            plane_stride,
            store,
        })
    }

    pub fn descriptor(&self) -> &VolumeDescriptor {
        &self.descriptor
    }

    pub fn datatype(&self) -> DataType {
        self.descriptor.datatype
    }

    /// Voxel index containing `point`, coordinates truncated toward zero.
    fn voxel_at(&self, point: DVec3) -> Option<[u64; 3]> {
        let index = [point.x as i64, point.y as i64, point.z as i64];
        let inside = index
            .iter()
            .zip(self.descriptor.dims)
            .all(|(&i, dim)| (0..i64::from(dim)).contains(&i));
        inside.then(|| index.map(|i| i as u64))
    }

    fn read_voxel(&self, [x, y, z]: [u64; 3]) -> Result<i32, VolumeError> {
        let offset = self.descriptor.voxel_offset
            + self.bytes_per_voxel as u64 * x
            + y * self.row_stride
            + z * self.plane_stride;
        let mut buf = [0u8; 4];
        let bytes = &mut buf[..self.bytes_per_voxel];
        self.store.read_at(offset, bytes)?;
        Ok(if self.descriptor.big_endian {
            self.decode::<BigEndian>(bytes)
        } else {
            self.decode::<LittleEndian>(bytes)
        })
    }

    /// 32-bit types keep their bit pattern, floats are reinterpreted later.
    fn decode<E: ByteOrder>(&self, bytes: &[u8]) -> i32 {
        match self.descriptor.datatype {
            DataType::Int8 => i32::from(bytes[0] as i8),
            DataType::UInt8 => i32::from(bytes[0]),
            DataType::Int16 => i32::from(E::read_i16(bytes)),
            DataType::UInt16 => i32::from(E::read_u16(bytes)),
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => E::read_i32(bytes),
            DataType::Rgb24 => {
                (i32::from(bytes[0]) << 16) | (i32::from(bytes[1]) << 8) | i32::from(bytes[2])
            }
            // refused by `Volume::new`
            DataType::Float64
            | DataType::Int64
            | DataType::UInt64
            | DataType::Complex64
            | DataType::Complex128
            | DataType::Float128
            | DataType::Complex256
            | DataType::Rgba32 => 0,
        }
    }

    /// Samples the plane spanned by `u` and `v` from `origin`, nearest voxel.
    ///
    /// The result has `|u| + 1` columns and `|v| + 1` rows (lengths rounded
    /// down). Cells outside the volume are 0. Float volumes are always
    /// rescaled to `0..=65535` using the slice's own range, integer volumes
    /// only when `normalize` is set. Packed colour is never rescaled.
    ///
    /// Axes of non-finite length, or spanning more than [`MAX_SLICE_CELLS`]
    /// cells together, fail with [`VolumeError::SliceTooLarge`].
    #[instrument(skip(self), fields(datatype = %self.descriptor.datatype))]
    pub fn extract_slice(
        &self,
        origin: DVec3,
        u: DVec3,
        v: DVec3,
        normalize: bool,
    ) -> Result<Array2<i32>, VolumeError> {
        let too_large = || VolumeError::SliceTooLarge {
            width: u.length(),
            height: v.length(),
        };
        let (Some(width), Some(height)) = (cells_along(u), cells_along(v)) else {
            return Err(too_large());
        };
        if width.checked_mul(height).is_none_or(|cells| cells > MAX_SLICE_CELLS) {
            return Err(too_large());
        }
        let mut slice = Array2::<i32>::zeros((height, width));

        for (y, mut row) in slice.rows_mut().into_iter().enumerate() {
            let base = origin + v * y as f64 / height as f64;
            for (x, cell) in row.iter_mut().enumerate() {
                let point = base + u * x as f64 / width as f64;
                if let Some(index) = self.voxel_at(point) {
                    *cell = self.read_voxel(index)?;
                }
            }
        }
        trace!(width, height, "sampled slice");

        match self.descriptor.datatype {
            DataType::Float32 => rescale_float(&mut slice),
            datatype if normalize && datatype.is_integer() => rescale_integer(&mut slice),
            _ => {}
        }
        Ok(slice)
    }

    /// Slice covering a section placed by `anchoring`.
    pub fn extract_section(
        &self,
        anchoring: &RawAnchoring,
        normalize: bool,
    ) -> Result<Array2<i32>, VolumeError> {
        self.extract_slice(anchoring.origin, anchoring.u, anchoring.v, normalize)
    }
}

/// Output cells along an axis: its length rounded down, plus one.
fn cells_along(axis: DVec3) -> Option<usize> {
    let length = axis.length();
    if !length.is_finite() {
        return None;
    }
    (length as usize).checked_add(1)
}

fn rescale_float(slice: &mut Array2<i32>) {
    let as_float = |bits: i32| bytemuck::cast::<i32, f32>(bits);
    let (min, max) = slice
        .iter()
        .map(|&bits| as_float(bits))
        .filter(|value| value.is_finite())
        .fold((f32::MAX, f32::MIN), |(min, max), value| {
            (min.min(value), max.max(value))
        });
    if min >= max {
        slice.fill(FLAT_VALUE);
        return;
    }
    let (min, range) = (f64::from(min), f64::from(max) - f64::from(min));
    slice.mapv_inplace(|bits| {
        let value = f64::from(as_float(bits));
        if value.is_nan() {
            return 0;
        }
        (((value - min) / range).clamp(0.0, 1.0) * f64::from(NORMALIZED_MAX)) as i32
    });
}

fn rescale_integer(slice: &mut Array2<i32>) {
    let (Some(&min), Some(&max)) = (slice.iter().min(), slice.iter().max()) else {
        return;
    };
    if min == max {
        slice.fill(FLAT_VALUE);
        return;
    }
    let (min, range) = (i64::from(min), i64::from(max) - i64::from(min));
    slice.mapv_inplace(|value| {
        (i64::from(NORMALIZED_MAX) * (i64::from(value) - min) / range) as i32
    });
}

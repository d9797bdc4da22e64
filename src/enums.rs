/// Voxel datatypes as tagged in a NIfTI-1 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum DataType {
    UInt8 = 2,
    Int16 = 4,
    Int32 = 8,
    Float32 = 16,
    Complex64 = 32,
    Float64 = 64,
    /// Packed 24-bit colour, three bytes R, G, B.
    Rgb24 = 128,
    Int8 = 256,
    UInt16 = 512,
    UInt32 = 768,
    Int64 = 1024,
    UInt64 = 1280,
    Float128 = 1536,
    Complex128 = 1792,
    Complex256 = 2048,
    Rgba32 = 2304,
}

impl DataType {
    pub fn from_code(code: i16) -> Option<Self> {
        let datatype = match code {
            2 => Self::UInt8,
            4 => Self::Int16,
            8 => Self::Int32,
            16 => Self::Float32,
            32 => Self::Complex64,
            64 => Self::Float64,
            128 => Self::Rgb24,
            256 => Self::Int8,
            512 => Self::UInt16,
            768 => Self::UInt32,
            1024 => Self::Int64,
            1280 => Self::UInt64,
            1536 => Self::Float128,
            1792 => Self::Complex128,
            2048 => Self::Complex256,
            2304 => Self::Rgba32,
            _ => return None,
        };
        Some(datatype)
    }

    pub const fn code(self) -> i16 {
        self as i16
    }

    pub const fn bytes_per_voxel(self) -> usize {
        match self {
            Self::UInt8 | Self::Int8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Rgb24 => 3,
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::Rgba32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 | Self::Complex64 => 8,
            Self::Float128 | Self::Complex128 => 16,
            Self::Complex256 => 32,
        }
    }

    /// Integer types that may be rescaled into the 16-bit output range.
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::UInt8
                | Self::Int8
                | Self::Int16
                | Self::UInt16
                | Self::Int32
                | Self::UInt32
                | Self::Int64
                | Self::UInt64
        )
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::UInt8 => "uint8",
            Self::Int8 => "int8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Float128 => "float128",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::Complex256 => "complex256",
            Self::Rgb24 => "rgb24",
            Self::Rgba32 => "rgba32",
        };
        f.write_str(name)
    }
}

/// How an extracted slice is turned into pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Samples rescaled to 0..=65535, written as 8-bit gray.
    Grayscale,
    /// Samples are packed 24-bit colour values.
    #[default]
    Rgb,
    /// Samples are label ids looked up in a palette.
    Labels,
}

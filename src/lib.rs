//! # Section-volume library
//!
//! This crate places a series of 2D sections inside a 3D reference volume and
//! cuts the matching oblique slices out of NIfTI-1 volumes.
//!
//! A registration series usually anchors only a few of its sections. The
//! remaining ones are placed by [`Series::propagate`]: anchored sections are
//! turned into a center, two unit axes and two scale ratios, the first and
//! last sections are extrapolated from a least squares fit over the order
//! key, and every gap in between is interpolated from its neighbours.
//!
//! Each placed section can then be sliced out of a volume with
//! [`Volume::extract_slice`]. Voxels are sampled nearest-index straight from a
//! memory-mapped file, decoded according to the header datatype and byte
//! order:
//!  - signed and unsigned 8, 16 and 32-bit integers
//!  - 32-bit floats, always rescaled to `0..=65535` per slice
//!  - packed 24-bit RGB, never rescaled
//!
//! Compressed (`.gz`) volumes and datatypes wider than 4 bytes are refused.
//!
//! # Examples
//!
//! ## Slicing every section of a series
//!
//! ```no_run
//! # use section_volume::{Series, VolumeLoader, render};
//! let series = Series::load_from_file("series.json")
//!     .expect("should have parsed the series")
//!     .propagate()
//!     .expect("should have placed every section");
//! let volume = VolumeLoader::load_from_file("atlas.nii").expect("should have opened volume");
//! for section in &series.sections {
//!     let slice = volume
//!         .extract_section(&section.anchoring, true)
//!         .expect("should have sliced the volume");
//!     render::to_grayscale(&slice)
//!         .expect("slice should fit an image")
//!         .save(format!("{}.png", section.filename))
//!         .expect("should have written image");
//! }
//! ```

pub mod anchoring;
pub mod enums;
pub mod estimator;
pub mod label;
pub mod nifti;
pub mod reconstruct;
pub mod render;
pub mod series;
pub mod store;
pub mod volume;
pub mod volume_loader;

pub use anchoring::{Anchoring, CanonicalAnchoring, GeometryError, RawAnchoring, Section};
pub use enums::{DataType, OutputMode};
pub use estimator::{Estimator, Regression};
pub use series::{ResolvedSection, ResolvedSeries, Series, SeriesError};
pub use store::VoxelStore;
pub use volume::{Volume, VolumeDescriptor, VolumeError};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};

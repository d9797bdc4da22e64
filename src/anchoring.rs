//! Placement of a single section inside the target volume.
//!
//! An anchoring is known either in raw form (origin plus the two edge vectors
//! of the image, in voxel coordinates) or in canonical form (center, unit axes
//! and the voxel-per-pixel ratio along each axis). Estimation happens on the
//! canonical form because its components vary smoothly along a series.

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::estimator::{Estimator, EstimatorError};

/// Number of scalar components in the canonical form.
pub const CANONICAL_LEN: usize = 11;
/// Number of scalar components in the raw form.
pub const RAW_LEN: usize = 9;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("anchoring must have 0, 9 or 11 components, got {0}")]
    ShapeViolation(usize),

    #[error("{0} has zero or non-finite length")]
    DegenerateVector(&'static str),

    #[error("section pixel size must be positive, got {width}x{height}")]
    InvalidPixelSize { width: f64, height: f64 },

    #[error(transparent)]
    Estimator(#[from] EstimatorError),
}

/// Origin and edge vectors of a section, edges need not be orthogonal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawAnchoring {
    pub origin: DVec3,
    pub u: DVec3,
    pub v: DVec3,
}

impl RawAnchoring {
    pub fn to_array(&self) -> [f64; RAW_LEN] {
        let mut out = [0.0; RAW_LEN];
        out[0..3].copy_from_slice(&self.origin.to_array());
        out[3..6].copy_from_slice(&self.u.to_array());
        out[6..9].copy_from_slice(&self.v.to_array());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalAnchoring {
    pub center: DVec3,
    pub u_axis: DVec3,
    pub v_axis: DVec3,
    /// Edge length along `u_axis` divided by the pixel width.
    pub u_ratio: f64,
    /// Edge length along `v_axis` divided by the pixel height.
    pub v_ratio: f64,
}

impl CanonicalAnchoring {
    pub fn components(&self) -> [f64; CANONICAL_LEN] {
        let mut out = [0.0; CANONICAL_LEN];
        out[0..3].copy_from_slice(&self.center.to_array());
        out[3..6].copy_from_slice(&self.u_axis.to_array());
        out[6..9].copy_from_slice(&self.v_axis.to_array());
        out[9] = self.u_ratio;
        out[10] = self.v_ratio;
        out
    }

    pub fn from_components(c: &[f64; CANONICAL_LEN]) -> Self {
        Self {
            center: DVec3::new(c[0], c[1], c[2]),
            u_axis: DVec3::new(c[3], c[4], c[5]),
            v_axis: DVec3::new(c[6], c[7], c[8]),
            u_ratio: c[9],
            v_ratio: c[10],
        }
    }

    /// Gram-Schmidt on the two axes: `u_axis` is normalized, then `v_axis`
    /// loses its projection onto it and is normalized as well.
    pub fn orthonormalize(&mut self) -> Result<(), GeometryError> {
        let (u, _) = unit(self.u_axis, "horizontal axis")?;
        let v = self.v_axis - u * u.dot(self.v_axis);
        let (v, _) = unit(v, "vertical axis")?;
        self.u_axis = u;
        self.v_axis = v;
        Ok(())
    }
}

fn unit(vector: DVec3, what: &'static str) -> Result<(DVec3, f64), GeometryError> {
    let length = vector.length();
    if !(length > 0.0 && length.is_finite()) {
        return Err(GeometryError::DegenerateVector(what));
    }
    Ok((vector / length, length))
}

/// The three shapes an anchoring moves through while a series is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub enum Anchoring {
    #[default]
    Unknown,
    Raw(RawAnchoring),
    Canonical(CanonicalAnchoring),
}

impl Anchoring {
    pub fn from_slice(values: &[f64]) -> Result<Self, GeometryError> {
        match values.len() {
            0 => Ok(Self::Unknown),
            RAW_LEN => Ok(Self::Raw(RawAnchoring {
                origin: DVec3::from_slice(&values[0..3]),
                u: DVec3::from_slice(&values[3..6]),
                v: DVec3::from_slice(&values[6..9]),
            })),
            CANONICAL_LEN => {
                let mut components = [0.0; CANONICAL_LEN];
                components.copy_from_slice(values);
                Ok(Self::Canonical(CanonicalAnchoring::from_components(
                    &components,
                )))
            }
            other => Err(GeometryError::ShapeViolation(other)),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Self::Unknown => Vec::new(),
            Self::Raw(raw) => raw.to_array().to_vec(),
            Self::Canonical(canonical) => canonical.components().to_vec(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn canonical(&self) -> Option<&CanonicalAnchoring> {
        match self {
            Self::Canonical(canonical) => Some(canonical),
            _ => None,
        }
    }
}

impl TryFrom<Vec<f64>> for Anchoring {
    type Error = GeometryError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_slice(&values)
    }
}

impl From<Anchoring> for Vec<f64> {
    fn from(anchoring: Anchoring) -> Self {
        anchoring.to_vec()
    }
}

/// One image of a series, registered into the target volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub filename: String,
    /// Order key, also the independent variable of every estimator.
    pub nr: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub anchoring: Anchoring,
}

impl Section {
    pub fn new(filename: impl Into<String>, nr: f64, width: f64, height: f64) -> Self {
        Self {
            filename: filename.into(),
            nr,
            width,
            height,
            anchoring: Anchoring::Unknown,
        }
    }

    pub fn with_anchoring(mut self, anchoring: Anchoring) -> Self {
        self.anchoring = anchoring;
        self
    }

    fn check_pixel_size(&self) -> Result<(), GeometryError> {
        let valid = |d: f64| d > 0.0 && d.is_finite();
        if valid(self.width) && valid(self.height) {
            Ok(())
        } else {
            Err(GeometryError::InvalidPixelSize {
                width: self.width,
                height: self.height,
            })
        }
    }

    /// Converts a raw anchoring into canonical form.
    ///
    /// Returns `Ok(false)` without touching the section if the anchoring is
    /// not raw.
    pub fn decompose(&mut self) -> Result<bool, GeometryError> {
        let Anchoring::Raw(raw) = self.anchoring else {
            return Ok(false);
        };
        self.check_pixel_size()?;
        let center = raw.origin + (raw.u + raw.v) / 2.0;
        let (u_axis, u_length) = unit(raw.u, "horizontal edge")?;
        let (v_axis, v_length) = unit(raw.v, "vertical edge")?;
        self.anchoring = Anchoring::Canonical(CanonicalAnchoring {
            center,
            u_axis,
            v_axis,
            u_ratio: u_length / self.width,
            v_ratio: v_length / self.height,
        });
        Ok(true)
    }

    /// Converts a canonical anchoring back into raw form, orthonormalizing
    /// the axes on the way.
    ///
    /// Returns `Ok(false)` without touching the section if the anchoring is
    /// not canonical.
    pub fn recompose(&mut self) -> Result<bool, GeometryError> {
        let Anchoring::Canonical(mut canonical) = self.anchoring else {
            return Ok(false);
        };
        canonical.orthonormalize()?;
        let u = canonical.u_axis * (canonical.u_ratio * self.width);
        let v = canonical.v_axis * (canonical.v_ratio * self.height);
        self.anchoring = Anchoring::Raw(RawAnchoring {
            origin: canonical.center - (u + v) / 2.0,
            u,
            v,
        });
        Ok(true)
    }

    /// Fills an unknown anchoring by evaluating one estimator per canonical
    /// component at this section's order key.
    ///
    /// Returns `Ok(false)` if the anchoring is already known.
    pub fn fill_from(
        &mut self,
        estimators: &[Estimator; CANONICAL_LEN],
    ) -> Result<bool, GeometryError> {
        if !self.anchoring.is_unknown() {
            return Ok(false);
        }
        let components = estimators.each_ref().map(|e| e.evaluate(self.nr));
        let mut canonical = CanonicalAnchoring::from_components(&components);
        canonical.orthonormalize()?;
        self.anchoring = Anchoring::Canonical(canonical);
        Ok(true)
    }
}

use crate::anchoring::{Anchoring, CANONICAL_LEN, GeometryError, RawAnchoring, Section};
use crate::estimator::{Estimator, EstimatorError, Regression};

use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, io::Read, path::Path};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("only {known} of {total} sections are anchored, at least 2 are needed")]
    Underdetermined { known: usize, total: usize },

    #[error("section {filename}: {source}")]
    Geometry {
        filename: String,
        #[source]
        source: GeometryError,
    },

    #[error("section {0} could not be placed")]
    Unresolved(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SeriesError {
    fn geometry(section: &Section) -> impl FnOnce(GeometryError) -> Self + '_ {
        move |source| Self::Geometry {
            filename: section.filename.clone(),
            source,
        }
    }
}

/// A series of sections as stored in a registration JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target: String,
    /// Target volume dimensions in voxels.
    #[serde(rename = "target-resolution", default)]
    pub resolution: Option<[f64; 3]>,
    #[serde(default)]
    pub slices: Vec<Section>,
}

/// A section whose placement is fully known.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSection {
    pub filename: String,
    pub nr: f64,
    pub width: f64,
    pub height: f64,
    pub anchoring: RawAnchoring,
}

#[derive(Debug, Clone)]
pub struct ResolvedSeries {
    pub name: String,
    pub target: String,
    pub resolution: Option<[f64; 3]>,
    /// Sorted by order key.
    pub sections: Vec<ResolvedSection>,
}

impl Series {
    pub fn load_from_reader(reader: impl Read) -> Result<Self, SeriesError> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, SeriesError> {
        let file = File::open(path.as_ref())?;
        Self::load_from_reader(BufReader::new(file))
    }

    /// Places every section of the series.
    ///
    /// Anchored sections are converted to canonical form and fitted with one
    /// least squares line per component. The first and last sections are
    /// extrapolated from that fit when unknown, every remaining gap is
    /// linearly interpolated between its two neighbours.
    ///
    /// # Errors
    ///
    /// Returns [`SeriesError::Underdetermined`] if fewer than two sections are
    /// anchored while some are still unknown, and [`SeriesError::Geometry`]
    /// for degenerate anchorings or coincident order keys around a gap.
    #[instrument(skip(self), fields(name = %self.name, sections = self.slices.len()))]
    pub fn propagate(self) -> Result<ResolvedSeries, SeriesError> {
        let Series {
            name,
            target,
            resolution,
            slices: mut sections,
        } = self;
        sections.sort_by(|a, b| a.nr.total_cmp(&b.nr));
        let total = sections.len();

        let mut regressions: [Regression; CANONICAL_LEN] = Default::default();
        let mut known = 0;
        for section in &mut sections {
            section.decompose().map_err(SeriesError::geometry(section))?;
            if let Some(canonical) = section.anchoring.canonical() {
                known += 1;
                for (fit, value) in regressions.iter_mut().zip(canonical.components()) {
                    fit.add(section.nr, value);
                }
            }
        }
        debug!(known, total, "decomposed anchored sections");

        if known < total {
            if known < 2 {
                return Err(SeriesError::Underdetermined { known, total });
            }
            let trend = regressions.map(Estimator::Regression);
            for index in [0, total - 1] {
                let section = &mut sections[index];
                if section.fill_from(&trend).map_err(SeriesError::geometry(section))? {
                    debug!(filename = %section.filename, nr = section.nr, "extrapolated");
                }
            }
            Self::fill_gaps(&mut sections)?;
        }

        let sections = sections
            .into_iter()
            .map(Self::resolve)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResolvedSeries {
            name,
            target,
            resolution,
            sections,
        })
    }

    /// Interpolates every run of unknown sections between its known
    /// neighbours. The first and last sections must already be known.
    fn fill_gaps(sections: &mut [Section]) -> Result<(), SeriesError> {
        let mut start = 1;
        while start < sections.len() {
            if !sections[start].anchoring.is_unknown() {
                start += 1;
                continue;
            }
            let Some(end) = (start..sections.len()).find(|&i| !sections[i].anchoring.is_unknown())
            else {
                return Err(SeriesError::Unresolved(sections[start].filename.clone()));
            };
            let (before, after) = (&sections[start - 1], &sections[end]);
            let (Some(first), Some(last)) =
                (before.anchoring.canonical(), after.anchoring.canonical())
            else {
                return Err(SeriesError::Unresolved(sections[start].filename.clone()));
            };
            let estimators = Estimator::interpolations(
                before.nr,
                &first.components(),
                after.nr,
                &last.components(),
            )
            .map_err(|source: EstimatorError| SeriesError::Geometry {
                filename: sections[start].filename.clone(),
                source: source.into(),
            })?;
            debug!(from = before.nr, to = after.nr, count = end - start, "interpolating gap");

            for section in &mut sections[start..end] {
                section
                    .fill_from(&estimators)
                    .map_err(SeriesError::geometry(section))?;
            }
            start = end + 1;
        }
        Ok(())
    }

    fn resolve(mut section: Section) -> Result<ResolvedSection, SeriesError> {
        section.recompose().map_err(SeriesError::geometry(&section))?;
        match section.anchoring {
            Anchoring::Raw(anchoring) => Ok(ResolvedSection {
                filename: section.filename,
                nr: section.nr,
                width: section.width,
                height: section.height,
                anchoring,
            }),
            _ => Err(SeriesError::Unresolved(section.filename)),
        }
    }
}

impl ResolvedSeries {
    /// Target volume dimensions rounded down to whole voxels.
    pub fn dimensions(&self) -> Option<[usize; 3]> {
        self.resolution
            .map(|resolution| resolution.map(|d| d.max(0.0) as usize))
    }
}

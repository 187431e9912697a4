//! Path file loader.
//!
//! ```toml
//! [[paths]]
//! points = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0]]
//!
//! [[paths]]
//! points = [[20.0, 5.0], [30.0, 5.0]]
//! ```
//!
//! Coordinates are millimetres.

use crate::CliError;
use cplot_common::config::{ConfigError, ConfigLoader};
use cplot_motion::{Point2, Polyline};
use serde::Deserialize;
use std::path::Path;

/// One polyline as written in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathEntry {
    /// Points in drawing order.
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
}

/// Parsed path file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathFile {
    /// Polylines in drawing order.
    #[serde(default)]
    pub paths: Vec<PathEntry>,
}

impl PathFile {
    /// Read and validate `path`.
    ///
    /// # Errors
    /// `CliError::PathFile` when the file is missing, unparsable or holds
    /// non-finite coordinates.
    pub fn read(path: &Path) -> Result<Self, CliError> {
        let failure = |reason: String| CliError::PathFile {
            path: path.to_path_buf(),
            reason,
        };
        let file = Self::load(path).map_err(|e| match e {
            ConfigError::FileNotFound => failure("file not found".to_string()),
            other => failure(other.to_string()),
        })?;
        file.check().map_err(failure)?;
        Ok(file)
    }

    fn check(&self) -> Result<(), String> {
        for (index, entry) in self.paths.iter().enumerate() {
            if let Some([x, y]) = entry
                .points
                .iter()
                .find(|[x, y]| !x.is_finite() || !y.is_finite())
            {
                return Err(format!("path {} has a non-finite point ({x}, {y})", index + 1));
            }
        }
        Ok(())
    }

    /// Polylines for the planner.
    pub fn polylines(&self) -> Vec<Polyline> {
        self.paths
            .iter()
            .map(|entry| entry.points.iter().copied().map(Point2::from).collect())
            .collect()
    }

    /// Total number of points.
    pub fn point_count(&self) -> usize {
        self.paths.iter().map(|p| p.points.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_polylines_in_order() {
        let file = PathFile::from_toml(
            "[[paths]]\npoints = [[0, 0], [10, 0]]\n\n[[paths]]\npoints = [[5.5, 2.25]]\n",
        )
        .unwrap();
        assert_eq!(file.point_count(), 3);
        let polylines = file.polylines();
        assert_eq!(polylines.len(), 2);
        assert_eq!(polylines[0][1], Point2::new(10.0, 0.0));
        assert_eq!(polylines[1][0], Point2::new(5.5, 2.25));
    }

    #[test]
    fn empty_file_has_no_paths() {
        let file = PathFile::from_toml("").unwrap();
        assert!(file.polylines().is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PathFile::from_toml("[[paths]]\npts = [[0, 0]]\n").is_err());
    }

    #[test]
    fn non_finite_points_are_rejected() {
        let file = PathFile::from_toml("[[paths]]\npoints = [[0, 0], [nan, 1]]\n").unwrap();
        assert!(file.check().unwrap_err().contains("path 1"));
    }
}

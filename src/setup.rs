// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config;

/// A normalized LED position. Always three components; 2D setups carry z = 0.
pub type Coordinate = [f64; 3];

#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("setup '{name}' has a coordinate with {components} components at index {index}")]
    InvalidCoordinate {
        name: String,
        index: usize,
        components: usize,
    },

    #[error("setup '{0}' has no coordinates")]
    Empty(String),

    #[error("setup '{0}' not found")]
    NotFound(String),

    #[error("unable to read setup {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unable to parse setup {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Whether the installation is laid out on a plane or in a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimensionality {
    #[serde(rename = "2D")]
    TwoD,
    #[serde(rename = "3D")]
    ThreeD,
}

impl Dimensionality {
    /// The axis that points up: z for volumes, y for planes.
    pub fn vertical_axis(&self) -> usize {
        match self {
            Dimensionality::TwoD => 1,
            Dimensionality::ThreeD => 2,
        }
    }
}

impl fmt::Display for Dimensionality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimensionality::TwoD => write!(f, "2D"),
            Dimensionality::ThreeD => write!(f, "3D"),
        }
    }
}

/// The physical layout of the installation. Never mutated after construction;
/// a setup change replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct Setup {
    name: String,
    dimensionality: Dimensionality,
    coordinates: Vec<Coordinate>,
    creation_date: Option<String>,
}

impl Setup {
    /// Creates a setup from raw coordinates, injecting z = 0 for 2-component
    /// coordinates. Any other arity is rejected. 2D setups always end up with z = 0.
    pub fn new(
        name: &str,
        dimensionality: Dimensionality,
        raw: Vec<Vec<f64>>,
        creation_date: Option<String>,
    ) -> Result<Setup, SetupError> {
        if raw.is_empty() {
            return Err(SetupError::Empty(name.to_string()));
        }

        let coordinates = raw
            .into_iter()
            .enumerate()
            .map(|(index, coordinate)| match coordinate.as_slice() {
                [x, y] => Ok([*x, *y, 0.0]),
                [x, y, z] => Ok([*x, *y, *z]),
                _ => Err(SetupError::InvalidCoordinate {
                    name: name.to_string(),
                    index,
                    components: coordinate.len(),
                }),
            })
            .collect::<Result<Vec<Coordinate>, SetupError>>()?;

        Ok(Setup::flattened(Setup {
            name: name.to_string(),
            dimensionality,
            coordinates,
            creation_date,
        }))
    }

    /// Creates a setup from coordinates that already have three components.
    pub fn from_coordinates(
        name: &str,
        dimensionality: Dimensionality,
        coordinates: Vec<Coordinate>,
    ) -> Setup {
        Setup::flattened(Setup {
            name: name.to_string(),
            dimensionality,
            coordinates,
            creation_date: None,
        })
    }

    fn flattened(mut setup: Setup) -> Setup {
        if setup.dimensionality == Dimensionality::TwoD {
            setup.coordinates.iter_mut().for_each(|c| c[2] = 0.0);
        }
        setup
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.dimensionality
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    pub fn creation_date(&self) -> Option<&str> {
        self.creation_date.as_deref()
    }

    pub fn led_count(&self) -> usize {
        self.coordinates.len()
    }

    pub fn bounds(&self) -> Bounds {
        Bounds::of(&self.coordinates)
    }
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} LEDs)",
            self.name,
            self.dimensionality,
            self.coordinates.len()
        )
    }
}

/// Axis-aligned bounding box of a set of coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Coordinate,
    pub max: Coordinate,
}

impl Bounds {
    pub fn of(coordinates: &[Coordinate]) -> Bounds {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for coordinate in coordinates {
            for axis in 0..3 {
                min[axis] = min[axis].min(coordinate[axis]);
                max[axis] = max[axis].max(coordinate[axis]);
            }
        }
        if coordinates.is_empty() {
            min = [0.0; 3];
            max = [0.0; 3];
        }
        Bounds { min, max }
    }

    /// Extent along the given axis (0 = x, 1 = y, 2 = z).
    pub fn size(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }

    /// Maps `value` on `axis` to 0.0..=1.0. Degenerate axes map to 0.0.
    pub fn normalize(&self, axis: usize, value: f64) -> f64 {
        let size = self.size(axis);
        if size <= f64::EPSILON {
            return 0.0;
        }
        ((value - self.min[axis]) / size).clamp(0.0, 1.0)
    }

    pub fn center(&self) -> Coordinate {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }
}

/// Euclidean distance between two coordinates.
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

/// A directory of `<name>.json` setup files.
pub struct SetupRepository {
    dir: PathBuf,
}

impl SetupRepository {
    pub fn new(dir: &Path) -> SetupRepository {
        SetupRepository {
            dir: dir.to_path_buf(),
        }
    }

    /// Loads the setup with the given name.
    pub fn load(&self, name: &str) -> Result<Arc<Setup>, SetupError> {
        let path = self.dir.join(format!("{}.json", name));
        if !path.exists() {
            return Err(SetupError::NotFound(name.to_string()));
        }
        let setup = config::setup::SetupFile::read(&path)?.to_setup(name)?;
        info!(setup = %setup, "Loaded setup.");
        Ok(Arc::new(setup))
    }

    /// Lists the names of all setups, sorted.
    pub fn list(&self) -> Result<Vec<String>, SetupError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| SetupError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    error!(err = %e, "Error reading setup directory entry");
                    None
                }
            })
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|path| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_2d_coordinates_gain_z() -> Result<(), SetupError> {
        let setup = Setup::new(
            "flat",
            Dimensionality::TwoD,
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            None,
        )?;
        assert_eq!(&[[1.0, 2.0, 0.0], [3.0, 4.0, 0.0]], setup.coordinates());
        Ok(())
    }

    #[test]
    fn test_2d_setups_drop_z() -> Result<(), SetupError> {
        let setup = Setup::new(
            "flat",
            Dimensionality::TwoD,
            vec![vec![1.0, 2.0, 7.0], vec![3.0, 4.0]],
            None,
        )?;
        assert_eq!(&[[1.0, 2.0, 0.0], [3.0, 4.0, 0.0]], setup.coordinates());

        let setup = Setup::from_coordinates("flat", Dimensionality::TwoD, vec![[1.0, 2.0, 3.0]]);
        assert_eq!(&[[1.0, 2.0, 0.0]], setup.coordinates());

        let setup = Setup::from_coordinates("tree", Dimensionality::ThreeD, vec![[1.0, 2.0, 3.0]]);
        assert_eq!(&[[1.0, 2.0, 3.0]], setup.coordinates());
        Ok(())
    }

    #[test]
    fn test_invalid_arity() {
        let result = Setup::new(
            "broken",
            Dimensionality::ThreeD,
            vec![vec![1.0, 2.0, 3.0], vec![1.0]],
            None,
        );
        assert!(matches!(
            result,
            Err(SetupError::InvalidCoordinate {
                index: 1,
                components: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_bounds() {
        let bounds = Bounds::of(&[[0.0, -1.0, 2.0], [4.0, 1.0, 10.0]]);
        assert_eq!([0.0, -1.0, 2.0], bounds.min);
        assert_eq!([4.0, 1.0, 10.0], bounds.max);
        assert_eq!(8.0, bounds.size(2));
        assert_eq!(0.5, bounds.normalize(0, 2.0));
        assert_eq!([2.0, 0.0, 6.0], bounds.center());
        assert_eq!(0.0, Bounds::of(&[[1.0, 1.0, 1.0]]).normalize(0, 1.0));
    }

    #[test]
    fn test_repository() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join("tree.json"),
            r#"{"type": "3D", "coordinates": [[0, 0, 0], [1, 2, 3]]}"#,
        )?;
        fs::write(
            dir.path().join("wall.json"),
            r#"{"type": "2D", "coordinates": [[0, 0], [5, 5]], "creation_date": "2024-12-01"}"#,
        )?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;

        let repository = SetupRepository::new(dir.path());
        assert_eq!(vec!["tree", "wall"], repository.list()?);

        let wall = repository.load("wall")?;
        assert_eq!(Dimensionality::TwoD, wall.dimensionality());
        assert_eq!([5.0, 5.0, 0.0], wall.coordinates()[1]);
        assert_eq!(Some("2024-12-01"), wall.creation_date());

        assert!(matches!(
            repository.load("missing"),
            Err(SetupError::NotFound(_))
        ));
        Ok(())
    }
}

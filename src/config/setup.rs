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
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::setup::{Dimensionality, Setup, SetupError};

/// The on-disk setup format. The setup name is the file stem and is not stored.
#[derive(Deserialize, Serialize)]
pub struct SetupFile {
    /// "2D" or "3D".
    #[serde(rename = "type")]
    pub dimensionality: Dimensionality,

    /// `[x, y]` or `[x, y, z]` per LED, in strip order.
    pub coordinates: Vec<Vec<f64>>,

    /// When the setup was captured, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
}

impl SetupFile {
    /// Reads a setup file.
    pub fn read(path: &Path) -> Result<SetupFile, SetupError> {
        let contents = fs::read_to_string(path).map_err(|source| SetupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| SetupError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Converts the file contents into a normalized setup.
    pub fn to_setup(self, name: &str) -> Result<Setup, SetupError> {
        Setup::new(
            name,
            self.dimensionality,
            self.coordinates,
            self.creation_date,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() -> Result<(), Box<dyn std::error::Error>> {
        let file: SetupFile =
            serde_json::from_str(r#"{"type": "3D", "coordinates": [[1, 2, 3]]}"#)?;
        assert_eq!(Dimensionality::ThreeD, file.dimensionality);
        let setup = file.to_setup("cube")?;
        assert_eq!("cube", setup.name());
        assert_eq!(1, setup.led_count());

        assert!(serde_json::from_str::<SetupFile>(r#"{"type": "4D", "coordinates": []}"#).is_err());
        Ok(())
    }
}

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
use std::{collections::BTreeMap, path::Path};

use config::{Config, File};
use serde::Deserialize;

use super::error::ConfigError;

/// Extensions the sandbox recognizes as scripts.
pub const SCRIPT_EXTENSIONS: [&str; 4] = ["yaml", "yml", "json", "toml"];

/// Written into an empty sandbox directory.
pub const DEFAULT_SCRIPT_NAME: &str = "breathing.yaml";
pub const DEFAULT_SCRIPT: &str = r##"# Sandbox scripts pick a built-in effect and override its parameters.
# Save the file and the running effect is rebuilt.
effect: breathing
parameters:
  Fade Speed: 50
  Color: "#FF0000"
"##;

/// A sandbox script: a built-in effect and the parameter values to run it with.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Script {
    pub effect: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl Script {
    /// Loads a script. The format follows the file extension.
    pub fn deserialize(path: &Path) -> Result<Script, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?)
    }
}

/// Whether the path looks like a sandbox script.
pub fn is_script(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

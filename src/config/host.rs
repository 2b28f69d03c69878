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
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;

pub const DEFAULT_SIMULATOR_ADDRESS: &str = "127.0.0.1:4897";
const DEFAULT_SANDBOX_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Where rendered frames go.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Sink {
    /// Streams frames to simulator clients over TCP.
    Simulator { address: Option<String> },
    /// Discards frames.
    #[serde(alias = "none")]
    Null,
}

impl Default for Sink {
    fn default() -> Self {
        Sink::Simulator { address: None }
    }
}

/// The host configuration. Every field is optional; relative directories are
/// resolved against the directory containing the config file.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Host {
    setups_dir: Option<String>,
    lightshows_dir: Option<String>,
    audio_dir: Option<String>,
    sandbox_dir: Option<String>,
    cache_dir: Option<String>,
    state_file: Option<String>,

    /// Brightness used when nothing has been persisted yet.
    brightness: Option<f64>,

    #[serde(default)]
    sink: Sink,

    /// How often the sandbox directory is polled, e.g. "500ms".
    sandbox_poll_interval: Option<String>,

    #[serde(skip)]
    base: PathBuf,
}

impl Host {
    /// Loads the host configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Host, ConfigError> {
        let mut host: Host = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        host.base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(host)
    }

    /// A configuration rooted at `base` with every default applied.
    pub fn rooted_at(base: &Path) -> Host {
        Host {
            base: base.to_path_buf(),
            ..Default::default()
        }
    }

    fn resolve(&self, configured: &Option<String>, default: &str) -> PathBuf {
        let path = PathBuf::from(configured.as_deref().unwrap_or(default));
        if path.is_absolute() {
            path
        } else {
            self.base.join(path)
        }
    }

    pub fn setups_dir(&self) -> PathBuf {
        self.resolve(&self.setups_dir, "setups")
    }

    pub fn lightshows_dir(&self) -> PathBuf {
        self.resolve(&self.lightshows_dir, "lightshows")
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.resolve(&self.audio_dir, "audio")
    }

    pub fn sandbox_dir(&self) -> PathBuf {
        self.resolve(&self.sandbox_dir, "sandbox")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.cache_dir, "cache")
    }

    pub fn state_file(&self) -> PathBuf {
        self.resolve(&self.state_file, "state.json")
    }

    pub fn brightness(&self) -> f64 {
        self.brightness.unwrap_or(1.0).clamp(0.0, 1.0)
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// The simulator listen address, if the simulator sink is selected.
    pub fn simulator_address(&self) -> Result<Option<SocketAddr>, ConfigError> {
        match &self.sink {
            Sink::Simulator { address } => {
                let address = address.as_deref().unwrap_or(DEFAULT_SIMULATOR_ADDRESS);
                address
                    .parse()
                    .map(Some)
                    .map_err(|_| ConfigError::Address(address.to_string()))
            }
            Sink::Null => Ok(None),
        }
    }

    pub fn sandbox_poll_interval(&self) -> Result<Duration, ConfigError> {
        match &self.sandbox_poll_interval {
            Some(interval) => DurationString::from_string(interval.clone())
                .map(Into::into)
                .map_err(|reason| ConfigError::Duration {
                    value: interval.clone(),
                    reason: reason.to_string(),
                }),
            None => Ok(DEFAULT_SANDBOX_POLL_INTERVAL),
        }
    }
}

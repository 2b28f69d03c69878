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
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::error::ConfigError;

const DEFAULT_BRIGHTNESS: f64 = 1.0;

/// Frame rate profile for the audio-driven engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceMode {
    Low,
    #[default]
    Normal,
    High,
}

impl PerformanceMode {
    pub fn fps(&self) -> u32 {
        match self {
            PerformanceMode::Low => 20,
            PerformanceMode::Normal => 30,
            PerformanceMode::High => 60,
        }
    }
}

impl FromStr for PerformanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(PerformanceMode::Low),
            "normal" => Ok(PerformanceMode::Normal),
            "high" => Ok(PerformanceMode::High),
            _ => Err(format!("unknown performance mode '{}'", s)),
        }
    }
}

impl fmt::Display for PerformanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceMode::Low => write!(f, "low"),
            PerformanceMode::Normal => write!(f, "normal"),
            PerformanceMode::High => write!(f, "high"),
        }
    }
}

fn default_brightness() -> f64 {
    DEFAULT_BRIGHTNESS
}

/// Process-wide settings that survive restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Name of the active setup.
    #[serde(default)]
    pub current_setup: Option<String>,

    /// Key of the effect last selected in the effects engine.
    #[serde(default)]
    pub current_effect: Option<String>,

    /// Raw parameter overrides, per effect key, per parameter name.
    #[serde(default)]
    pub parameters: BTreeMap<String, BTreeMap<String, serde_json::Value>>,

    /// Output brightness, 0.0..=1.0.
    #[serde(default = "default_brightness")]
    pub brightness: f64,

    #[serde(default)]
    pub performance_mode: PerformanceMode,

    /// The sandbox script that was open when the sandbox was last used.
    #[serde(default)]
    pub sandbox_opened_file: Option<String>,
}

impl Default for State {
    fn default() -> Self {
        State {
            current_setup: None,
            current_effect: None,
            parameters: BTreeMap::new(),
            brightness: DEFAULT_BRIGHTNESS,
            performance_mode: PerformanceMode::default(),
            sandbox_opened_file: None,
        }
    }
}

/// Key-value settings store. Read once at startup and written through on every
/// mutation. A store without a path keeps everything in memory.
pub struct StateStore {
    path: Option<PathBuf>,
    state: Mutex<State>,
}

impl StateStore {
    /// Opens the store at `path`. A missing file starts from defaults.
    pub fn open(path: &Path) -> Result<StateStore, ConfigError> {
        let state = if path.exists() {
            let state: State = serde_json::from_str(&fs::read_to_string(path)?)?;
            info!(path = %path.display(), "Loaded persisted state.");
            state
        } else {
            info!(path = %path.display(), "No persisted state, using defaults.");
            State::default()
        };

        Ok(StateStore {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        })
    }

    /// Creates a store that never touches the disk.
    pub fn in_memory(state: State) -> StateStore {
        StateStore {
            path: None,
            state: Mutex::new(state),
        }
    }

    /// Returns a copy of the current state.
    pub fn get(&self) -> State {
        self.state.lock().clone()
    }

    /// Reads a value out of the state without cloning all of it.
    pub fn read<T>(&self, f: impl FnOnce(&State) -> T) -> T {
        f(&self.state.lock())
    }

    /// Applies `f` to the state and persists the result.
    pub fn update<T>(&self, f: impl FnOnce(&mut State) -> T) -> Result<T, ConfigError> {
        let mut state = self.state.lock();
        let result = f(&mut state);
        self.persist(&state)?;
        Ok(result)
    }

    /// Returns the persisted raw value of an effect parameter.
    pub fn parameter(&self, effect: &str, parameter: &str) -> Option<serde_json::Value> {
        self.read(|state| {
            state
                .parameters
                .get(effect)
                .and_then(|parameters| parameters.get(parameter))
                .cloned()
        })
    }

    /// Returns all persisted raw parameter values of an effect.
    pub fn parameters(&self, effect: &str) -> BTreeMap<String, serde_json::Value> {
        self.read(|state| state.parameters.get(effect).cloned().unwrap_or_default())
    }

    fn persist(&self, state: &State) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let serialized = serde_json::to_string_pretty(state)?;
        if let Err(e) = fs::write(path, serialized) {
            error!(err = %e, path = %path.display(), "Unable to persist state");
            return Err(e.into());
        }
        debug!(path = %path.display(), "Persisted state.");
        Ok(())
    }
}

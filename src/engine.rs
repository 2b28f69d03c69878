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
//! Engines are the subsystems that take turns driving the renderer. The
//! [`EngineManager`] makes sure only one of them does so at a time.

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use crate::audio::AudioError;
use crate::config::ConfigError;
use crate::effect::EffectError;
use crate::lightshow::{CompileError, DocumentError};
use crate::renderer::RendererError;
use crate::setup::Setup;

mod calibration;
mod canvas;
mod clock;
mod effects;
mod lightshow;
mod manager;
mod runner;
mod sandbox;
mod visualiser;

pub use calibration::CalibrationEngine;
pub use canvas::CanvasEngine;
pub use clock::{Clock, FrameSource};
pub use effects::{EffectsEngine, EffectsStatus};
pub use lightshow::LightshowEngine;
pub use manager::EngineManager;
pub use sandbox::{SandboxEngine, SandboxStatus};
pub use visualiser::VisualiserEngine;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine '{0}' is not registered")]
    NotRegistered(String),

    #[error("the active engine '{active}' does not play audio")]
    WrongEngineType { active: String },

    #[error("engine '{0}' has nothing loaded")]
    NothingLoaded(String),

    #[error("engine '{0}' has no setup")]
    NoSetup(String),

    #[error("LED {index} is out of range for {len} LEDs")]
    InvalidIndex { index: usize, len: usize },

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error(transparent)]
    Effect(#[from] EffectError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A subsystem that may drive the renderer while it is active.
///
/// Engines are created once and shared. All methods take `&self`, so engines keep
/// their mutable state behind their own locks.
pub trait Engine: Send + Sync {
    fn name(&self) -> &str;

    /// Called when the engine becomes the active engine.
    fn on_enable(&self) -> Result<(), EngineError>;

    /// Called when another engine takes over. Must stop every background thread
    /// before returning and leave the renderer cleared.
    fn on_disable(&self);

    /// Called for every engine, active or not, when the installation changes.
    fn on_setup_changed(&self, setup: Arc<Setup>);

    /// The audio transport, for engines that play along with a track.
    fn as_audio(&self) -> Option<&dyn AudioEngine> {
        None
    }
}

/// An engine that renders in sync with an audio track through a [`Clock`].
pub trait AudioEngine: Send + Sync {
    fn clock(&self) -> &Clock;

    /// Prepares the engine for the named file. Stops any current playback.
    fn on_audio_load(&self, name: &str) -> Result<(), EngineError>;

    fn play(&self) -> Result<(), EngineError> {
        self.clock().play()
    }

    fn pause(&self) {
        self.clock().pause()
    }

    fn stop(&self) {
        self.clock().stop()
    }

    fn seek(&self, position: Duration) -> Result<(), EngineError> {
        self.clock().seek(position)
    }

    fn position(&self) -> Duration {
        self.clock().position()
    }

    fn length(&self) -> Option<Duration> {
        self.clock().length()
    }

    fn is_playing(&self) -> bool {
        self.clock().is_playing()
    }
}

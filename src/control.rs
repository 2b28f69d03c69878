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
use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, span, Level, Span};

use crate::cache::Cache;
use crate::color::Rgb;
use crate::config::{ConfigError, Host, PerformanceMode, StateStore};
use crate::effect::{EffectInfo, EffectRegistry};
use crate::engine::{
    AudioEngine, CalibrationEngine, CanvasEngine, EffectsEngine, EffectsStatus, Engine, EngineError,
    EngineManager, LightshowEngine, SandboxEngine, SandboxStatus, VisualiserEngine,
};
use crate::lightshow::LightshowRegistry;
use crate::renderer::{Renderer, Sink};
use crate::setup::{Setup, SetupError, SetupRepository};

pub mod console;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("no setups found")]
    NoSetups,

    #[error("setup '{name}' has {actual} LEDs, the installation has {expected}")]
    LedCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("brightness {0} is outside 0.0..=1.0")]
    InvalidBrightness(f64),

    #[error("unknown audio engine '{0}'")]
    UnknownAudioEngine(String),
}

/// The engines that play along with a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioTarget {
    Visualiser,
    Lightshow,
}

impl FromStr for AudioTarget {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "visualiser" | "visualizer" => Ok(AudioTarget::Visualiser),
            "lightshow" => Ok(AudioTarget::Lightshow),
            _ => Err(ControlError::UnknownAudioEngine(s.to_string())),
        }
    }
}

impl fmt::Display for AudioTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioTarget::Visualiser => write!(f, "visualiser"),
            AudioTarget::Lightshow => write!(f, "lightshow"),
        }
    }
}

/// Where an audio engine is in its track.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransportStatus {
    pub playing: bool,
    pub position: f64,
    pub length: Option<f64>,
}

impl TransportStatus {
    fn of(engine: &dyn AudioEngine) -> TransportStatus {
        TransportStatus {
            playing: engine.is_playing(),
            position: engine.position().as_secs_f64(),
            length: engine.length().map(|length| length.as_secs_f64()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ControllerStatus {
    pub active_engine: Option<String>,
    pub setup: String,
    pub led_count: usize,
    pub brightness: f64,
    pub performance_mode: PerformanceMode,
}

/// The single entry point for everything that wants to drive the LEDs. Every call
/// that touches an engine goes through the manager, which makes that engine the
/// active one first.
pub struct Controller {
    manager: EngineManager,
    renderer: Arc<Renderer>,
    store: Arc<StateStore>,
    setups: SetupRepository,
    effects: Arc<EffectsEngine>,
    calibration: Arc<CalibrationEngine>,
    canvas: Arc<CanvasEngine>,
    sandbox: Arc<SandboxEngine>,
    visualiser: Arc<VisualiserEngine>,
    lightshow: Arc<LightshowEngine>,
    span: Span,
}

impl Controller {
    /// Loads the persisted setup, creates every engine and activates the effects
    /// engine.
    pub fn new(
        host: &Host,
        store: Arc<StateStore>,
        sink: Box<dyn Sink>,
    ) -> Result<Controller, ControlError> {
        let span = span!(Level::INFO, "controller");
        let _enter = span.enter();

        let setups = SetupRepository::new(&host.setups_dir());
        let setup = Controller::initial_setup(&setups, &store)?;

        let renderer = Arc::new(Renderer::new(setup.led_count(), sink));
        renderer.set_brightness(store.read(|s| s.brightness));
        let cache = Cache::new(&host.cache_dir());

        let effects = Arc::new(EffectsEngine::new(
            renderer.clone(),
            store.clone(),
            EffectRegistry::builtin(),
            Some(cache.clone()),
        ));
        let calibration = Arc::new(CalibrationEngine::new(renderer.clone()));
        let canvas = Arc::new(CanvasEngine::new(renderer.clone()));
        let sandbox = Arc::new(SandboxEngine::new(
            renderer.clone(),
            store.clone(),
            EffectRegistry::builtin(),
            &host.sandbox_dir(),
            host.sandbox_poll_interval()?,
        ));
        let visualiser = Arc::new(VisualiserEngine::new(
            renderer.clone(),
            store.clone(),
            &host.audio_dir(),
            Some(cache),
        ));
        let lightshow = Arc::new(LightshowEngine::new(
            renderer.clone(),
            store.clone(),
            LightshowRegistry::builtin(),
            &host.lightshows_dir(),
            &host.audio_dir(),
        ));

        let manager = EngineManager::new(setup.clone());
        manager.register(effects.clone())?;
        let others: [Arc<dyn Engine>; 5] = [
            calibration.clone(),
            canvas.clone(),
            sandbox.clone(),
            visualiser.clone(),
            lightshow.clone(),
        ];
        for engine in others {
            // Only the engine that becomes active hears about the setup on registration.
            engine.on_setup_changed(setup.clone());
            manager.register(engine)?;
        }

        info!(setup = setup.name(), leds = setup.led_count(), "Controller ready");
        drop(_enter);
        Ok(Controller {
            manager,
            renderer,
            store,
            setups,
            effects,
            calibration,
            canvas,
            sandbox,
            visualiser,
            lightshow,
            span,
        })
    }

    /// The persisted setup, or the first one available (which is then persisted).
    fn initial_setup(
        setups: &SetupRepository,
        store: &StateStore,
    ) -> Result<Arc<Setup>, ControlError> {
        if let Some(name) = store.read(|s| s.current_setup.clone()) {
            match setups.load(&name) {
                Ok(setup) => return Ok(setup),
                Err(e) => info!(setup = name, err = %e, "Persisted setup unavailable"),
            }
        }
        let name = setups
            .list()?
            .into_iter()
            .next()
            .ok_or(ControlError::NoSetups)?;
        let setup = setups.load(&name)?;
        store.update(|s| s.current_setup = Some(name))?;
        Ok(setup)
    }

    pub fn status(&self) -> ControllerStatus {
        let setup = self.manager.current_setup();
        let state = self.store.get();
        ControllerStatus {
            active_engine: self.manager.active_name(),
            setup: setup.name().to_string(),
            led_count: setup.led_count(),
            brightness: state.brightness,
            performance_mode: state.performance_mode,
        }
    }

    /// Disables the active engine. Used at process exit.
    pub fn shutdown(&self) {
        let _enter = self.span.enter();
        self.manager.shutdown();
    }

    // Effects.

    pub fn set_effect(&self, key: &str) -> Result<(), ControlError> {
        Ok(self
            .manager
            .require_active(&self.effects, |effects| effects.set_effect(key))?)
    }

    pub fn set_parameter(&self, name: &str, value: Value) -> Result<(), ControlError> {
        Ok(self
            .manager
            .require_active(&self.effects, |effects| effects.set_parameter(name, value))?)
    }

    pub fn get_state(&self) -> Result<EffectsStatus, ControlError> {
        Ok(self
            .manager
            .require_active(&self.effects, |effects| Ok(effects.get_state()))?)
    }

    pub fn get_parameters(&self, key: &str) -> Result<Vec<Value>, ControlError> {
        Ok(self
            .manager
            .require_active(&self.effects, |effects| effects.get_parameters(key))?)
    }

    pub fn list_effects(&self) -> Result<Vec<EffectInfo>, ControlError> {
        Ok(self
            .manager
            .require_active(&self.effects, |effects| Ok(effects.list_effects()))?)
    }

    // Installation.

    pub fn list_setups(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.setups.list()?)
    }

    /// Switches to another setup of the same size. The renderer is sized once at
    /// startup, so a setup with a different LED count is rejected.
    pub fn change_setup(&self, name: &str) -> Result<(), ControlError> {
        let _enter = self.span.enter();
        let setup = self.setups.load(name)?;
        if setup.led_count() != self.renderer.len() {
            return Err(ControlError::LedCountMismatch {
                name: name.to_string(),
                expected: self.renderer.len(),
                actual: setup.led_count(),
            });
        }
        self.manager.change_setup(setup);
        self.store
            .update(|s| s.current_setup = Some(name.to_string()))?;
        Ok(())
    }

    /// Shown by the active engine on its next frame.
    pub fn set_brightness(&self, brightness: f64) -> Result<(), ControlError> {
        if !(0.0..=1.0).contains(&brightness) {
            return Err(ControlError::InvalidBrightness(brightness));
        }
        self.renderer.set_brightness(brightness);
        self.store.update(|s| s.brightness = brightness)?;
        info!(brightness, "Brightness changed");
        Ok(())
    }

    /// Takes effect the next time a track is loaded.
    pub fn set_performance_mode(&self, mode: PerformanceMode) -> Result<(), ControlError> {
        self.store.update(|s| s.performance_mode = mode)?;
        info!(mode = %mode, fps = mode.fps(), "Performance mode changed");
        Ok(())
    }

    // Calibration.

    pub fn start_calibration(&self) -> Result<(), ControlError> {
        Ok(self.manager.require_active(&self.calibration, |calibration| {
            calibration.start_calibration();
            Ok(())
        })?)
    }

    pub fn highlight(&self, index: usize) -> Result<(), ControlError> {
        Ok(self
            .manager
            .require_active(&self.calibration, |calibration| calibration.highlight(index))?)
    }

    // Canvas.

    pub fn get_pixels(&self) -> Result<Vec<Rgb>, ControlError> {
        Ok(self
            .manager
            .require_active(&self.canvas, |canvas| Ok(canvas.get_pixels()))?)
    }

    pub fn set_pixels(&self, pixels: Vec<Rgb>) -> Result<(), ControlError> {
        Ok(self
            .manager
            .require_active(&self.canvas, |canvas| canvas.set_pixels(pixels))?)
    }

    // Sandbox.

    pub fn list_sandbox_files(&self) -> Result<Vec<String>, ControlError> {
        Ok(self
            .manager
            .require_active(&self.sandbox, |sandbox| sandbox.list_files())?)
    }

    pub fn set_sandbox_file(&self, name: &str) -> Result<(), ControlError> {
        Ok(self
            .manager
            .require_active(&self.sandbox, |sandbox| sandbox.set_file(name))?)
    }

    pub fn sandbox_status(&self) -> Result<SandboxStatus, ControlError> {
        Ok(self
            .manager
            .require_active(&self.sandbox, |sandbox| Ok(sandbox.get_state()))?)
    }

    // Audio engines.

    pub fn list_lightshows(&self) -> Result<Vec<String>, ControlError> {
        Ok(self.lightshow.list_shows()?)
    }

    /// Activates `target` and runs `op` against its transport.
    fn with_audio<T, F>(&self, target: AudioTarget, op: F) -> Result<T, ControlError>
    where
        F: FnOnce(&dyn AudioEngine) -> Result<T, EngineError>,
    {
        let result = match target {
            AudioTarget::Visualiser => self
                .manager
                .require_active(&self.visualiser, |engine| op(engine)),
            AudioTarget::Lightshow => self
                .manager
                .require_active(&self.lightshow, |engine| op(engine)),
        };
        Ok(result?)
    }

    pub fn load_audio(&self, target: AudioTarget, name: &str) -> Result<(), ControlError> {
        self.with_audio(target, |engine| engine.on_audio_load(name))
    }

    pub fn play(&self, target: AudioTarget) -> Result<(), ControlError> {
        self.with_audio(target, |engine| engine.play())
    }

    pub fn pause(&self, target: AudioTarget) -> Result<(), ControlError> {
        self.with_audio(target, |engine| {
            engine.pause();
            Ok(())
        })
    }

    pub fn stop(&self, target: AudioTarget) -> Result<(), ControlError> {
        self.with_audio(target, |engine| {
            engine.stop();
            Ok(())
        })
    }

    pub fn seek(&self, target: AudioTarget, position: Duration) -> Result<(), ControlError> {
        self.with_audio(target, |engine| engine.seek(position))
    }

    pub fn audio_status(&self, target: AudioTarget) -> Result<TransportStatus, ControlError> {
        self.with_audio(target, |engine| Ok(TransportStatus::of(engine)))
    }

    // Transport of whichever engine is active.

    pub fn transport_play(&self) -> Result<(), ControlError> {
        Ok(self.manager.with_active_audio(|engine| engine.play())?)
    }

    pub fn transport_pause(&self) -> Result<(), ControlError> {
        Ok(self.manager.with_active_audio(|engine| {
            engine.pause();
            Ok(())
        })?)
    }

    pub fn transport_stop(&self) -> Result<(), ControlError> {
        Ok(self.manager.with_active_audio(|engine| {
            engine.stop();
            Ok(())
        })?)
    }

    pub fn transport_seek(&self, position: Duration) -> Result<(), ControlError> {
        Ok(self
            .manager
            .with_active_audio(|engine| engine.seek(position))?)
    }

    pub fn transport_status(&self) -> Result<TransportStatus, ControlError> {
        Ok(self
            .manager
            .with_active_audio(|engine| Ok(TransportStatus::of(engine)))?)
    }
}

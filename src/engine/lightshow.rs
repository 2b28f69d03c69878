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
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level, Span};

use super::clock::{Clock, FrameSource};
use super::{AudioEngine, Engine, EngineError};
use crate::audio;
use crate::color::Rgb;
use crate::config::lightshow::LightshowFile;
use crate::config::StateStore;
use crate::lightshow::{self, Document, LightshowRegistry};
use crate::renderer::Renderer;
use crate::setup::Setup;
use crate::util;

pub const NAME: &str = "lightshow";

#[derive(Default)]
struct Frames {
    frames: Vec<Vec<Rgb>>,
    fps: f64,
}

struct Playback {
    renderer: Arc<Renderer>,
    frames: Mutex<Frames>,
}

impl FrameSource for Playback {
    fn on_frame(&self, position: Duration) {
        let frames = self.frames.lock();
        let index = (position.as_secs_f64() * frames.fps) as usize;
        match frames.frames.get(index) {
            Some(frame) => {
                if let Err(e) = self.renderer.set_all(frame) {
                    error!(err = %e, index, "Compiled frame does not fit the renderer");
                    return;
                }
            }
            None => self.renderer.clear(),
        }
        self.renderer.show();
    }
}

/// What was loaded, kept so the show can be recompiled for another setup.
struct Loaded {
    name: String,
    document: Document,
    length: f64,
}

struct State {
    setup: Option<Arc<Setup>>,
    loaded: Option<Loaded>,
}

/// Plays precompiled timeline shows in time with their track.
pub struct LightshowEngine {
    playback: Arc<Playback>,
    clock: Clock,
    store: Arc<StateStore>,
    registry: LightshowRegistry,
    lightshows_dir: PathBuf,
    audio_dir: PathBuf,
    state: Mutex<State>,
    span: Span,
}

impl LightshowEngine {
    pub fn new(
        renderer: Arc<Renderer>,
        store: Arc<StateStore>,
        registry: LightshowRegistry,
        lightshows_dir: &Path,
        audio_dir: &Path,
    ) -> LightshowEngine {
        let playback = Arc::new(Playback {
            renderer: renderer.clone(),
            frames: Mutex::new(Frames::default()),
        });
        LightshowEngine {
            clock: Clock::new(NAME, renderer, playback.clone()),
            playback,
            store,
            registry,
            lightshows_dir: lightshows_dir.to_path_buf(),
            audio_dir: audio_dir.to_path_buf(),
            state: Mutex::new(State {
                setup: None,
                loaded: None,
            }),
            span: span!(Level::INFO, "lightshow engine"),
        }
    }

    /// The show files in the lightshow directory, by file name.
    pub fn list_shows(&self) -> Result<Vec<String>, EngineError> {
        Ok(util::list_files(&self.lightshows_dir, |path| {
            path.extension().is_some_and(|ext| ext == "json")
        })?
        .iter()
        .map(|path| util::filename_display(path).to_string())
        .collect())
    }

    /// Compiles `loaded` against the current setup and hands the frames to playback.
    fn compile(&self, setup: &Setup, loaded: &Loaded) -> Result<(), EngineError> {
        let fps = f64::from(self.store.read(|s| s.performance_mode.fps()));
        let frames = lightshow::compile(&loaded.document, setup, &self.registry, fps, loaded.length)?;
        info!(
            show = loaded.name,
            frames = frames.len(),
            fps,
            "Lightshow compiled"
        );
        *self.playback.frames.lock() = Frames { frames, fps };
        Ok(())
    }
}

impl Engine for LightshowEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn on_enable(&self) -> Result<(), EngineError> {
        info!("Enabled");
        Ok(())
    }

    fn on_disable(&self) {
        let _enter = self.span.enter();
        self.clock.stop();
        info!("Disabled");
    }

    fn on_setup_changed(&self, setup: Arc<Setup>) {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        if let Some(loaded) = &state.loaded {
            if let Err(e) = self.compile(&setup, loaded) {
                warn!(show = loaded.name, err = %e, "Unable to recompile for the new setup");
            }
        }
        state.setup = Some(setup);
    }

    fn as_audio(&self) -> Option<&dyn AudioEngine> {
        Some(self)
    }
}

impl AudioEngine for LightshowEngine {
    fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Loads the show named after `name`'s stem, so a show can be picked by its
    /// file name or by its track's.
    fn on_audio_load(&self, name: &str) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let stem = util::file_stem(name);
        let path = self.lightshows_dir.join(format!("{}.json", stem));
        if !path.is_file() {
            return Err(EngineError::FileNotFound(path));
        }
        let document = LightshowFile::read(&path)?.to_document()?;
        let audio_path = self.audio_dir.join(document.audio_file());
        if !audio_path.is_file() {
            return Err(EngineError::FileNotFound(audio_path));
        }
        let length = audio::duration(&audio_path)?;

        self.clock.stop();
        let mut state = self.state.lock();
        let setup = state
            .setup
            .clone()
            .ok_or_else(|| EngineError::NoSetup(NAME.to_string()))?;
        let loaded = Loaded {
            name: stem.to_string(),
            document,
            length: length.as_secs_f64(),
        };
        self.compile(&setup, &loaded)?;
        self.clock.load(length, self.playback.frames.lock().fps);
        state.loaded = Some(loaded);
        info!(show = stem, length = util::duration_minutes_seconds(length), "Lightshow loaded");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs};

    use super::*;
    use crate::config::State as StoredState;
    use crate::renderer::RecordingSink;
    use crate::setup::Dimensionality;
    use crate::testutil::{column_setup, sine_signal, write_wav};

    const SHOW: &str = r##"{
        "audio_file": "song.wav",
        "editorData": {"layerCount": 2},
        "timeline": [
            {"start": 0, "end": 1, "effect": "solid_color", "parameters": {"color": [255, 0, 0]}, "layer": 0},
            {"start": 0.5, "end": 1, "effect": "swipe_forward", "parameters": {"color": "#00FF00"}, "layer": 1}
        ]
    }"##;

    struct Fixture {
        _dir: tempfile::TempDir,
        engine: LightshowEngine,
        sink: RecordingSink,
    }

    fn fixture() -> Result<Fixture, Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let lightshows = dir.path().join("lightshows");
        let audio_dir = dir.path().join("audio");
        fs::create_dir_all(&lightshows)?;
        fs::create_dir_all(&audio_dir)?;
        fs::write(lightshows.join("song.json"), SHOW)?;
        write_wav(
            &audio_dir.join("song.wav"),
            &sine_signal(&[440.0], 8000, 1.0),
            1,
            8000,
        )?;

        let sink = RecordingSink::default();
        let renderer = Arc::new(Renderer::new(4, Box::new(sink.clone())));
        let store = Arc::new(StateStore::in_memory(StoredState::default()));
        let engine = LightshowEngine::new(
            renderer,
            store,
            LightshowRegistry::builtin(),
            &lightshows,
            &audio_dir,
        );
        engine.on_setup_changed(column_setup(4));
        Ok(Fixture {
            _dir: dir,
            engine,
            sink,
        })
    }

    #[test]
    fn test_load_compiles_show() -> Result<(), Box<dyn Error>> {
        let Fixture { _dir, engine, sink } = fixture()?;
        assert_eq!(vec!["song.json".to_string()], engine.list_shows()?);

        engine.on_audio_load("song.wav")?;
        let length = engine.length().ok_or("no length")?;
        assert!(length.abs_diff(Duration::from_secs(1)) < Duration::from_millis(10));
        assert_eq!(30, engine.playback.frames.lock().frames.len());

        engine.playback.on_frame(Duration::from_millis(100));
        let frame = sink.last().ok_or("no frame")?;
        assert_eq!(vec![Rgb::RED; 4], frame.leds);

        // Past the end of the compiled frames the LEDs go dark.
        engine.playback.on_frame(Duration::from_secs(3));
        let frame = sink.last().ok_or("no frame")?;
        assert_eq!(vec![Rgb::BLACK; 4], frame.leds);
        Ok(())
    }

    #[test]
    fn test_setup_change_recompiles() -> Result<(), Box<dyn Error>> {
        let Fixture { _dir, engine, sink } = fixture()?;
        engine.on_audio_load("song")?;
        let has_green = |frames: &Frames| {
            frames
                .frames
                .iter()
                .flatten()
                .any(|led| led.g > 0 && led.r == 0)
        };
        assert!(has_green(&engine.playback.frames.lock()));

        // On a plane the volume-only sweep is skipped.
        engine.on_setup_changed(Arc::new(Setup::from_coordinates(
            "row",
            Dimensionality::TwoD,
            (0..4).map(|i| [i as f64, 0.0, 0.0]).collect(),
        )));
        assert!(!has_green(&engine.playback.frames.lock()));
        engine.playback.on_frame(Duration::from_millis(900));
        assert_eq!(Some(vec![Rgb::RED; 4]), sink.last().map(|frame| frame.leds));
        Ok(())
    }

    #[test]
    fn test_missing_files() -> Result<(), Box<dyn Error>> {
        let Fixture { _dir, engine, .. } = fixture()?;
        assert!(matches!(
            engine.on_audio_load("other.wav"),
            Err(EngineError::FileNotFound(_))
        ));
        fs::write(
            engine.lightshows_dir.join("broken.json"),
            r#"{"audio_file": "gone.wav", "timeline": []}"#,
        )?;
        assert!(matches!(
            engine.on_audio_load("broken"),
            Err(EngineError::FileNotFound(path)) if path.ends_with("gone.wav")
        ));
        assert!(engine.length().is_none());
        Ok(())
    }
}

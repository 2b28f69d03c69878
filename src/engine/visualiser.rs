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
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, UNIX_EPOCH},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, warn, Level, Span};

use super::clock::{Clock, FrameSource};
use super::{AudioEngine, Engine, EngineError};
use crate::audio::{self, BarAnalyzer};
use crate::cache::Cache;
use crate::color::Rgb;
use crate::config::StateStore;
use crate::renderer::Renderer;
use crate::setup::Setup;

pub const NAME: &str = "visualiser";

const CACHE_SECTION: &str = "visualiser";

#[derive(Serialize, Deserialize)]
struct CachedAnalysis {
    length: f64,
    fps: f64,
    heights: Vec<Vec<f32>>,
}

/// Where each LED sits in the bar display.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    bar: usize,
    /// Normalized height along the vertical axis.
    height: f64,
}

#[derive(Default)]
struct Bars {
    placements: Vec<Placement>,
    colors: Vec<Rgb>,
    heights: Vec<Vec<f32>>,
    fps: f64,
}

impl Bars {
    /// Splits the setup into `bar_count` equal columns along x.
    fn layout(&mut self, setup: &Setup, bar_count: usize) {
        let bounds = setup.bounds();
        let vertical = setup.dimensionality().vertical_axis();
        self.placements = setup
            .coordinates()
            .iter()
            .map(|coordinate| {
                let x = bounds.normalize(0, coordinate[0]);
                Placement {
                    bar: ((x * bar_count as f64) as usize).min(bar_count.saturating_sub(1)),
                    height: bounds.normalize(vertical, coordinate[vertical]),
                }
            })
            .collect();
        self.colors = (0..bar_count)
            .map(|bar| Rgb::from_hsv(bar as f64 / bar_count as f64, 1.0, 1.0))
            .collect();
    }

    /// Colors every LED for one row of bar heights. A bar of height zero is dark.
    fn draw(&self, row: &[f32], pixels: &mut [Rgb]) {
        for (pixel, placement) in pixels.iter_mut().zip(&self.placements) {
            let bar_height = row.get(placement.bar).copied().unwrap_or(0.0) as f64;
            *pixel = if bar_height > 0.0 && placement.height <= bar_height {
                self.colors[placement.bar]
            } else {
                Rgb::BLACK
            };
        }
    }
}

struct Display {
    renderer: Arc<Renderer>,
    bars: Mutex<Bars>,
}

impl FrameSource for Display {
    fn on_frame(&self, position: Duration) {
        let bars = self.bars.lock();
        let index = (position.as_secs_f64() * bars.fps) as usize;
        match bars.heights.get(index) {
            Some(row) => self.renderer.update(|pixels| bars.draw(row, pixels)),
            None => self.renderer.clear(),
        }
        self.renderer.show();
    }
}

/// Plays a spectrum analyzer across the installation in time with a track.
pub struct VisualiserEngine {
    display: Arc<Display>,
    clock: Clock,
    store: Arc<StateStore>,
    audio_dir: PathBuf,
    cache: Option<Cache>,
    analyzer: BarAnalyzer,
    span: Span,
}

impl VisualiserEngine {
    pub fn new(
        renderer: Arc<Renderer>,
        store: Arc<StateStore>,
        audio_dir: &Path,
        cache: Option<Cache>,
    ) -> VisualiserEngine {
        let display = Arc::new(Display {
            renderer: renderer.clone(),
            bars: Mutex::new(Bars::default()),
        });
        VisualiserEngine {
            clock: Clock::new(NAME, renderer, display.clone()),
            display,
            store,
            audio_dir: audio_dir.to_path_buf(),
            cache,
            analyzer: BarAnalyzer::default(),
            span: span!(Level::INFO, "visualiser engine"),
        }
    }

    /// Fresh analysis of `path`, or the cached one if it was made at the same rate.
    fn analyze(&self, path: &Path, fps: f64) -> Result<CachedAnalysis, EngineError> {
        let cache_key = cache_key(path)?;
        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get_by_data(CACHE_SECTION, &cache_key))
        {
            match serde_json::from_str::<CachedAnalysis>(&cached) {
                Ok(analysis) if analysis.fps == fps => {
                    info!(path = %path.display(), "Using cached analysis");
                    return Ok(analysis);
                }
                Ok(_) => debug!("Cached analysis was made at another frame rate"),
                Err(e) => warn!(err = %e, "Ignoring unreadable cached analysis"),
            }
        }

        let pcm = audio::decode(path)?;
        let analysis = CachedAnalysis {
            length: pcm.duration().as_secs_f64(),
            fps,
            heights: self.analyzer.analyze(&pcm, fps)?,
        };
        info!(
            path = %path.display(),
            frames = analysis.heights.len(),
            "Analyzed audio"
        );
        if let Some(cache) = &self.cache {
            let stored = serde_json::to_string(&analysis)
                .map_err(|e| e.to_string())
                .and_then(|json| {
                    cache
                        .set_by_data(CACHE_SECTION, &cache_key, &json)
                        .map_err(|e| e.to_string())
                });
            if let Err(e) = stored {
                warn!(err = e, "Unable to cache analysis");
            }
        }
        Ok(analysis)
    }
}

/// Changes whenever the file is replaced or rewritten.
fn cache_key(path: &Path) -> Result<String, EngineError> {
    let metadata = fs::metadata(path)?;
    let mtime = metadata
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs_f64())
        .unwrap_or_default();
    Ok(format!("{}:{}:{}", path.display(), mtime, metadata.len()))
}

impl Engine for VisualiserEngine {
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
        self.display
            .bars
            .lock()
            .layout(&setup, self.analyzer.bar_count);
    }

    fn as_audio(&self) -> Option<&dyn AudioEngine> {
        Some(self)
    }
}

impl AudioEngine for VisualiserEngine {
    fn clock(&self) -> &Clock {
        &self.clock
    }

    fn on_audio_load(&self, name: &str) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let path = self.audio_dir.join(name);
        if !path.is_file() {
            return Err(EngineError::FileNotFound(path));
        }
        self.clock.stop();

        let fps = f64::from(self.store.read(|s| s.performance_mode.fps()));
        let analysis = self.analyze(&path, fps)?;
        {
            let mut bars = self.display.bars.lock();
            bars.heights = analysis.heights;
            bars.fps = fps;
        }
        self.clock
            .load(Duration::from_secs_f64(analysis.length.max(0.0)), fps);
        info!(file = name, length = analysis.length, fps, "Audio loaded");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::config::State as StoredState;
    use crate::renderer::{NullSink, RecordingSink};
    use crate::setup::Dimensionality;
    use crate::testutil::{sine_signal, write_wav};

    /// Two bars, each a column of three LEDs at heights 0, 1 and 2.
    fn grid() -> Setup {
        let coordinates = (0..2)
            .flat_map(|x| (0..3).map(move |y| [x as f64, y as f64, 0.0]))
            .collect();
        Setup::from_coordinates("grid", Dimensionality::TwoD, coordinates)
    }

    #[test]
    fn test_layout() {
        let mut bars = Bars::default();
        bars.layout(&grid(), 2);
        let expected_bars: Vec<usize> = vec![0, 0, 0, 1, 1, 1];
        assert_eq!(
            expected_bars,
            bars.placements.iter().map(|p| p.bar).collect::<Vec<_>>()
        );
        assert_eq!(
            vec![0.0, 0.5, 1.0, 0.0, 0.5, 1.0],
            bars.placements.iter().map(|p| p.height).collect::<Vec<_>>()
        );
        assert_eq!(Rgb::new(255, 0, 0), bars.colors[0]);
    }

    #[test]
    fn test_rightmost_leds_belong_to_last_bar() {
        let mut bars = Bars::default();
        bars.layout(&grid(), 16);
        assert_eq!(15, bars.placements[5].bar);
    }

    #[test]
    fn test_vertical_axis_is_z_in_volumes() {
        let mut bars = Bars::default();
        let column = Setup::from_coordinates(
            "column",
            Dimensionality::ThreeD,
            vec![[0.0, 5.0, 0.0], [0.0, 0.0, 4.0]],
        );
        bars.layout(&column, 1);
        assert_eq!(0.0, bars.placements[0].height);
        assert_eq!(1.0, bars.placements[1].height);
    }

    #[test]
    fn test_draw() {
        let mut bars = Bars::default();
        bars.layout(&grid(), 2);
        let mut pixels = vec![Rgb::WHITE; 6];
        bars.draw(&[0.6, 0.0], &mut pixels);

        let lit = bars.colors[0];
        assert_eq!(
            vec![lit, lit, Rgb::BLACK, Rgb::BLACK, Rgb::BLACK, Rgb::BLACK],
            pixels
        );
    }

    #[test]
    fn test_load_and_frame() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let audio_dir = dir.path().join("audio");
        fs::create_dir_all(&audio_dir)?;
        write_wav(
            &audio_dir.join("tone.wav"),
            &sine_signal(&[100.0, 5000.0], 44100, 1.0),
            1,
            44100,
        )?;

        let sink = RecordingSink::default();
        let renderer = Arc::new(Renderer::new(6, Box::new(sink.clone())));
        let store = Arc::new(StateStore::in_memory(StoredState::default()));
        let cache = Cache::new(&dir.path().join("cache"));
        let engine = VisualiserEngine::new(renderer, store, &audio_dir, Some(cache.clone()));
        engine.on_setup_changed(Arc::new(grid()));

        assert!(matches!(
            engine.on_audio_load("missing.wav"),
            Err(EngineError::FileNotFound(_))
        ));

        engine.on_audio_load("tone.wav")?;
        let length = engine.length().ok_or("no length")?;
        assert!(length.abs_diff(Duration::from_secs(1)) < Duration::from_millis(10));
        let key = cache_key(&audio_dir.join("tone.wav"))?;
        assert!(cache.get_by_data(CACHE_SECTION, &key).is_some());

        engine.display.on_frame(Duration::from_millis(500));
        let frame = sink.last().ok_or("no frame")?;
        assert_eq!(6, frame.leds.len());
        assert!(frame.leds.iter().any(|led| *led != Rgb::BLACK));

        // Past the analysis the display goes dark.
        engine.display.on_frame(Duration::from_secs(5));
        let frame = sink.last().ok_or("no frame")?;
        assert!(frame.leds.iter().all(|led| *led == Rgb::BLACK));

        // The second load comes from the cache.
        engine.on_audio_load("tone.wav")?;
        assert!(engine.length().is_some());
        Ok(())
    }

    #[test]
    fn test_audio_transport() -> Result<(), Box<dyn Error>> {
        let renderer = Arc::new(Renderer::new(6, Box::new(NullSink)));
        let store = Arc::new(StateStore::in_memory(StoredState::default()));
        let engine = VisualiserEngine::new(renderer, store, Path::new("/nonexistent"), None);
        assert!(engine.as_audio().is_some());
        assert!(matches!(engine.play(), Err(EngineError::NothingLoaded(_))));
        Ok(())
    }
}

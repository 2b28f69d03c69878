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
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::EngineError;
use crate::playsync::{CancelHandle, Worker};
use crate::renderer::Renderer;
use crate::util::duration_minutes_seconds;

/// The tail of each frame wait that is spun instead of slept, for steady pacing.
const SPIN_MARGIN: Duration = Duration::from_millis(2);

/// Draws the frame for a playback position.
pub trait FrameSource: Send + Sync + 'static {
    fn on_frame(&self, position: Duration);
}

struct Timing {
    fps: f64,
    length: Option<Duration>,
    /// Position at the moment playback was last anchored.
    anchor_position: Duration,
    /// Set while playing.
    anchor_instant: Option<Instant>,
}

impl Timing {
    /// Derived from the anchor on every read so sleep jitter never accumulates.
    fn position(&self) -> Duration {
        match self.anchor_instant {
            Some(instant) => self.anchor_position + instant.elapsed(),
            None => self.anchor_position,
        }
    }

    fn halt(&mut self, position: Duration) {
        self.anchor_position = position;
        self.anchor_instant = None;
    }
}

/// The playback clock shared by the audio engines.
///
/// While playing, a background thread computes the position once per frame and
/// hands it to the frame source. Every transport call stops and joins that thread
/// before touching the timing, so a tick can never observe a half-applied seek.
pub struct Clock {
    name: String,
    renderer: Arc<Renderer>,
    source: Arc<dyn FrameSource>,
    timing: Arc<Mutex<Timing>>,
    worker: Mutex<Option<Worker>>,
}

impl Clock {
    pub fn new(name: &str, renderer: Arc<Renderer>, source: Arc<dyn FrameSource>) -> Clock {
        Clock {
            name: name.to_string(),
            renderer,
            source,
            timing: Arc::new(Mutex::new(Timing {
                fps: 30.0,
                length: None,
                anchor_position: Duration::ZERO,
                anchor_instant: None,
            })),
            worker: Mutex::new(None),
        }
    }

    /// Stops playback and prepares for a track of the given length.
    pub fn load(&self, length: Duration, fps: f64) {
        let mut worker = self.worker.lock();
        Clock::join(&mut worker);
        let mut timing = self.timing.lock();
        timing.length = Some(length);
        timing.fps = fps;
        timing.halt(Duration::ZERO);
    }

    /// Forgets the loaded track.
    pub fn unload(&self) {
        let mut worker = self.worker.lock();
        Clock::join(&mut worker);
        let mut timing = self.timing.lock();
        timing.length = None;
        timing.halt(Duration::ZERO);
    }

    pub fn set_fps(&self, fps: f64) {
        self.timing.lock().fps = fps;
    }

    pub fn fps(&self) -> f64 {
        self.timing.lock().fps
    }

    pub fn length(&self) -> Option<Duration> {
        self.timing.lock().length
    }

    pub fn position(&self) -> Duration {
        self.timing.lock().position()
    }

    pub fn is_playing(&self) -> bool {
        self.timing.lock().anchor_instant.is_some()
    }

    /// Starts playback from the current position.
    pub fn play(&self) -> Result<(), EngineError> {
        let mut worker = self.worker.lock();
        {
            let timing = self.timing.lock();
            if timing.length.is_none() {
                return Err(EngineError::NothingLoaded(self.name.clone()));
            }
            if timing.anchor_instant.is_some() {
                debug!(engine = self.name, "Already playing");
                return Ok(());
            }
        }

        // A thread that ended on its own is still parked here.
        Clock::join(&mut worker);
        let position = {
            let mut timing = self.timing.lock();
            timing.anchor_instant = Some(Instant::now());
            timing.anchor_position
        };
        info!(
            engine = self.name,
            position = duration_minutes_seconds(position),
            "Playing"
        );
        self.start(&mut worker, position)
    }

    /// Freezes the position.
    pub fn pause(&self) {
        let mut worker = self.worker.lock();
        Clock::join(&mut worker);
        let mut timing = self.timing.lock();
        let position = timing.position();
        timing.halt(position);
        info!(
            engine = self.name,
            position = duration_minutes_seconds(position),
            "Paused"
        );
    }

    /// Stops playback, clears the renderer and rewinds.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        Clock::join(&mut worker);
        self.timing.lock().halt(Duration::ZERO);
        self.renderer.clear();
        self.renderer.show();
        info!(engine = self.name, "Stopped");
    }

    /// Moves to `position`, clamped to the track. Playback continues from there if
    /// it was running.
    pub fn seek(&self, position: Duration) -> Result<(), EngineError> {
        let mut worker = self.worker.lock();
        let playing = {
            let timing = self.timing.lock();
            if timing.length.is_none() {
                return Err(EngineError::NothingLoaded(self.name.clone()));
            }
            timing.anchor_instant.is_some()
        };

        Clock::join(&mut worker);
        let position = {
            let mut timing = self.timing.lock();
            let position = position.min(timing.length.unwrap_or_default());
            timing.anchor_position = position;
            timing.anchor_instant = playing.then(Instant::now);
            position
        };
        info!(
            engine = self.name,
            position = duration_minutes_seconds(position),
            playing,
            "Seeked"
        );
        if playing {
            return self.start(&mut worker, position);
        }
        Ok(())
    }

    /// Spawns the tick thread. On failure the clock is left paused at `position`.
    fn start(&self, worker: &mut Option<Worker>, position: Duration) -> Result<(), EngineError> {
        match self.spawn() {
            Ok(spawned) => {
                *worker = Some(spawned);
                Ok(())
            }
            Err(e) => {
                self.timing.lock().halt(position);
                Err(e)
            }
        }
    }

    fn join(worker: &mut Option<Worker>) {
        if let Some(worker) = worker.take() {
            worker.stop();
        }
    }

    fn spawn(&self) -> Result<Worker, EngineError> {
        let name = self.name.clone();
        let renderer = self.renderer.clone();
        let source = self.source.clone();
        let timing = self.timing.clone();
        Ok(Worker::spawn(&format!("{} clock", self.name), move |cancel_handle| {
            run(&name, &renderer, source.as_ref(), &timing, &cancel_handle)
        })?)
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        Clock::join(self.worker.get_mut());
    }
}

fn run(
    name: &str,
    renderer: &Renderer,
    source: &dyn FrameSource,
    timing: &Mutex<Timing>,
    cancel_handle: &CancelHandle,
) {
    let mut next_tick = Instant::now();
    while !cancel_handle.is_cancelled() {
        let (position, length, fps) = {
            let timing = timing.lock();
            (timing.position(), timing.length, timing.fps)
        };

        if length.is_none_or(|length| position >= length) {
            renderer.clear();
            renderer.show();
            timing.lock().halt(Duration::ZERO);
            info!(engine = name, "Reached the end of the track");
            return;
        }

        source.on_frame(position);

        // A frame that overran pushes the schedule back instead of bursting to catch up.
        next_tick = (next_tick + Duration::from_secs_f64(1.0 / fps.max(1.0))).max(Instant::now());
        let remaining = next_tick.saturating_duration_since(Instant::now());
        if cancel_handle.wait_timeout(remaining.saturating_sub(SPIN_MARGIN)) {
            return;
        }
        spin_sleep::sleep(next_tick.saturating_duration_since(Instant::now()));
    }
}

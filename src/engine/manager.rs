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
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, span, warn, Level, Span};

use super::{AudioEngine, Engine, EngineError};
use crate::setup::Setup;

struct State {
    engines: Vec<Arc<dyn Engine>>,
    active: Option<usize>,
    setup: Arc<Setup>,
}

impl State {
    fn position_of(&self, engine: *const ()) -> Option<usize> {
        self.engines
            .iter()
            .position(|registered| Arc::as_ptr(registered) as *const () == engine)
    }

    fn active_engine(&self) -> Option<&Arc<dyn Engine>> {
        self.active.map(|index| &self.engines[index])
    }
}

/// Owns the set of engines and guarantees that at most one of them is active.
///
/// Every switch happens under a single lock: the previous engine is fully disabled
/// before the next one is enabled, and the operation that caused the switch runs
/// before anyone else gets a turn. Operations passed to the manager must not call
/// back into it.
pub struct EngineManager {
    state: Mutex<State>,
    span: Span,
}

impl EngineManager {
    pub fn new(setup: Arc<Setup>) -> EngineManager {
        EngineManager {
            state: Mutex::new(State {
                engines: Vec::new(),
                active: None,
                setup,
            }),
            span: span!(Level::INFO, "engine manager"),
        }
    }

    /// Adds an engine. The first engine registered becomes the active one.
    pub fn register(&self, engine: Arc<dyn Engine>) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let mut state = self.state.lock();

        if state.position_of(Arc::as_ptr(&engine) as *const ()).is_some() {
            warn!(engine = engine.name(), "Engine is already registered");
            return Ok(());
        }

        info!(engine = engine.name(), "Registering engine");
        state.engines.push(engine.clone());
        if state.active.is_none() {
            engine.on_setup_changed(state.setup.clone());
            engine.on_enable()?;
            state.active = Some(state.engines.len() - 1);
            info!(engine = engine.name(), "Engine is now active");
        }
        Ok(())
    }

    /// Makes `engine` the active engine, if it is not already, and runs `op` on it.
    pub fn require_active<E, T, F>(&self, engine: &Arc<E>, op: F) -> Result<T, EngineError>
    where
        E: Engine + 'static,
        F: FnOnce(&E) -> Result<T, EngineError>,
    {
        let _enter = self.span.enter();
        let mut state = self.state.lock();

        let index = state
            .position_of(Arc::as_ptr(engine) as *const ())
            .ok_or_else(|| EngineError::NotRegistered(engine.name().to_string()))?;

        if state.active != Some(index) {
            if let Some(previous) = state.active_engine() {
                info!(from = previous.name(), to = engine.name(), "Switching engines");
                previous.on_disable();
            }
            state.active = None;
            if let Err(e) = engine.on_enable() {
                error!(engine = engine.name(), err = %e, "Unable to enable engine");
                return Err(e);
            }
            state.active = Some(index);
        }

        op(engine.as_ref())
    }

    /// Runs `op` against the active engine's audio transport.
    pub fn with_active_audio<T, F>(&self, op: F) -> Result<T, EngineError>
    where
        F: FnOnce(&dyn AudioEngine) -> Result<T, EngineError>,
    {
        let state = self.state.lock();
        let active = state
            .active_engine()
            .ok_or_else(|| EngineError::WrongEngineType {
                active: "none".to_string(),
            })?;
        match active.as_audio() {
            Some(audio) => op(audio),
            None => Err(EngineError::WrongEngineType {
                active: active.name().to_string(),
            }),
        }
    }

    /// Tells every engine about a new setup, then makes it current.
    pub fn change_setup(&self, setup: Arc<Setup>) {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        info!(
            setup = setup.name(),
            leds = setup.led_count(),
            "Changing setup"
        );
        for engine in &state.engines {
            engine.on_setup_changed(setup.clone());
        }
        state.setup = setup;
    }

    pub fn current_setup(&self) -> Arc<Setup> {
        self.state.lock().setup.clone()
    }

    pub fn active_name(&self) -> Option<String> {
        self.state
            .lock()
            .active_engine()
            .map(|engine| engine.name().to_string())
    }

    pub fn engine_names(&self) -> Vec<String> {
        self.state
            .lock()
            .engines
            .iter()
            .map(|engine| engine.name().to_string())
            .collect()
    }

    /// Disables the active engine and leaves none active.
    pub fn shutdown(&self) {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        if let Some(active) = state.active_engine() {
            info!(engine = active.name(), "Disabling engine for shutdown");
            active.on_disable();
        }
        state.active = None;
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::engine::{Clock, FrameSource};
    use crate::renderer::{NullSink, Renderer};
    use crate::testutil::column_setup;

    /// Records lifecycle calls into a log shared by every engine in a test.
    struct Recorder {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        clock: Option<Clock>,
    }

    impl Recorder {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Recorder> {
            Arc::new(Recorder {
                name: name.to_string(),
                log: log.clone(),
                clock: None,
            })
        }

        fn record(&self, event: &str) {
            self.log.lock().push(format!("{} {}", self.name, event));
        }
    }

    struct Silent;

    impl FrameSource for Silent {
        fn on_frame(&self, _position: Duration) {}
    }

    impl Engine for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_enable(&self) -> Result<(), EngineError> {
            self.record("enable");
            Ok(())
        }

        fn on_disable(&self) {
            self.record("disable");
        }

        fn on_setup_changed(&self, setup: Arc<Setup>) {
            self.record(&format!("setup {}", setup.led_count()));
        }

        fn as_audio(&self) -> Option<&dyn AudioEngine> {
            self.clock.as_ref().map(|_| self as &dyn AudioEngine)
        }
    }

    impl AudioEngine for Recorder {
        fn clock(&self) -> &Clock {
            match &self.clock {
                Some(clock) => clock,
                None => unreachable!("only audio recorders expose a transport"),
            }
        }

        fn on_audio_load(&self, name: &str) -> Result<(), EngineError> {
            self.record(&format!("load {}", name));
            Ok(())
        }
    }

    fn take(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        std::mem::take(&mut *log.lock())
    }

    #[test]
    fn test_first_registered_is_active() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        manager.register(Recorder::new("a", &log))?;
        manager.register(Recorder::new("b", &log))?;
        manager.register(Recorder::new("c", &log))?;

        assert_eq!(Some("a".to_string()), manager.active_name());
        assert_eq!(vec!["a setup 3", "a enable"], take(&log));
        Ok(())
    }

    #[test]
    fn test_switch_disables_before_enabling() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        let a = Recorder::new("a", &log);
        let b = Recorder::new("b", &log);
        manager.register(a.clone())?;
        manager.register(b.clone())?;
        take(&log);

        let result = manager.require_active(&b, |b| {
            b.record("op");
            Ok(42)
        })?;
        assert_eq!(42, result);
        assert_eq!(vec!["a disable", "b enable", "b op"], take(&log));

        // Already active: no lifecycle calls.
        manager.require_active(&b, |_| Ok(()))?;
        assert!(take(&log).is_empty());
        Ok(())
    }

    #[test]
    fn test_unregistered_engine() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        manager.register(Recorder::new("a", &log))?;
        let stranger = Recorder::new("stranger", &log);

        assert!(matches!(
            manager.require_active(&stranger, |_| Ok(())),
            Err(EngineError::NotRegistered(name)) if name == "stranger"
        ));
        assert_eq!(Some("a".to_string()), manager.active_name());
        Ok(())
    }

    #[test]
    fn test_registering_twice_is_ignored() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        let a = Recorder::new("a", &log);
        manager.register(a.clone())?;
        manager.register(a)?;
        assert_eq!(vec!["a".to_string()], manager.engine_names());
        Ok(())
    }

    #[test]
    fn test_change_setup_reaches_every_engine_once() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        manager.register(Recorder::new("a", &log))?;
        manager.register(Recorder::new("b", &log))?;
        manager.register(Recorder::new("c", &log))?;
        take(&log);

        manager.change_setup(column_setup(7));
        let mut events = take(&log);
        events.sort();
        assert_eq!(vec!["a setup 7", "b setup 7", "c setup 7"], events);
        assert_eq!(7, manager.current_setup().led_count());
        Ok(())
    }

    #[test]
    fn test_audio_calls_need_an_audio_engine() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        let plain = Recorder::new("plain", &log);
        let renderer = Arc::new(Renderer::new(3, Box::new(NullSink)));
        let audio = Arc::new(Recorder {
            name: "audio".to_string(),
            log: log.clone(),
            clock: Some(Clock::new("audio", renderer, Arc::new(Silent))),
        });
        manager.register(plain)?;
        manager.register(audio.clone())?;

        assert!(matches!(
            manager.with_active_audio(|audio| audio.on_audio_load("song.wav")),
            Err(EngineError::WrongEngineType { active }) if active == "plain"
        ));

        manager.require_active(&audio, |_| Ok(()))?;
        manager.with_active_audio(|audio| audio.on_audio_load("song.wav"))?;
        assert_eq!(Some(&"audio load song.wav".to_string()), log.lock().last());
        Ok(())
    }

    #[test]
    fn test_shutdown() -> Result<(), EngineError> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = EngineManager::new(column_setup(3));
        manager.register(Recorder::new("a", &log))?;
        take(&log);

        manager.shutdown();
        assert_eq!(vec!["a disable"], take(&log));
        assert_eq!(None, manager.active_name());
        Ok(())
    }
}

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
    sync::{Arc, Weak},
    time::Duration,
};

use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, span, warn, Level, Span};

use super::runner::EffectRunner;
use super::{Engine, EngineError};
use crate::config::sandbox::{is_script, Script, DEFAULT_SCRIPT, DEFAULT_SCRIPT_NAME};
use crate::config::StateStore;
use crate::effect::{Effect, EffectError, EffectRegistry};
use crate::renderer::Renderer;
use crate::setup::Setup;
use crate::util;

pub const NAME: &str = "sandbox";

/// What the sandbox is running.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SandboxStatus {
    pub file: Option<String>,
    pub effect: Option<String>,
    /// Why the last load of the open file failed, if it did.
    pub error: Option<String>,
}

struct State {
    setup: Option<Arc<Setup>>,
    file: Option<String>,
    effect: Option<String>,
    error: Option<String>,
    runner: EffectRunner,
    watcher: Option<PollWatcher>,
}

struct Inner {
    store: Arc<StateStore>,
    registry: EffectRegistry,
    dir: PathBuf,
    poll_interval: Duration,
    state: Mutex<State>,
}

/// Runs effect scripts from the sandbox directory and rebuilds the running effect
/// whenever the open script is saved.
pub struct SandboxEngine {
    renderer: Arc<Renderer>,
    inner: Arc<Inner>,
    span: Span,
}

impl SandboxEngine {
    pub fn new(
        renderer: Arc<Renderer>,
        store: Arc<StateStore>,
        registry: EffectRegistry,
        dir: &Path,
        poll_interval: Duration,
    ) -> SandboxEngine {
        SandboxEngine {
            inner: Arc::new(Inner {
                store,
                registry,
                dir: dir.to_path_buf(),
                poll_interval,
                state: Mutex::new(State {
                    setup: None,
                    file: None,
                    effect: None,
                    error: None,
                    runner: EffectRunner::new(NAME, renderer.clone()),
                    watcher: None,
                }),
            }),
            renderer,
            span: span!(Level::INFO, "sandbox engine"),
        }
    }

    /// The script files in the sandbox directory, by file name.
    pub fn list_files(&self) -> Result<Vec<String>, EngineError> {
        self.inner.ensure_dir()?;
        Ok(util::list_files(&self.inner.dir, is_script)?
            .iter()
            .map(|path| util::filename_display(path).to_string())
            .collect())
    }

    /// Opens `name` and runs it. The choice is persisted even if the script fails
    /// to load, so it can be fixed and saved.
    pub fn set_file(&self, name: &str) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let path = self.inner.dir.join(name);
        if !path.is_file() {
            return Err(EngineError::FileNotFound(path));
        }

        self.inner
            .store
            .update(|s| s.sandbox_opened_file = Some(name.to_string()))?;
        let mut state = self.inner.state.lock();
        state.file = Some(name.to_string());
        info!(file = name, "Sandbox file opened");
        self.inner.load(&mut state)
    }

    pub fn get_state(&self) -> SandboxStatus {
        let state = self.inner.state.lock();
        SandboxStatus {
            file: state.file.clone(),
            effect: state.effect.clone().filter(|_| state.runner.has_effect()),
            error: state.error.clone(),
        }
    }

    fn watch(&self) -> Result<PollWatcher, EngineError> {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let config = Config::default()
            .with_poll_interval(self.inner.poll_interval)
            .with_compare_contents(true);
        let mut watcher = PollWatcher::new(
            move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if let Some(inner) = inner.upgrade() {
                        inner.on_event(&event);
                    }
                }
                Err(e) => warn!(err = %e, "Sandbox watcher error"),
            },
            config,
        )?;
        watcher.watch(&self.inner.dir, RecursiveMode::NonRecursive)?;
        Ok(watcher)
    }
}

impl Inner {
    /// Creates the directory and drops the default script into it when it has none.
    fn ensure_dir(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.dir)?;
        if util::list_files(&self.dir, is_script)?.is_empty() {
            info!(dir = %self.dir.display(), "Sandbox is empty, writing the default script");
            fs::write(self.dir.join(DEFAULT_SCRIPT_NAME), DEFAULT_SCRIPT)?;
        }
        Ok(())
    }

    fn build(&self, state: &State, path: &Path) -> Result<(String, Box<dyn Effect>), EngineError> {
        let setup = state
            .setup
            .clone()
            .ok_or_else(|| EngineError::NoSetup(NAME.to_string()))?;
        let script = Script::deserialize(path)?;
        let descriptor = self
            .registry
            .get(&script.effect)
            .ok_or_else(|| EffectError::Unknown(script.effect.clone()))?;
        let mut effect = descriptor.build(setup)?;
        effect.parameters_mut().apply(&script.parameters);
        Ok((script.effect, effect))
    }

    /// Rebuilds the open script into the runner. On failure the previous effect keeps
    /// running and the error is recorded.
    fn load(&self, state: &mut State) -> Result<(), EngineError> {
        let Some(file) = state.file.clone() else {
            return Ok(());
        };
        match self.build(state, &self.dir.join(&file)) {
            Ok((key, effect)) => {
                state.runner.replace(Some(effect));
                info!(file, effect = key, "Sandbox effect loaded");
                state.effect = Some(key);
                state.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(file, err = %e, "Unable to load sandbox script");
                state.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn on_event(&self, event: &Event) {
        if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
            return;
        }
        let mut state = self.state.lock();
        if !state.runner.is_running() {
            return;
        }
        let Some(file) = state.file.clone() else {
            return;
        };
        let touched = event
            .paths
            .iter()
            .any(|path| path.file_name().and_then(|name| name.to_str()) == Some(file.as_str()));
        if touched {
            debug!(file, "Sandbox file changed, reloading");
            // Failures are recorded in the state and logged by load.
            let _ = self.load(&mut state);
        }
    }
}

impl Engine for SandboxEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn on_enable(&self) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let files = self.list_files()?;
        let stored = self.inner.store.read(|s| s.sandbox_opened_file.clone());
        let file = stored
            .filter(|name| files.contains(name))
            .or_else(|| files.first().cloned());
        let watcher = self.watch()?;

        let mut state = self.inner.state.lock();
        state.file = file;
        if let Err(e) = self.inner.load(&mut state) {
            // The runner still starts so that saving a fixed script picks it up.
            debug!(err = %e, "Starting the sandbox without an effect");
        }
        state.runner.start()?;
        state.watcher = Some(watcher);
        info!(file = state.file.as_deref().unwrap_or("none"), "Enabled");
        Ok(())
    }

    fn on_disable(&self) {
        let _enter = self.span.enter();
        let watcher = {
            let mut state = self.inner.state.lock();
            state.runner.stop();
            state.runner.replace(None);
            state.watcher.take()
        };
        drop(watcher);
        self.renderer.clear();
        self.renderer.show();
        info!("Disabled");
    }

    fn on_setup_changed(&self, setup: Arc<Setup>) {
        let _enter = self.span.enter();
        let mut state = self.inner.state.lock();
        state.setup = Some(setup);
        if state.runner.is_running() {
            // Failures are recorded in the state and logged by load.
            let _ = self.inner.load(&mut state);
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::color::Rgb;
    use crate::config::State as StoredState;
    use crate::renderer::NullSink;
    use crate::testutil::{column_setup, eventually};

    fn engine(dir: &Path) -> (SandboxEngine, Arc<Renderer>, Arc<StateStore>) {
        let renderer = Arc::new(Renderer::new(5, Box::new(NullSink)));
        let store = Arc::new(StateStore::in_memory(StoredState::default()));
        let engine = SandboxEngine::new(
            renderer.clone(),
            store.clone(),
            EffectRegistry::builtin(),
            dir,
            Duration::from_millis(20),
        );
        engine.on_setup_changed(column_setup(5));
        (engine, renderer, store)
    }

    fn static_script(hex: &str) -> String {
        format!("effect: static_color\nparameters:\n  Color: \"{}\"\n", hex)
    }

    #[test]
    fn test_empty_dir_gets_default_script() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let (engine, _, _) = engine(dir.path());
        assert_eq!(vec![DEFAULT_SCRIPT_NAME.to_string()], engine.list_files()?);

        engine.on_enable()?;
        let status = engine.get_state();
        assert_eq!(Some(DEFAULT_SCRIPT_NAME.to_string()), status.file);
        assert_eq!(Some("breathing".to_string()), status.effect);
        engine.on_disable();
        Ok(())
    }

    #[test]
    fn test_reload_on_save() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let script = dir.path().join("solid.yaml");
        fs::write(&script, static_script("#00FF00"))?;
        let (engine, renderer, store) = engine(dir.path());

        engine.on_enable()?;
        engine.set_file("solid.yaml")?;
        assert_eq!(
            Some("solid.yaml".to_string()),
            store.read(|s| s.sandbox_opened_file.clone())
        );
        eventually(
            || renderer.get(0) == Some(Rgb::new(0, 255, 0)),
            "Script never ran",
        );

        fs::write(&script, static_script("#0000FF"))?;
        eventually(
            || renderer.get(0) == Some(Rgb::new(0, 0, 255)),
            "Saved script never reloaded",
        );

        // A broken save keeps the last good effect running.
        fs::write(&script, "effect: not_an_effect\n")?;
        eventually(|| engine.get_state().error.is_some(), "Broken script not reported");
        assert_eq!(Some("static_color".to_string()), engine.get_state().effect);

        engine.on_disable();
        assert_eq!(vec![Rgb::BLACK; 5], renderer.pixels());
        Ok(())
    }

    #[test]
    fn test_set_file_errors() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("bad.yaml"), "effect: nope\n")?;
        let (engine, _, _) = engine(dir.path());

        assert!(matches!(
            engine.set_file("missing.yaml"),
            Err(EngineError::FileNotFound(_))
        ));
        assert!(matches!(
            engine.set_file("bad.yaml"),
            Err(EngineError::Effect(EffectError::Unknown(key))) if key == "nope"
        ));
        assert_eq!(Some("bad.yaml".to_string()), engine.get_state().file);
        Ok(())
    }
}

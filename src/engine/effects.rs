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
use serde::Serialize;
use serde_json::Value;
use tracing::{info, span, warn, Level, Span};

use super::runner::EffectRunner;
use super::{Engine, EngineError};
use crate::cache::Cache;
use crate::config::StateStore;
use crate::effect::{Effect, EffectError, EffectInfo, EffectRegistry};
use crate::renderer::Renderer;
use crate::setup::Setup;

pub const NAME: &str = "effects";

/// What the effects engine is currently showing.
#[derive(Debug, Clone, Serialize)]
pub struct EffectsStatus {
    pub effect: Option<String>,
    pub parameters: Vec<Value>,
}

struct State {
    setup: Option<Arc<Setup>>,
    /// Effects that passed validation for the current setup.
    available: EffectRegistry,
    current: Option<String>,
    runner: EffectRunner,
}

/// Runs one continuously updating effect at a time.
pub struct EffectsEngine {
    renderer: Arc<Renderer>,
    store: Arc<StateStore>,
    registry: EffectRegistry,
    cache: Option<Cache>,
    state: Mutex<State>,
    span: Span,
}

impl EffectsEngine {
    pub fn new(
        renderer: Arc<Renderer>,
        store: Arc<StateStore>,
        registry: EffectRegistry,
        cache: Option<Cache>,
    ) -> EffectsEngine {
        EffectsEngine {
            state: Mutex::new(State {
                setup: None,
                available: EffectRegistry::new(Vec::new()),
                current: None,
                runner: EffectRunner::new(NAME, renderer.clone()),
            }),
            renderer,
            store,
            registry,
            cache,
            span: span!(Level::INFO, "effects engine"),
        }
    }

    /// Builds a fresh instance of `key`, seeded with its persisted parameters.
    fn build(&self, state: &State, key: &str) -> Result<Box<dyn Effect>, EngineError> {
        let setup = state
            .setup
            .clone()
            .ok_or_else(|| EngineError::NoSetup(NAME.to_string()))?;
        let descriptor = state
            .available
            .get(key)
            .ok_or_else(|| EffectError::Unknown(key.to_string()))?;
        let mut effect = descriptor.build(setup)?;
        effect.parameters_mut().apply(&self.store.parameters(key));
        Ok(effect)
    }

    /// The persisted effect if it is still available, otherwise the first available
    /// one. A fallback is persisted.
    fn restore(&self, state: &State) -> Result<Option<String>, EngineError> {
        let stored = self.store.read(|s| s.current_effect.clone());
        if let Some(key) = stored
            .as_ref()
            .filter(|key| state.available.get(key).is_some())
        {
            return Ok(Some(key.clone()));
        }

        let Some(fallback) = state.available.first().map(|d| d.key.clone()) else {
            warn!("No effects are available for this setup");
            return Ok(None);
        };
        info!(
            stored = stored.as_deref().unwrap_or("none"),
            effect = fallback,
            "Falling back to the first available effect"
        );
        self.store
            .update(|s| s.current_effect = Some(fallback.clone()))?;
        Ok(Some(fallback))
    }

    /// Loads the restored effect into the runner.
    fn load_current(&self, state: &mut State) -> Result<(), EngineError> {
        state.current = self.restore(state)?;
        let effect = match &state.current {
            Some(key) => Some(self.build(state, key)?),
            None => None,
        };
        state.runner.replace(effect);
        Ok(())
    }

    /// Switches to `key`, discarding the running instance.
    pub fn set_effect(&self, key: &str) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        let effect = self.build(&state, key)?;
        self.store
            .update(|s| s.current_effect = Some(key.to_string()))?;
        state.current = Some(key.to_string());
        state.runner.replace(Some(effect));
        info!(effect = key, "Effect selected");
        Ok(())
    }

    /// Sets a parameter on the running effect and persists the raw value.
    pub fn set_parameter(&self, name: &str, value: Value) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let state = self.state.lock();
        let key = state
            .current
            .clone()
            .ok_or_else(|| EngineError::NothingLoaded(NAME.to_string()))?;

        state
            .runner
            .with_effect(|effect| effect.parameters_mut().set(name, value.clone()))
            .ok_or_else(|| EngineError::NothingLoaded(NAME.to_string()))?
            .map_err(EffectError::from)?;
        self.store.update(|s| {
            s.parameters
                .entry(key.clone())
                .or_default()
                .insert(name.to_string(), value);
        })?;
        info!(effect = key, parameter = name, "Parameter updated");
        Ok(())
    }

    pub fn get_state(&self) -> EffectsStatus {
        let state = self.state.lock();
        EffectsStatus {
            effect: state.current.clone(),
            parameters: state
                .runner
                .with_effect(|effect| effect.parameters().describe())
                .unwrap_or_default(),
        }
    }

    /// Describes the parameters `key` would start with.
    pub fn get_parameters(&self, key: &str) -> Result<Vec<Value>, EngineError> {
        let state = self.state.lock();
        Ok(self.build(&state, key)?.parameters().describe())
    }

    pub fn list_effects(&self) -> Vec<EffectInfo> {
        self.state.lock().available.list()
    }
}

impl Engine for EffectsEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn on_enable(&self) -> Result<(), EngineError> {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        self.load_current(&mut state)?;
        state.runner.start()?;
        info!(effect = state.current.as_deref().unwrap_or("none"), "Enabled");
        Ok(())
    }

    fn on_disable(&self) {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        state.runner.stop();
        state.runner.replace(None);
        self.renderer.clear();
        self.renderer.show();
        info!("Disabled");
    }

    fn on_setup_changed(&self, setup: Arc<Setup>) {
        let _enter = self.span.enter();
        let mut state = self.state.lock();
        state.available = self.registry.validated(&setup, self.cache.as_ref());
        state.setup = Some(setup);
        info!(available = state.available.len(), "Effects validated for setup");

        if state.runner.is_running() {
            if let Err(e) = self.load_current(&mut state) {
                warn!(err = %e, "Unable to rebuild the effect for the new setup");
                state.runner.replace(None);
            }
        }
    }
}

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
use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tracing::{error, info};

use crate::effect::{Context, Effect};
use crate::playsync::{CancelHandle, Worker};
use crate::renderer::Renderer;

/// How long the runner waits before looking for an effect again when it has none.
const IDLE_INTERVAL: Duration = Duration::from_millis(100);

type Slot = Arc<Mutex<Option<Box<dyn Effect>>>>;

/// Calls `update` on the current effect in a loop on a background thread.
///
/// The effect sits in a slot that the owner may swap at any time; the swap takes
/// effect between two updates. The slot is only locked while an update renders,
/// never while the runner waits out the pause the effect asked for. An effect that fails is logged and dropped, and the
/// runner idles until it is given another one.
pub struct EffectRunner {
    name: String,
    renderer: Arc<Renderer>,
    slot: Slot,
    worker: Option<Worker>,
}

impl EffectRunner {
    pub fn new(name: &str, renderer: Arc<Renderer>) -> EffectRunner {
        EffectRunner {
            name: name.to_string(),
            renderer,
            slot: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    pub fn start(&mut self) -> std::io::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let slot = self.slot.clone();
        let renderer = self.renderer.clone();
        let name = self.name.clone();
        self.worker = Some(Worker::spawn(
            &format!("{} runner", self.name),
            move |cancel_handle| run(&name, &renderer, &slot, &cancel_handle),
        )?);
        info!(engine = self.name, "Effect runner started");
        Ok(())
    }

    /// Stops and joins the runner thread. The current effect stays in the slot.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop();
            info!(engine = self.name, "Effect runner stopped");
        }
    }

    /// Swaps the running effect, returning the previous one.
    pub fn replace(&self, effect: Option<Box<dyn Effect>>) -> Option<Box<dyn Effect>> {
        std::mem::replace(&mut *self.slot.lock(), effect)
    }

    /// Runs `f` against the current effect, if there is one.
    pub fn with_effect<T>(&self, f: impl FnOnce(&mut dyn Effect) -> T) -> Option<T> {
        self.slot.lock().as_mut().map(|effect| f(&mut **effect))
    }

    pub fn has_effect(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl Drop for EffectRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(name: &str, renderer: &Renderer, slot: &Slot, cancel_handle: &CancelHandle) {
    while !cancel_handle.is_cancelled() {
        let pause = {
            let mut current = slot.lock();
            match current.as_mut() {
                Some(effect) => {
                    let context = Context::new(renderer);
                    match effect.update(&context) {
                        Ok(()) => context.requested_pause(),
                        Err(e) => {
                            error!(engine = name, err = %e, "Effect failed, stopping it");
                            *current = None;
                            continue;
                        }
                    }
                }
                None => IDLE_INTERVAL,
            }
        };

        cancel_handle.wait_timeout(pause);
    }
}

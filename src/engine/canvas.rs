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
use tracing::{debug, info};

use super::{Engine, EngineError};
use crate::color::Rgb;
use crate::renderer::{Renderer, RendererError};
use crate::setup::Setup;

pub const NAME: &str = "canvas";

/// Free painting. The canvas remembers what was painted so switching away and
/// back restores the picture.
pub struct CanvasEngine {
    renderer: Arc<Renderer>,
    pixels: Mutex<Vec<Rgb>>,
}

impl CanvasEngine {
    pub fn new(renderer: Arc<Renderer>) -> CanvasEngine {
        let pixels = vec![Rgb::BLACK; renderer.len()];
        CanvasEngine {
            renderer,
            pixels: Mutex::new(pixels),
        }
    }

    pub fn get_pixels(&self) -> Vec<Rgb> {
        self.pixels.lock().clone()
    }

    /// Replaces the whole picture. A list of the wrong length leaves everything
    /// untouched.
    pub fn set_pixels(&self, pixels: Vec<Rgb>) -> Result<(), EngineError> {
        let mut current = self.pixels.lock();
        if pixels.len() != current.len() {
            return Err(RendererError::LengthMismatch {
                expected: current.len(),
                actual: pixels.len(),
            }
            .into());
        }
        self.renderer.set_all(&pixels)?;
        self.renderer.show();
        *current = pixels;
        debug!("Canvas updated");
        Ok(())
    }
}

impl Engine for CanvasEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn on_enable(&self) -> Result<(), EngineError> {
        self.renderer.set_all(&self.pixels.lock())?;
        self.renderer.show();
        info!("Canvas restored");
        Ok(())
    }

    fn on_disable(&self) {
        self.renderer.clear();
        self.renderer.show();
    }

    fn on_setup_changed(&self, setup: Arc<Setup>) {
        let mut pixels = self.pixels.lock();
        if pixels.len() != setup.led_count() {
            info!(leds = setup.led_count(), "Canvas resized, clearing it");
            *pixels = vec![Rgb::BLACK; setup.led_count()];
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::renderer::RecordingSink;

    #[test]
    fn test_restores_on_enable() -> Result<(), EngineError> {
        let sink = RecordingSink::default();
        let renderer = Arc::new(Renderer::new(3, Box::new(sink.clone())));
        let canvas = CanvasEngine::new(renderer.clone());

        let picture = vec![Rgb::RED, Rgb::BLACK, Rgb::WHITE];
        canvas.set_pixels(picture.clone())?;
        canvas.on_disable();
        assert_eq!(vec![Rgb::BLACK; 3], renderer.pixels());

        canvas.on_enable()?;
        assert_eq!(picture, renderer.pixels());
        assert_eq!(Some(picture.clone()), sink.last().map(|frame| frame.leds));
        assert_eq!(picture, canvas.get_pixels());
        Ok(())
    }

    #[test]
    fn test_length_mismatch() {
        let renderer = Arc::new(Renderer::new(3, Box::new(RecordingSink::default())));
        let canvas = CanvasEngine::new(renderer.clone());

        assert!(matches!(
            canvas.set_pixels(vec![Rgb::RED; 2]),
            Err(EngineError::Renderer(RendererError::LengthMismatch {
                expected: 3,
                actual: 2
            }))
        ));
        assert_eq!(vec![Rgb::BLACK; 3], canvas.get_pixels());
        assert_eq!(vec![Rgb::BLACK; 3], renderer.pixels());
    }
}

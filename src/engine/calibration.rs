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

use tracing::{debug, info};

use super::{Engine, EngineError};
use crate::color::Rgb;
use crate::renderer::Renderer;
use crate::setup::Setup;

pub const NAME: &str = "calibration";

/// Helps map a physical installation by lighting LEDs on request.
pub struct CalibrationEngine {
    renderer: Arc<Renderer>,
}

impl CalibrationEngine {
    pub fn new(renderer: Arc<Renderer>) -> CalibrationEngine {
        CalibrationEngine { renderer }
    }

    /// Lights every LED red so the whole installation is visible.
    pub fn start_calibration(&self) {
        self.renderer.fill(Rgb::RED);
        self.renderer.show();
        info!("Calibration started");
    }

    /// Lights LED `index` white and every other LED black.
    pub fn highlight(&self, index: usize) -> Result<(), EngineError> {
        let len = self.renderer.len();
        if index >= len {
            return Err(EngineError::InvalidIndex { index, len });
        }
        self.renderer.clear();
        self.renderer.set(index, Rgb::WHITE)?;
        self.renderer.show();
        debug!(index, "Highlighted LED");
        Ok(())
    }
}

impl Engine for CalibrationEngine {
    fn name(&self) -> &str {
        NAME
    }

    fn on_enable(&self) -> Result<(), EngineError> {
        self.renderer.clear();
        self.renderer.show();
        Ok(())
    }

    fn on_disable(&self) {
        self.renderer.clear();
        self.renderer.show();
    }

    fn on_setup_changed(&self, _setup: Arc<Setup>) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::renderer::RecordingSink;

    fn engine() -> (CalibrationEngine, RecordingSink) {
        let sink = RecordingSink::default();
        let renderer = Arc::new(Renderer::new(4, Box::new(sink.clone())));
        (CalibrationEngine::new(renderer), sink)
    }

    #[test]
    fn test_start_calibration() {
        let (engine, sink) = engine();
        engine.start_calibration();
        let frame = sink.last().expect("no frame shown");
        assert_eq!(vec![Rgb::RED; 4], frame.leds);
    }

    #[test]
    fn test_highlight() -> Result<(), EngineError> {
        let (engine, sink) = engine();
        engine.start_calibration();
        engine.highlight(2)?;
        let frame = sink.last().expect("no frame shown");
        assert_eq!(
            vec![Rgb::BLACK, Rgb::BLACK, Rgb::WHITE, Rgb::BLACK],
            frame.leds
        );

        assert!(matches!(
            engine.highlight(4),
            Err(EngineError::InvalidIndex { index: 4, len: 4 })
        ));
        Ok(())
    }
}

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

use super::{vertical_positions, FRAME_INTERVAL};
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::Setup;

/// A band of color bouncing between the bottom and the top.
pub struct ColorSweep {
    parameters: Parameters,
    heights: Vec<f64>,
    position: f64,
    direction: f64,
}

impl ColorSweep {
    pub fn create(setup: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(ColorSweep {
            parameters: Parameters::new()
                .with(Parameter::slider("Speed", 20.0, 5.0, 50.0, 1.0))
                .with(Parameter::color("Active Color", "#FF0000"))
                .with(Parameter::color("Background Color", "#000000")),
            heights: vertical_positions(&setup),
            position: 0.0,
            direction: 1.0,
        })
    }
}

impl Effect for ColorSweep {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let step = self.parameters.number("Speed")? / 2000.0;
        let active = self.parameters.color("Active Color")?;
        let background = self.parameters.color("Background Color")?;

        self.position += step * self.direction;
        if self.position >= 1.0 {
            self.position = 1.0;
            self.direction = -1.0;
        } else if self.position <= 0.0 {
            self.position = 0.0;
            self.direction = 1.0;
        }

        let position = self.position;
        let heights = &self.heights;
        context.renderer().update(|pixels| {
            for (pixel, height) in pixels.iter_mut().zip(heights) {
                *pixel = active.lerp(&background, (height - position).abs());
            }
        });
        context.renderer().show();
        context.pause(FRAME_INTERVAL);
        Ok(())
    }
}

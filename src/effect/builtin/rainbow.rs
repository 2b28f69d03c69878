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
use crate::color::Rgb;
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::Setup;

/// A hue gradient scrolling along the vertical axis.
pub struct Rainbow {
    parameters: Parameters,
    heights: Vec<f64>,
    offset: f64,
}

impl Rainbow {
    pub fn create(setup: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Rainbow {
            parameters: Parameters::new()
                .with(Parameter::slider("Speed", 5.0, 0.5, 50.0, 0.1))
                .with(Parameter::checkbox("Reverse", false)),
            heights: vertical_positions(&setup),
            offset: 0.0,
        })
    }
}

impl Effect for Rainbow {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let step = self.parameters.number("Speed")? / 1000.0;
        let direction = if self.parameters.flag("Reverse")? {
            -1.0
        } else {
            1.0
        };
        self.offset = (self.offset + direction * step).rem_euclid(1.0);

        let offset = self.offset;
        let heights = &self.heights;
        context.renderer().update(|pixels| {
            pixels
                .iter_mut()
                .zip(heights)
                .for_each(|(pixel, height)| *pixel = Rgb::from_hsv(height - offset, 1.0, 1.0));
        });
        context.renderer().show();
        context.pause(FRAME_INTERVAL);
        Ok(())
    }
}

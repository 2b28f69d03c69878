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

use super::STATIC_INTERVAL;
use crate::color::Rgb;
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::Setup;

/// Every LED in one color.
pub struct StaticColor {
    parameters: Parameters,
}

impl StaticColor {
    pub fn create(_: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(StaticColor {
            parameters: Parameters::new().with(Parameter::color("Color", "#FF0000")),
        })
    }
}

impl Effect for StaticColor {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        context.renderer().fill(self.parameters.color("Color")?);
        context.renderer().show();
        context.pause(STATIC_INTERVAL);
        Ok(())
    }
}

const FOUR_COLORS: [&str; 4] = ["Color 1", "Color 2", "Color 3", "Color 4"];

/// Four colors repeating along the strip.
pub struct StaticFour {
    parameters: Parameters,
}

impl StaticFour {
    pub fn create(_: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(StaticFour {
            parameters: Parameters::new()
                .with(Parameter::color(FOUR_COLORS[0], "#FF0000"))
                .with(Parameter::color(FOUR_COLORS[1], "#FFFF00"))
                .with(Parameter::color(FOUR_COLORS[2], "#00FF00"))
                .with(Parameter::color(FOUR_COLORS[3], "#0000FF")),
        })
    }
}

impl Effect for StaticFour {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let mut colors = [Rgb::BLACK; 4];
        for (color, name) in colors.iter_mut().zip(FOUR_COLORS) {
            *color = self.parameters.color(name)?;
        }

        context.renderer().update(|pixels| {
            pixels
                .iter_mut()
                .enumerate()
                .for_each(|(i, pixel)| *pixel = colors[i % colors.len()]);
        });
        context.renderer().show();
        context.pause(STATIC_INTERVAL);
        Ok(())
    }
}

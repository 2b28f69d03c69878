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

use rand::seq::SliceRandom;

use super::FRAME_INTERVAL;
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::Setup;

/// Random LEDs flare up and decay.
pub struct Sparkles {
    parameters: Parameters,
    levels: Vec<f64>,
}

impl Sparkles {
    pub fn create(setup: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Sparkles {
            parameters: Parameters::new()
                .with(Parameter::color("Color", "#FF0000"))
                .with(Parameter::slider("Speed", 20.0, 1.0, 100.0, 1.0))
                .with(Parameter::slider("Amount", 1.0, 1.0, 10.0, 1.0)),
            levels: vec![0.0; setup.led_count()],
        })
    }
}

impl Effect for Sparkles {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let color = self.parameters.color("Color")?;
        let decay = self.parameters.number("Speed")? / 1000.0;
        let amount = self.parameters.number("Amount")?.max(0.0) as usize;

        let dark: Vec<usize> = self
            .levels
            .iter()
            .enumerate()
            .filter(|(_, level)| **level <= 0.0)
            .map(|(i, _)| i)
            .collect();
        let mut rng = rand::thread_rng();
        for index in dark.choose_multiple(&mut rng, amount) {
            self.levels[*index] = 1.0;
        }

        let levels = &mut self.levels;
        context.renderer().update(|pixels| {
            for (pixel, level) in pixels.iter_mut().zip(levels.iter_mut()) {
                *pixel = color.scale(*level);
                *level = (*level - decay).max(0.0);
            }
        });
        context.renderer().show();
        context.pause(FRAME_INTERVAL);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::color::Rgb;
    use crate::renderer::{NullSink, Renderer};
    use crate::testutil::column_setup;

    #[test]
    fn test_lights_amount_leds() -> Result<(), EffectError> {
        let renderer = Renderer::new(20, Box::new(NullSink));

        let mut effect = Sparkles::create(column_setup(20));
        effect.parameters_mut().set("Amount", serde_json::json!(3))?;
        effect.update(&Context::new(&renderer))?;

        let lit = renderer
            .pixels()
            .iter()
            .filter(|pixel| **pixel == Rgb::RED)
            .count();
        assert_eq!(3, lit);
        Ok(())
    }
}

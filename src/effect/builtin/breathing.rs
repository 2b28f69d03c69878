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

use super::FRAME_INTERVAL;
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::Setup;

/// Time spent dark between breaths.
const OFF_TIME: Duration = Duration::from_millis(500);

/// Fades one color in and out.
pub struct Breathing {
    parameters: Parameters,
    level: f64,
    direction: f64,
}

impl Breathing {
    pub fn create(_: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Breathing {
            parameters: Parameters::new()
                .with(Parameter::slider("Fade Speed", 50.0, 1.0, 500.0, 1.0))
                .with(Parameter::color("Color", "#FF0000")),
            level: 0.0,
            direction: 1.0,
        })
    }
}

impl Effect for Breathing {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let speed = self.parameters.number("Fade Speed")?;
        let color = self.parameters.color("Color")?;

        self.level = (self.level + self.direction * speed / 10000.0).clamp(0.0, 1.0);
        let bottomed_out = self.level <= 0.0;
        if self.level >= 1.0 {
            self.direction = -1.0;
        } else if bottomed_out {
            self.direction = 1.0;
        }

        context.renderer().fill(color.scale(self.level));
        context.renderer().show();
        context.pause(if bottomed_out { OFF_TIME } else { FRAME_INTERVAL });
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
    fn test_fades_up_then_down() -> Result<(), EffectError> {
        let renderer = Renderer::new(1, Box::new(NullSink));
        let context = Context::new(&renderer);

        let mut effect = Breathing::create(column_setup(1));
        effect
            .parameters_mut()
            .set("Fade Speed", serde_json::json!(5000))?;

        effect.update(&context)?;
        assert_eq!(Some(Rgb::new(127, 0, 0)), renderer.get(0));
        effect.update(&context)?;
        assert_eq!(Some(Rgb::RED), renderer.get(0));
        effect.update(&context)?;
        assert_eq!(Some(Rgb::new(127, 0, 0)), renderer.get(0));
        Ok(())
    }
}

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

use rand::Rng;

use super::FRAME_INTERVAL;
use crate::color::Rgb;
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::{distance, Coordinate, Setup};

/// A sphere of random color grows from a random LED, then shrinks away.
pub struct Grow {
    parameters: Parameters,
    setup: Arc<Setup>,
    extent: f64,
    center: Coordinate,
    color: Rgb,
    radius: f64,
    growing: bool,
}

impl Grow {
    pub fn create(setup: Arc<Setup>) -> Box<dyn Effect> {
        let bounds = setup.bounds();
        let extent = distance(&bounds.min, &bounds.max).max(f64::EPSILON);
        let mut grow = Grow {
            parameters: Parameters::new().with(Parameter::slider("Speed", 10.0, 1.0, 100.0, 1.0)),
            setup,
            extent,
            center: [0.0; 3],
            color: Rgb::BLACK,
            radius: 0.0,
            growing: false,
        };
        grow.restart();
        Box::new(grow)
    }

    fn restart(&mut self) {
        let mut rng = rand::thread_rng();
        self.growing = !self.growing;
        if self.growing {
            self.color = Rgb::from_hsv(rng.gen::<f64>(), 1.0, 1.0);
            self.radius = 0.0;
        } else {
            self.radius = self.extent;
        }
        let coordinates = self.setup.coordinates();
        if !coordinates.is_empty() {
            self.center = coordinates[rng.gen_range(0..coordinates.len())];
        }
    }
}

impl Effect for Grow {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let step = self.parameters.number("Speed")? / 3000.0 * self.extent;
        self.radius += if self.growing { step } else { -step };
        if self.radius >= self.extent || self.radius <= 0.0 {
            self.restart();
        }
        let radius = self.radius.max(f64::EPSILON);

        let color = self.color;
        let center = self.center;
        let coordinates = self.setup.coordinates();
        context.renderer().update(|pixels| {
            for (pixel, coordinate) in pixels.iter_mut().zip(coordinates) {
                let falloff = distance(coordinate, &center).min(radius) / radius;
                *pixel = color.scale(1.0 - falloff);
            }
        });
        context.renderer().show();
        context.pause(FRAME_INTERVAL);
        Ok(())
    }
}

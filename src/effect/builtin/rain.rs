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

use rand::seq::SliceRandom;

use crate::color::Rgb;
use crate::effect::{Context, Effect, EffectError, Parameter, Parameters};
use crate::setup::Setup;

const FRAME_INTERVAL: Duration = Duration::from_millis(50);

/// Droplets spawn among the highest LEDs.
const SPAWN_POOL: usize = 20;

/// Droplets fall inside a cone: horizontal drift may not exceed this share of the drop.
const CONE_SLOPE: f64 = 0.2;

struct Droplet {
    led: usize,
    age: usize,
}

/// Droplets fall from the top of the installation towards the bottom.
pub struct Rain {
    parameters: Parameters,
    setup: Arc<Setup>,
    spawn_pool: Vec<usize>,
    droplets: Vec<Droplet>,
    /// Next LED below each LED for the cached step size.
    next: Vec<Option<usize>>,
    next_step: Option<f64>,
}

impl Rain {
    pub fn create(setup: Arc<Setup>) -> Box<dyn Effect> {
        Box::new(Rain::new(setup))
    }

    fn new(setup: Arc<Setup>) -> Rain {
        let axis = setup.dimensionality().vertical_axis();
        let mut spawn_pool: Vec<usize> = (0..setup.led_count()).collect();
        spawn_pool.sort_by(|a, b| {
            setup.coordinates()[*b][axis].total_cmp(&setup.coordinates()[*a][axis])
        });
        spawn_pool.truncate(SPAWN_POOL);

        Rain {
            parameters: Parameters::new()
                .with(Parameter::color("Droplet Color", "#0000FF"))
                .with(Parameter::slider("Speed", 5.0, 1.0, 10.0, 1.0))
                .with(Parameter::slider("Amount", 5.0, 1.0, 20.0, 1.0))
                .with(Parameter::slider("Drop Step", 5.0, 1.0, 50.0, 1.0)),
            setup,
            spawn_pool,
            droplets: Vec::new(),
            next: Vec::new(),
            next_step: None,
        }
    }

    /// Recomputes the LED below each LED when the step size changes. `step` is a
    /// percentage of the installation height.
    fn refresh_next(&mut self, step: f64) {
        if self.next_step == Some(step) {
            return;
        }

        let axis = self.setup.dimensionality().vertical_axis();
        let threshold = self.setup.bounds().size(axis) * step / 100.0;
        let coordinates = self.setup.coordinates();
        let horizontal = |a: &[f64; 3], b: &[f64; 3]| -> f64 {
            (0..3)
                .filter(|component| *component != axis)
                .map(|component| (a[component] - b[component]).powi(2))
                .sum::<f64>()
                .sqrt()
        };

        self.next = coordinates
            .iter()
            .map(|from| {
                coordinates
                    .iter()
                    .enumerate()
                    .filter(|(_, to)| to[axis] < from[axis] - threshold)
                    .map(|(i, to)| (i, horizontal(from, to), from[axis] - to[axis]))
                    .filter(|(_, drift, drop)| *drift <= drop * CONE_SLOPE)
                    .min_by(|a, b| a.1.total_cmp(&b.1).then(a.2.total_cmp(&b.2)))
                    .map(|(i, _, _)| i)
            })
            .collect();
        self.next_step = Some(step);
    }
}

impl Effect for Rain {
    fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.parameters
    }

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError> {
        let color = self.parameters.color("Droplet Color")?;
        let hold = self.parameters.number("Speed")?.max(0.0) as usize;
        let amount = self.parameters.number("Amount")?.max(0.0) as usize;
        self.refresh_next(self.parameters.number("Drop Step")?);

        let next = &self.next;
        let mut droplets: Vec<Droplet> = self
            .droplets
            .drain(..)
            .filter_map(|droplet| {
                if droplet.age >= hold {
                    next[droplet.led].map(|led| Droplet { led, age: 0 })
                } else {
                    Some(Droplet {
                        led: droplet.led,
                        age: droplet.age + 1,
                    })
                }
            })
            .collect();

        let mut rng = rand::thread_rng();
        for _ in 0..amount {
            if let Some(led) = self.spawn_pool.choose(&mut rng) {
                droplets.push(Droplet { led: *led, age: 0 });
            }
        }

        context.renderer().update(|pixels| {
            pixels.fill(Rgb::BLACK);
            for droplet in &droplets {
                if let Some(pixel) = pixels.get_mut(droplet.led) {
                    *pixel = color;
                }
            }
        });
        self.droplets = droplets;
        context.renderer().show();
        context.pause(FRAME_INTERVAL);
        Ok(())
    }
}

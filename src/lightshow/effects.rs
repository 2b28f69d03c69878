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
use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use super::{filters, CompileError, Frame};
use crate::color::Rgb;
use crate::effect::Compatibility;
use crate::setup::{Bounds, Coordinate, Dimensionality, Setup};

mod universal;
mod volume;

/// Generates exactly `steps.count` frames. Must be pure: the compiler calls these
/// from several threads at once.
pub type EffectFn = fn(&Stage<'_>, Steps, &Params<'_>) -> Result<Vec<Frame>, CompileError>;

/// Rewrites frames in place.
pub type FilterFn = fn(&mut [Frame], &Params<'_>) -> Result<(), CompileError>;

/// The leading `count` frames of an item that lasts `length` frames. Items running
/// past the end of the audio only have their audible part drawn, but animate as if
/// they were drawn in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Steps {
    pub length: usize,
    pub count: usize,
}

impl Steps {
    pub fn all(length: usize) -> Steps {
        Steps {
            length,
            count: length,
        }
    }

    pub fn clipped(length: usize, count: usize) -> Steps {
        Steps {
            length,
            count: count.min(length),
        }
    }

    /// How far through the item `step` is, from 0.0 at the first frame to 1.0 at
    /// frame `length`.
    pub fn progress(&self, step: usize) -> f64 {
        if self.length == 0 {
            return 0.0;
        }
        step as f64 / self.length as f64
    }
}

/// The geometry an effect draws on, computed once per compilation.
pub struct Stage<'a> {
    setup: &'a Setup,
    bounds: Bounds,
}

impl<'a> Stage<'a> {
    pub fn new(setup: &'a Setup) -> Stage<'a> {
        Stage {
            setup,
            bounds: setup.bounds(),
        }
    }

    pub fn coordinates(&self) -> &[Coordinate] {
        self.setup.coordinates()
    }

    pub fn led_count(&self) -> usize {
        self.setup.led_count()
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    pub fn dimensionality(&self) -> Dimensionality {
        self.setup.dimensionality()
    }

    pub fn vertical_axis(&self) -> usize {
        self.setup.dimensionality().vertical_axis()
    }

    /// A frame with nothing drawn.
    pub fn blank(&self) -> Frame {
        vec![None; self.led_count()]
    }

    /// A frame with every LED set to `color`.
    pub fn filled(&self, color: Rgb) -> Frame {
        vec![Some(color); self.led_count()]
    }
}

/// Read access to a timeline item's parameters.
pub struct Params<'a> {
    values: &'a Map<String, Value>,
}

impl<'a> Params<'a> {
    pub fn new(values: &'a Map<String, Value>) -> Params<'a> {
        Params { values }
    }

    pub fn color(&self, name: &str) -> Result<Rgb, CompileError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| CompileError::MissingParameter(name.to_string()))?;
        Rgb::from_json(value).map_err(|e| CompileError::Parameter {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// A number that may also be written as a numeric string.
    pub fn number_or(&self, name: &str, default: f64) -> Result<f64, CompileError> {
        let Some(value) = self.values.get(name) else {
            return Ok(default);
        };
        let number = match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        number
            .filter(|number| number.is_finite())
            .ok_or_else(|| CompileError::Parameter {
                name: name.to_string(),
                reason: format!("expected a number, got {}", value),
            })
    }
}

#[derive(Clone)]
pub struct LightshowEffect {
    pub key: String,
    pub compatibility: Compatibility,
    pub function: EffectFn,
}

impl fmt::Debug for LightshowEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LightshowEffect")
            .field("key", &self.key)
            .field("compatibility", &self.compatibility)
            .finish()
    }
}

#[derive(Clone)]
pub struct Filter {
    pub key: String,
    pub function: FilterFn,
}

/// A listing entry for the control surface and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct LightshowEffectInfo {
    pub key: String,
    pub compatibility: Compatibility,
}

/// Every lightshow effect and filter the compiler may use, keyed explicitly.
#[derive(Clone, Default)]
pub struct LightshowRegistry {
    effects: Vec<LightshowEffect>,
    filters: Vec<Filter>,
}

impl LightshowRegistry {
    pub fn new() -> LightshowRegistry {
        LightshowRegistry::default()
    }

    /// The built-in effects and filters.
    pub fn builtin() -> LightshowRegistry {
        let mut registry = LightshowRegistry::new();
        universal::register(&mut registry);
        volume::register(&mut registry);
        filters::register(&mut registry);
        registry
    }

    /// Registers an effect, replacing any previous effect with the same key.
    pub fn register_effect(&mut self, key: &str, compatibility: Compatibility, function: EffectFn) {
        let effect = LightshowEffect {
            key: key.to_string(),
            compatibility,
            function,
        };
        match self.effects.iter_mut().find(|existing| existing.key == key) {
            Some(existing) => {
                warn!(effect = key, "Replacing registered lightshow effect");
                *existing = effect;
            }
            None => self.effects.push(effect),
        }
    }

    pub fn register_filter(&mut self, key: &str, function: FilterFn) {
        let filter = Filter {
            key: key.to_string(),
            function,
        };
        match self.filters.iter_mut().find(|existing| existing.key == key) {
            Some(existing) => {
                warn!(filter = key, "Replacing registered lightshow filter");
                *existing = filter;
            }
            None => self.filters.push(filter),
        }
    }

    pub fn effect(&self, key: &str) -> Option<&LightshowEffect> {
        self.effects.iter().find(|effect| effect.key == key)
    }

    pub fn filter(&self, key: &str) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.key == key)
    }

    pub fn list(&self) -> Vec<LightshowEffectInfo> {
        self.effects
            .iter()
            .map(|effect| LightshowEffectInfo {
                key: effect.key.clone(),
                compatibility: effect.compatibility,
            })
            .collect()
    }

    pub fn filter_keys(&self) -> Vec<&str> {
        self.filters.iter().map(|filter| filter.key.as_str()).collect()
    }
}

/// Sweeps a soft band of `color` across `axis` over the item, towards
/// increasing coordinates when `forward`. The band is brightest at its center and
/// `width` wide.
fn band_sweep(
    stage: &Stage<'_>,
    steps: Steps,
    axis: usize,
    color: Rgb,
    width: f64,
    forward: bool,
) -> Vec<Frame> {
    let (min, max) = (stage.bounds().min[axis], stage.bounds().max[axis]);
    let travel = max - min + 2.0 * width;
    let half = width / 2.0;

    (1..=steps.count)
        .map(|step| {
            let offset = travel * steps.progress(step);
            let position = if forward {
                min - width + offset
            } else {
                max + width - offset
            };

            stage
                .coordinates()
                .iter()
                .map(|coordinate| {
                    let distance = (coordinate[axis] - position).abs();
                    (distance < half).then(|| color.lerp(&Rgb::BLACK, distance / half))
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::testutil::{column_setup, row_setup};

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_params() {
        let values = params(json!({"color": "#00FF00", "speed": "2.5", "width": true}));
        let params = Params::new(&values);
        assert!(matches!(params.color("color"), Ok(color) if color == Rgb::new(0, 255, 0)));
        assert!(matches!(params.number_or("speed", 1.0), Ok(speed) if speed == 2.5));
        assert!(matches!(params.number_or("missing", 1.0), Ok(value) if value == 1.0));
        assert!(matches!(
            params.number_or("width", 1.0),
            Err(CompileError::Parameter { .. })
        ));
        assert!(matches!(
            params.color("color2"),
            Err(CompileError::MissingParameter(_))
        ));
    }

    #[test]
    fn test_builtin_effects_return_requested_frames() -> Result<(), CompileError> {
        let registry = LightshowRegistry::builtin();
        let setup = column_setup(30);
        let stage = Stage::new(&setup);
        let values = params(json!({
            "color": [255, 0, 0],
            "color1": [255, 0, 0],
            "color2": "#0000FF",
            "width": 4,
            "speed": 1,
            "trail_length": 3,
        }));

        for effect in registry.effects.iter() {
            let frames = (effect.function)(&stage, Steps::all(12), &Params::new(&values))?;
            assert_eq!(12, frames.len(), "{}", effect.key);
            assert!(frames.iter().all(|frame| frame.len() == 30), "{}", effect.key);

            // A clipped item draws the start of the full animation.
            let clipped = (effect.function)(&stage, Steps::clipped(12, 5), &Params::new(&values))?;
            assert_eq!(5, clipped.len(), "{}", effect.key);
            assert_eq!(frames[..5], clipped[..], "{}", effect.key);
        }

        // Lengths nobody could allocate are fine as long as few frames are drawn.
        let solid = registry.effect("solid").expect("solid is built in");
        let frames = (solid.function)(&stage, Steps::clipped(usize::MAX, 2), &Params::new(&values))?;
        assert_eq!(2, frames.len());
        Ok(())
    }

    #[test]
    fn test_registry() {
        let mut registry = LightshowRegistry::builtin();
        assert!(registry.effect("solid").is_some());
        assert!(registry.effect("solid_color").is_some());
        assert!(registry.filter("dim").is_some());
        assert!(registry.effect("nope").is_none());
        assert_eq!(
            Some(Compatibility::Only3D),
            registry.effect("swipe_forward").map(|effect| effect.compatibility)
        );

        let count = registry.list().len();
        registry.register_effect("solid", Compatibility::Only2D, |stage, steps, _| {
            Ok(vec![stage.blank(); steps.count])
        });
        assert_eq!(count, registry.list().len());
        assert!(!registry
            .effect("solid")
            .is_some_and(|effect| effect.compatibility.supports(Dimensionality::ThreeD)));
    }

    #[test]
    fn test_band_sweep_passes_every_led() {
        let setup = row_setup(10);
        let stage = Stage::new(&setup);
        let frames = band_sweep(&stage, Steps::all(20), 0, Rgb::RED, 2.0, true);

        for led in 0..10 {
            assert!(
                frames.iter().any(|frame| frame[led].is_some()),
                "LED {} never lit",
                led
            );
        }
        // Outside the band nothing is drawn.
        assert!(frames[0][9].is_none());
    }
}

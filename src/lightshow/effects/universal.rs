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
//! Effects that work on any installation.

use super::{band_sweep, LightshowRegistry, Params, Stage, Steps};
use crate::color::Rgb;
use crate::effect::Compatibility;
use crate::lightshow::{CompileError, Frame};

pub(super) fn register(registry: &mut LightshowRegistry) {
    registry.register_effect("solid_color", Compatibility::Universal, solid_color);
    registry.register_effect("solid", Compatibility::Universal, solid_color);
    registry.register_effect("fade", Compatibility::Universal, fade);
    registry.register_effect("flash", Compatibility::Universal, flash);
    registry.register_effect("flash2", Compatibility::Universal, flash2);
    registry.register_effect("swipe_up", Compatibility::Universal, swipe_up);
    registry.register_effect("swipe_down", Compatibility::Universal, swipe_down);
    registry.register_effect("swipe_left", Compatibility::Universal, swipe_left);
    registry.register_effect("swipe_right", Compatibility::Universal, swipe_right);
    registry.register_effect("rainbow", Compatibility::Universal, rainbow);
    registry.register_effect("gradient", Compatibility::Universal, gradient);
    registry.register_effect("string_up", Compatibility::Universal, string_up);
    registry.register_effect("string_down", Compatibility::Universal, string_down);
    registry.register_effect("split_vertical", Compatibility::Universal, split_vertical);
}

fn solid_color(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    Ok(vec![stage.filled(color); steps.count])
}

/// Linear fade from `color1` towards `color2`.
fn fade(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let from = params.color("color1")?;
    let to = params.color("color2")?;
    Ok((0..steps.count)
        .map(|step| stage.filled(from.lerp(&to, steps.progress(step))))
        .collect())
}

/// Alternates the whole installation between two colors every frame.
fn flash(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let even = stage.filled(params.color("color1")?);
    let odd = stage.filled(params.color("color2")?);
    Ok((0..steps.count)
        .map(|step| if step % 2 == 0 { even.clone() } else { odd.clone() })
        .collect())
}

/// Alternates neighbouring LEDs between two colors, swapping every frame.
fn flash2(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color1 = params.color("color1")?;
    let color2 = params.color("color2")?;
    Ok((0..steps.count)
        .map(|step| {
            (0..stage.led_count())
                .map(|led| Some(if led % 2 == step % 2 { color1 } else { color2 }))
                .collect()
        })
        .collect())
}

fn swipe_up(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let width = params.number_or("width", 100.0)?;
    Ok(band_sweep(stage, steps, stage.vertical_axis(), color, width, true))
}

fn swipe_down(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let width = params.number_or("width", 100.0)?;
    Ok(band_sweep(stage, steps, stage.vertical_axis(), color, width, false))
}

fn swipe_right(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let width = params.number_or("width", 50.0)?;
    Ok(band_sweep(stage, steps, 0, color, width, true))
}

fn swipe_left(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let width = params.number_or("width", 50.0)?;
    Ok(band_sweep(stage, steps, 0, color, width, false))
}

/// Runs `shade` with each LED's height, scrolled by `speed` units per frame and
/// wrapped into 0.0..1.0.
fn scrolling(
    stage: &Stage<'_>,
    steps: Steps,
    speed: f64,
    shade: impl Fn(f64) -> Rgb,
) -> Vec<Frame> {
    let axis = stage.vertical_axis();
    let bounds = stage.bounds();
    let height = bounds.size(axis).max(f64::EPSILON);

    let mut offset = 0.0;
    (0..steps.count)
        .map(|_| {
            offset += speed;
            if offset > height {
                offset = 0.0;
            }
            stage
                .coordinates()
                .iter()
                .map(|coordinate| {
                    let position = coordinate[axis] - bounds.min[axis] - offset;
                    Some(shade(position.rem_euclid(height) / height))
                })
                .collect()
        })
        .collect()
}

fn rainbow(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let speed = params.number_or("speed", 10.0)?;
    Ok(scrolling(stage, steps, speed, |hue| Rgb::from_hsv(hue, 1.0, 1.0)))
}

fn gradient(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color1 = params.color("color1")?;
    let color2 = params.color("color2")?;
    let speed = params.number_or("speed", 10.0)?;
    Ok(scrolling(stage, steps, speed, |t| color1.lerp(&color2, t)))
}

/// A comet running along the LED string in index order, its tail fading to
/// black.
fn string_run(stage: &Stage<'_>, steps: Steps, params: &Params<'_>, upwards: bool) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let trail = params.number_or("trail_length", 25.0)?.max(1.0) as i64;
    let count = stage.led_count() as i64;
    let travel = (count + 2 * trail) as f64;

    Ok((1..=steps.count)
        .map(|step| {
            let advance = (travel * steps.progress(step)) as i64;
            let head = if upwards {
                advance - trail
            } else {
                count + trail - advance
            };

            let mut frame = stage.blank();
            for i in 0..trail {
                let position = if upwards { head + i } else { head - i };
                if (0..count).contains(&position) {
                    frame[position as usize] =
                        Some(Rgb::BLACK.lerp(&color, i as f64 / trail as f64));
                }
            }
            frame
        })
        .collect())
}

fn string_up(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    string_run(stage, steps, params, true)
}

fn string_down(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    string_run(stage, steps, params, false)
}

/// `color1` left of the horizontal center, `color2` right of it.
fn split_vertical(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let left = params.color("color1")?;
    let right = params.color("color2")?;
    let middle = stage.bounds().center()[0];
    let frame: Frame = stage
        .coordinates()
        .iter()
        .map(|coordinate| Some(if coordinate[0] < middle { left } else { right }))
        .collect();
    Ok(vec![frame; steps.count])
}

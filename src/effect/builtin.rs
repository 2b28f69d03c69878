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
use std::time::Duration;

use super::{Compatibility, EffectDescriptor};
use crate::setup::Setup;

mod breathing;
mod grow;
mod rain;
mod rainbow;
mod sparkles;
mod static_color;
mod sweep;

/// Animated effects render roughly this often.
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Static effects only need to refresh occasionally.
const STATIC_INTERVAL: Duration = Duration::from_millis(100);

pub fn descriptors() -> Vec<EffectDescriptor> {
    vec![
        EffectDescriptor::new(
            "static_color",
            "Static Color",
            Compatibility::Universal,
            static_color::StaticColor::create,
        ),
        EffectDescriptor::new(
            "static_four",
            "Static Four",
            Compatibility::Primarily3D,
            static_color::StaticFour::create,
        ),
        EffectDescriptor::new(
            "breathing",
            "Breathing",
            Compatibility::Universal,
            breathing::Breathing::create,
        ),
        EffectDescriptor::new(
            "rainbow",
            "Rainbow",
            Compatibility::Universal,
            rainbow::Rainbow::create,
        ),
        EffectDescriptor::new(
            "sparkles",
            "Sparkles",
            Compatibility::Universal,
            sparkles::Sparkles::create,
        ),
        EffectDescriptor::new(
            "color_sweep",
            "Color Sweep",
            Compatibility::Primarily3D,
            sweep::ColorSweep::create,
        ),
        EffectDescriptor::new("grow", "Grow", Compatibility::Universal, grow::Grow::create),
        EffectDescriptor::new("rain", "Rain", Compatibility::Primarily3D, rain::Rain::create),
    ]
}

/// Each LED's position along the vertical axis, normalized to 0.0..=1.0.
fn vertical_positions(setup: &Setup) -> Vec<f64> {
    let axis = setup.dimensionality().vertical_axis();
    let bounds = setup.bounds();
    setup
        .coordinates()
        .iter()
        .map(|coordinate| bounds.normalize(axis, coordinate[axis]))
        .collect()
}

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
//! Effects that need depth, so only make sense on 3D installations.

use super::{band_sweep, LightshowRegistry, Params, Stage, Steps};
use crate::effect::Compatibility;
use crate::lightshow::{CompileError, Frame};

/// Depth axis of a 3D setup.
const DEPTH: usize = 1;

pub(super) fn register(registry: &mut LightshowRegistry) {
    registry.register_effect("swipe_forward", Compatibility::Only3D, swipe_forward);
    registry.register_effect("swipe_backward", Compatibility::Only3D, swipe_backward);
}

fn swipe_forward(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let width = params.number_or("width", 50.0)?;
    Ok(band_sweep(stage, steps, DEPTH, color, width, true))
}

fn swipe_backward(stage: &Stage<'_>, steps: Steps, params: &Params<'_>) -> Result<Vec<Frame>, CompileError> {
    let color = params.color("color")?;
    let width = params.number_or("width", 50.0)?;
    Ok(band_sweep(stage, steps, DEPTH, color, width, false))
}

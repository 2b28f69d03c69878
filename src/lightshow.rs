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
//! Timeline lightshows: documents, the pure effects they reference and the
//! compiler that turns them into frames.

use crate::color::Pixel;

mod compiler;
mod document;
mod effects;
mod filters;

pub use compiler::compile;
pub use document::{Document, DocumentError, Operation, TimelineItem};
pub use effects::{
    EffectFn, Filter, FilterFn, LightshowEffect, LightshowEffectInfo, LightshowRegistry, Params,
    Stage, Steps,
};

/// One LED value per LED. `None` means the producing effect did not draw the LED.
pub type Frame = Vec<Pixel>;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("frame rate must be positive, got {0}")]
    InvalidFrameRate(f64),

    #[error("audio length must be a non-negative number of seconds, got {0}")]
    InvalidLength(f64),

    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    #[error("invalid parameter '{name}': {reason}")]
    Parameter { name: String, reason: String },

    #[error("timeline item from {start}s to {end}s is too long to compile")]
    ItemTooLong { start: f64, end: f64 },
}

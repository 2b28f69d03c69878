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
use std::{cell::Cell, fmt, sync::Arc, time::Duration};

use serde::Serialize;

use crate::renderer::{Renderer, RendererError};
use crate::setup::{Dimensionality, Setup};

mod builtin;
pub mod parameter;
mod registry;

pub use parameter::{Parameter, ParameterError, ParameterKind, ParameterValue, Parameters};
pub use registry::EffectRegistry;

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error("unknown effect '{0}'")]
    Unknown(String),

    #[error("effect '{key}' does not support {dimensionality} setups")]
    Incompatible {
        key: String,
        dimensionality: Dimensionality,
    },

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
#[error("effect '{key}' failed validation: {source}")]
pub struct ValidationError {
    pub key: String,
    #[source]
    pub source: EffectError,
}

/// Which kinds of setup an effect is designed for. Only the `Only*` tags exclude a setup;
/// the others are hints for the effect list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    #[serde(rename = "only_2d")]
    Only2D,
    #[serde(rename = "only_3d")]
    Only3D,
    #[serde(rename = "primarily_2d")]
    Primarily2D,
    #[serde(rename = "primarily_3d")]
    Primarily3D,
    Universal,
}

impl Compatibility {
    pub fn supports(&self, dimensionality: Dimensionality) -> bool {
        !matches!(
            (self, dimensionality),
            (Compatibility::Only2D, Dimensionality::ThreeD)
                | (Compatibility::Only3D, Dimensionality::TwoD)
        )
    }
}

impl fmt::Display for Compatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compatibility::Only2D => write!(f, "2D Only"),
            Compatibility::Only3D => write!(f, "3D Only"),
            Compatibility::Primarily2D => write!(f, "Primarily 2D"),
            Compatibility::Primarily3D => write!(f, "Primarily 3D"),
            Compatibility::Universal => write!(f, "Universal"),
        }
    }
}

/// What an effect sees during an update: the LED buffer and a way to ask for a pause
/// before the next update.
pub struct Context<'a> {
    renderer: &'a Renderer,
    pause: Cell<Duration>,
}

impl<'a> Context<'a> {
    pub fn new(renderer: &'a Renderer) -> Context<'a> {
        Context {
            renderer,
            pause: Cell::new(Duration::ZERO),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        self.renderer
    }

    /// Asks the runner to wait `duration` before the next update. The runner waits
    /// with the effect released, so parameter changes and swaps land during the pause.
    pub fn pause(&self, duration: Duration) {
        self.pause.set(duration);
    }

    pub fn requested_pause(&self) -> Duration {
        self.pause.get()
    }
}

/// A stateful, continuously updating LED pattern. Each `update` renders one step and
/// paces itself.
pub trait Effect: Send {
    fn parameters(&self) -> &Parameters;

    fn parameters_mut(&mut self) -> &mut Parameters;

    fn update(&mut self, context: &Context<'_>) -> Result<(), EffectError>;
}

pub type Constructor = fn(Arc<Setup>) -> Box<dyn Effect>;

/// A registered effect implementation.
#[derive(Clone)]
pub struct EffectDescriptor {
    pub key: String,
    pub display_name: String,
    pub compatibility: Compatibility,
    pub constructor: Constructor,
}

impl EffectDescriptor {
    pub fn new(
        key: &str,
        display_name: &str,
        compatibility: Compatibility,
        constructor: Constructor,
    ) -> EffectDescriptor {
        EffectDescriptor {
            key: key.to_string(),
            display_name: display_name.to_string(),
            compatibility,
            constructor,
        }
    }

    /// Builds a fresh instance against the given geometry.
    pub fn build(&self, setup: Arc<Setup>) -> Result<Box<dyn Effect>, EffectError> {
        if !self.compatibility.supports(setup.dimensionality()) {
            return Err(EffectError::Incompatible {
                key: self.key.clone(),
                dimensionality: setup.dimensionality(),
            });
        }
        Ok((self.constructor)(setup))
    }
}

impl fmt::Debug for EffectDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectDescriptor")
            .field("key", &self.key)
            .field("display_name", &self.display_name)
            .field("compatibility", &self.compatibility)
            .finish()
    }
}

/// The entry shown in effect listings.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EffectInfo {
    pub key: String,
    pub display_name: String,
    pub compatibility: Compatibility,
}

impl From<&EffectDescriptor> for EffectInfo {
    fn from(descriptor: &EffectDescriptor) -> Self {
        EffectInfo {
            key: descriptor.key.clone(),
            display_name: descriptor.display_name.clone(),
            compatibility: descriptor.compatibility,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_compatibility() {
        assert!(!Compatibility::Only3D.supports(Dimensionality::TwoD));
        assert!(Compatibility::Only3D.supports(Dimensionality::ThreeD));
        assert!(!Compatibility::Only2D.supports(Dimensionality::ThreeD));
        assert!(Compatibility::Primarily3D.supports(Dimensionality::TwoD));
        assert!(Compatibility::Universal.supports(Dimensionality::TwoD));
    }

    #[test]
    fn test_compatibility_serializes_as_tag() -> Result<(), serde_json::Error> {
        assert_eq!("\"only_3d\"", serde_json::to_string(&Compatibility::Only3D)?);
        assert_eq!(
            "\"universal\"",
            serde_json::to_string(&Compatibility::Universal)?
        );
        Ok(())
    }

    #[test]
    fn test_pause_is_recorded_not_slept() {
        let renderer = Renderer::new(1, Box::new(crate::renderer::NullSink));
        let context = Context::new(&renderer);
        assert_eq!(Duration::ZERO, context.requested_pause());

        let start = std::time::Instant::now();
        context.pause(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(Duration::from_secs(5), context.requested_pause());
    }
}

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
use std::io;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;

use crate::color::Rgb;
use crate::setup::Coordinate;

mod null;
mod recording;
mod simulator;

pub use null::NullSink;
pub use recording::RecordingSink;
pub use simulator::SimulatorSink;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unable to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RendererError {
    #[error("LED index {index} is out of range for {len} LEDs")]
    OutOfRange { index: usize, len: usize },

    #[error("expected {expected} pixels, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Geometry overlays that the simulator draws on top of the LEDs.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DebugElement {
    Point {
        position: Coordinate,
        color: Rgb,
    },
    Line {
        from: Coordinate,
        to: Coordinate,
        color: Rgb,
    },
}

/// What a sink receives on every show: brightness-scaled colors plus overlays.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct SinkFrame {
    pub leds: Vec<Rgb>,
    pub debug_elements: Vec<DebugElement>,
}

/// The destination of rendered frames.
pub trait Sink: Send + Sync {
    fn send(&self, frame: &SinkFrame) -> Result<(), SinkError>;
}

struct Buffer {
    pixels: Vec<Rgb>,
    debug_elements: Vec<DebugElement>,
    brightness: f64,
}

/// The shared LED buffer. Its length is fixed at construction. Only the active engine
/// writes to it; the mutex exists so it can be shared, not to arbitrate between writers.
pub struct Renderer {
    buffer: Mutex<Buffer>,
    sink: Box<dyn Sink>,
}

impl Renderer {
    pub fn new(len: usize, sink: Box<dyn Sink>) -> Renderer {
        Renderer {
            buffer: Mutex::new(Buffer {
                pixels: vec![Rgb::BLACK; len],
                debug_elements: Vec::new(),
                brightness: 1.0,
            }),
            sink,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Rgb> {
        self.buffer.lock().pixels.get(index).copied()
    }

    pub fn set(&self, index: usize, color: Rgb) -> Result<(), RendererError> {
        let mut buffer = self.buffer.lock();
        let len = buffer.pixels.len();
        match buffer.pixels.get_mut(index) {
            Some(pixel) => {
                *pixel = color;
                Ok(())
            }
            None => Err(RendererError::OutOfRange { index, len }),
        }
    }

    pub fn fill(&self, color: Rgb) {
        self.buffer.lock().pixels.fill(color);
    }

    /// Fills with black and drops any overlays.
    pub fn clear(&self) {
        let mut buffer = self.buffer.lock();
        buffer.pixels.fill(Rgb::BLACK);
        buffer.debug_elements.clear();
    }

    /// Replaces every pixel. The length must match exactly.
    pub fn set_all(&self, pixels: &[Rgb]) -> Result<(), RendererError> {
        let mut buffer = self.buffer.lock();
        if pixels.len() != buffer.pixels.len() {
            return Err(RendererError::LengthMismatch {
                expected: buffer.pixels.len(),
                actual: pixels.len(),
            });
        }
        buffer.pixels.copy_from_slice(pixels);
        Ok(())
    }

    /// Runs `f` against the pixel buffer for bulk updates.
    pub fn update<T>(&self, f: impl FnOnce(&mut [Rgb]) -> T) -> T {
        f(&mut self.buffer.lock().pixels)
    }

    pub fn pixels(&self) -> Vec<Rgb> {
        self.buffer.lock().pixels.clone()
    }

    pub fn set_debug_elements(&self, debug_elements: Vec<DebugElement>) {
        self.buffer.lock().debug_elements = debug_elements;
    }

    pub fn brightness(&self) -> f64 {
        self.buffer.lock().brightness
    }

    /// Sets the output brightness, clamped to 0.0..=1.0. Stored pixels are not modified.
    pub fn set_brightness(&self, brightness: f64) {
        self.buffer.lock().brightness = brightness.clamp(0.0, 1.0);
    }

    /// Pushes the buffer to the sink. Failures are logged; the next show tries again.
    pub fn show(&self) {
        let frame = {
            let buffer = self.buffer.lock();
            SinkFrame {
                leds: buffer
                    .pixels
                    .iter()
                    .map(|pixel| pixel.scale(buffer.brightness))
                    .collect(),
                debug_elements: buffer.debug_elements.clone(),
            }
        };

        if let Err(e) = self.sink.send(&frame) {
            error!(err = %e, "Unable to show frame");
        }
    }
}

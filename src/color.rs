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

use serde::{Deserialize, Serialize};

/// A single LED color. Serializes as `[r, g, b]`, which is what the simulator
/// and the lightshow files use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A pixel in a lightshow frame. `None` is the transparent sentinel: the effect
/// that produced the frame did not draw this LED. Black is `Some(Rgb::BLACK)`.
pub type Pixel = Option<Rgb>;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ColorError {
    #[error("invalid hex color '{0}', expected #RRGGBB")]
    InvalidHex(String),

    #[error("invalid color value: {0}")]
    InvalidValue(String),
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Rgb {
        Rgb { r, g, b }
    }

    /// Parses `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(hex: &str) -> Result<Rgb, ColorError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ColorError::InvalidHex(hex.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16).map_err(|_| ColorError::InvalidHex(hex.to_string()))
        };
        Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }

    /// Accepts either a `[r, g, b]` array or a `#RRGGBB` string.
    pub fn from_json(value: &serde_json::Value) -> Result<Rgb, ColorError> {
        match value {
            serde_json::Value::String(hex) => Rgb::from_hex(hex),
            serde_json::Value::Array(channels) if channels.len() == 3 => {
                let mut rgb = [0u8; 3];
                for (slot, channel) in rgb.iter_mut().zip(channels) {
                    let number = channel
                        .as_f64()
                        .ok_or_else(|| ColorError::InvalidValue(value.to_string()))?;
                    *slot = number.clamp(0.0, 255.0) as u8;
                }
                Ok(Rgb::from(rgb))
            }
            _ => Err(ColorError::InvalidValue(value.to_string())),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Converts HSV to RGB. `h` is in turns (0.0..1.0), `s` and `v` in 0.0..=1.0.
    pub fn from_hsv(h: f64, s: f64, v: f64) -> Rgb {
        let h = h.rem_euclid(1.0) * 360.0;
        let c = v * s;
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = v - c;

        let (r, g, b) = match (h / 60.0).floor() as u8 % 6 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };

        Rgb::new(
            ((r + m) * 255.0) as u8,
            ((g + m) * 255.0) as u8,
            ((b + m) * 255.0) as u8,
        )
    }

    /// Linearly interpolates towards `other`. `t` is clamped to 0.0..=1.0.
    pub fn lerp(&self, other: &Rgb, t: f64) -> Rgb {
        let t = t.clamp(0.0, 1.0);
        let lerp_u8 = |a: u8, b: u8| -> u8 { (a as f64 * (1.0 - t) + b as f64 * t) as u8 };
        Rgb::new(
            lerp_u8(self.r, other.r),
            lerp_u8(self.g, other.g),
            lerp_u8(self.b, other.b),
        )
    }

    /// Scales every channel by `factor` (clamped to 0.0..=1.0).
    pub fn scale(&self, factor: f64) -> Rgb {
        let factor = factor.clamp(0.0, 1.0);
        Rgb::new(
            (self.r as f64 * factor) as u8,
            (self.g as f64 * factor) as u8,
            (self.b as f64 * factor) as u8,
        )
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(value: [u8; 3]) -> Self {
        Rgb::new(value[0], value[1], value[2])
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(value: Rgb) -> Self {
        [value.r, value.g, value.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

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
//! Filters rewrite what the layers beneath them have drawn.

use super::{CompileError, Frame, LightshowRegistry, Params};

pub(super) fn register(registry: &mut LightshowRegistry) {
    registry.register_filter("dim", dim);
}

/// Scales every drawn pixel by `factor`. Transparent pixels stay transparent.
fn dim(frames: &mut [Frame], params: &Params<'_>) -> Result<(), CompileError> {
    let factor = params.number_or("factor", 0.5)?;
    if !(0.0..=1.0).contains(&factor) {
        return Err(CompileError::Parameter {
            name: "factor".to_string(),
            reason: format!("{} is outside 0.0..=1.0", factor),
        });
    }

    frames
        .iter_mut()
        .flat_map(|frame| frame.iter_mut())
        .for_each(|pixel| *pixel = pixel.map(|color| color.scale(factor)));
    Ok(())
}

#[cfg(test)]
mod test {
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::color::Rgb;

    #[test]
    fn test_dim() -> Result<(), CompileError> {
        let mut frames = vec![vec![Some(Rgb::new(200, 100, 50)), None]];
        let mut values = Map::new();
        values.insert("factor".to_string(), json!(0.5));
        dim(&mut frames, &Params::new(&values))?;
        assert_eq!(vec![Some(Rgb::new(100, 50, 25)), None], frames[0]);

        values.insert("factor".to_string(), Value::from(2));
        assert!(dim(&mut frames, &Params::new(&values)).is_err());
        Ok(())
    }
}

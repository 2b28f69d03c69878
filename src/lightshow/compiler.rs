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
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::{
    CompileError, Document, Frame, LightshowRegistry, Operation, Params, Stage, Steps, TimelineItem,
};
use crate::color::Rgb;
use crate::setup::Setup;

/// Where an item lands in the output: its first frame and the frames it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    start: usize,
    steps: Steps,
}

impl Placement {
    fn end(&self) -> usize {
        self.start + self.steps.count
    }
}

/// Places `item` within `total` frames. `None` means nothing of it is audible.
fn place(item: &TimelineItem, fps: f64, total: usize) -> Result<Option<Placement>, CompileError> {
    let length = ((item.end - item.start) * fps).round();
    // The negated comparison also catches NaN.
    if !(length >= 0.0 && length < usize::MAX as f64) {
        return Err(CompileError::ItemTooLong {
            start: item.start,
            end: item.end,
        });
    }
    let start = (item.start * fps).round().max(0.0);
    if !(start < total as f64) {
        return Ok(None);
    }

    let (start, length) = (start as usize, length as usize);
    let end = start.checked_add(length).map_or(total, |end| end.min(total));
    if start >= end {
        return Ok(None);
    }
    Ok(Some(Placement {
        start,
        steps: Steps::clipped(length, end - start),
    }))
}

/// Compiles a document into one fully opaque frame per `1/fps` seconds of audio.
///
/// Items are composited layer by layer, and within a layer in start order. Every
/// pixel an item draws replaces whatever is underneath it; pixels nobody drew
/// end up black.
pub fn compile(
    document: &Document,
    setup: &Setup,
    registry: &LightshowRegistry,
    fps: f64,
    audio_length: f64,
) -> Result<Vec<Vec<Rgb>>, CompileError> {
    if !(fps > 0.0) || !fps.is_finite() {
        return Err(CompileError::InvalidFrameRate(fps));
    }
    if !(audio_length >= 0.0) || !audio_length.is_finite() {
        return Err(CompileError::InvalidLength(audio_length));
    }

    let stage = Stage::new(setup);
    let total = (audio_length * fps).ceil() as usize;
    let mut buffer: Vec<Frame> = vec![stage.blank(); total];
    let items = document.ordered_items();
    let placements = items
        .iter()
        .map(|item| place(item, fps, total))
        .collect::<Result<Vec<Option<Placement>>, CompileError>>()?;

    // Effects are pure, so they can all be rendered up front. Compositing below
    // stays sequential to keep the overwrite order.
    let rendered: Vec<Option<Vec<Frame>>> = items
        .par_iter()
        .zip(placements.par_iter())
        .map(|(item, placement)| {
            placement.and_then(|placement| render(item, placement.steps, &stage, registry))
        })
        .collect();

    for ((item, placement), frames) in items.iter().zip(placements).zip(rendered) {
        let Some(placement) = placement else {
            debug!(
                operation = item.operation.key(),
                start = item.start,
                "Timeline item falls outside the audio, skipping"
            );
            continue;
        };
        let range = placement.start..placement.end();

        match &item.operation {
            Operation::Effect(_) => {
                let Some(frames) = frames else {
                    continue;
                };
                for (target, frame) in buffer[range].iter_mut().zip(frames) {
                    for (pixel, drawn) in target.iter_mut().zip(frame) {
                        if drawn.is_some() {
                            *pixel = drawn;
                        }
                    }
                }
            }
            Operation::Filter(key) => {
                let Some(filter) = registry.filter(key) else {
                    warn!(filter = key.as_str(), "Unknown lightshow filter, skipping");
                    continue;
                };
                if let Err(e) = (filter.function)(&mut buffer[range], &Params::new(&item.parameters)) {
                    warn!(filter = key.as_str(), err = %e, "Lightshow filter failed, skipping");
                }
            }
        }
    }

    info!(
        items = items.len(),
        frames = total,
        fps,
        leds = stage.led_count(),
        "Compiled lightshow"
    );

    Ok(buffer
        .into_iter()
        .map(|frame| {
            frame
                .into_iter()
                .map(|pixel| pixel.unwrap_or(Rgb::BLACK))
                .collect()
        })
        .collect())
}

/// Runs the item's effect. `None` means the item is skipped; the reason has been
/// logged.
fn render(
    item: &TimelineItem,
    steps: Steps,
    stage: &Stage<'_>,
    registry: &LightshowRegistry,
) -> Option<Vec<Frame>> {
    let Operation::Effect(key) = &item.operation else {
        return None;
    };
    let Some(effect) = registry.effect(key) else {
        warn!(effect = key.as_str(), "Unknown lightshow effect, skipping");
        return None;
    };
    let dimensionality = stage.dimensionality();
    if !effect.compatibility.supports(dimensionality) {
        warn!(
            effect = key.as_str(),
            %dimensionality,
            "Lightshow effect does not support this setup, skipping"
        );
        return None;
    }

    let frames = match (effect.function)(stage, steps, &Params::new(&item.parameters)) {
        Ok(frames) => frames,
        Err(e) => {
            warn!(effect = key.as_str(), err = %e, "Lightshow effect failed, skipping");
            return None;
        }
    };

    if frames.len() != steps.count {
        warn!(
            effect = key.as_str(),
            expected = steps.count,
            actual = frames.len(),
            "Lightshow effect returned the wrong number of frames, skipping"
        );
        return None;
    }
    if let Some(frame) = frames.iter().find(|frame| frame.len() != stage.led_count()) {
        warn!(
            effect = key.as_str(),
            expected = stage.led_count(),
            actual = frame.len(),
            "Lightshow effect returned a frame of the wrong size, skipping"
        );
        return None;
    }
    Some(frames)
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use serde_json::{json, Map, Value};

    use super::*;
    use crate::effect::Compatibility;
    use crate::testutil::{column_setup, row_setup};

    fn item(start: f64, end: f64, operation: Operation, parameters: Value, layer: usize) -> TimelineItem {
        TimelineItem {
            start,
            end,
            operation,
            parameters: match parameters {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            layer,
        }
    }

    fn effect(key: &str) -> Operation {
        Operation::Effect(key.to_string())
    }

    #[test]
    fn test_single_solid_item() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            1,
            vec![item(1.0, 2.0, effect("solid"), json!({"color": [255, 0, 0]}), 0)],
        )?;
        let setup = column_setup(5);
        let frames = compile(&document, &setup, &LightshowRegistry::builtin(), 10.0, 3.0)?;

        assert_eq!(30, frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let expected = if (10..20).contains(&index) {
                Rgb::RED
            } else {
                Rgb::BLACK
            };
            assert_eq!(vec![expected; 5], *frame, "frame {}", index);
        }
        Ok(())
    }

    #[test]
    fn test_higher_layer_wins() -> Result<(), Box<dyn Error>> {
        let blue = Rgb::new(0, 0, 255);
        let document = Document::new(
            "song.wav".into(),
            2,
            vec![
                // Listed first but composited last.
                item(0.0, 1.0, effect("solid"), json!({"color": "#0000FF"}), 1),
                item(0.0, 1.0, effect("solid"), json!({"color": "#FF0000"}), 0),
            ],
        )?;
        let frames = compile(&document, &column_setup(3), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        assert!(frames.iter().all(|frame| frame.iter().all(|pixel| *pixel == blue)));
        Ok(())
    }

    #[test]
    fn test_later_item_overwrites_tail_within_layer() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            1,
            vec![
                item(0.5, 1.0, effect("solid"), json!({"color": "#FFFFFF"}), 0),
                item(0.0, 1.0, effect("solid"), json!({"color": "#FF0000"}), 0),
            ],
        )?;
        let frames = compile(&document, &column_setup(1), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        assert_eq!(vec![Rgb::RED], frames[4]);
        assert_eq!(vec![Rgb::WHITE], frames[5]);
        Ok(())
    }

    #[test]
    fn test_transparent_pixels_keep_lower_layers() -> Result<(), Box<dyn Error>> {
        let mut registry = LightshowRegistry::builtin();
        registry.register_effect("first_led", Compatibility::Universal, |stage, steps, params| {
            let mut frame = stage.blank();
            frame[0] = Some(params.color("color")?);
            Ok(vec![frame; steps.count])
        });

        let document = Document::new(
            "song.wav".into(),
            2,
            vec![
                item(0.0, 1.0, effect("solid"), json!({"color": "#FF0000"}), 0),
                item(0.0, 1.0, effect("first_led"), json!({"color": "#FFFFFF"}), 1),
            ],
        )?;
        let frames = compile(&document, &column_setup(3), &registry, 10.0, 1.0)?;

        assert_eq!(vec![Rgb::WHITE, Rgb::RED, Rgb::RED], frames[0]);
        Ok(())
    }

    #[test]
    fn test_undrawn_pixels_resolve_to_black() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            1,
            vec![item(0.0, 1.0, effect("string_up"), json!({"color": "#FFFFFF", "trail_length": 1}), 0)],
        )?;
        let frames = compile(&document, &column_setup(20), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        for frame in &frames {
            assert_eq!(20, frame.len());
            assert!(frame.iter().filter(|pixel| **pixel != Rgb::BLACK).count() <= 1);
        }
        Ok(())
    }

    #[test]
    fn test_unknown_and_incompatible_effects_are_skipped() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            1,
            vec![
                item(0.0, 0.5, effect("does_not_exist"), json!({}), 0),
                item(0.5, 1.0, effect("swipe_forward"), json!({"color": "#FFFFFF", "width": 100}), 0),
            ],
        )?;
        let frames = compile(&document, &row_setup(4), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        assert_eq!(10, frames.len());
        assert!(frames.iter().flatten().all(|pixel| *pixel == Rgb::BLACK));
        Ok(())
    }

    #[test]
    fn test_filter_applies_to_layers_beneath() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            2,
            vec![
                item(0.0, 1.0, effect("solid"), json!({"color": [200, 100, 0]}), 0),
                item(0.5, 1.0, Operation::Filter("dim".into()), json!({"factor": 0.5}), 1),
            ],
        )?;
        let frames = compile(&document, &column_setup(2), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        assert_eq!(vec![Rgb::new(200, 100, 0); 2], frames[4]);
        assert_eq!(vec![Rgb::new(100, 50, 0); 2], frames[5]);
        Ok(())
    }

    #[test]
    fn test_items_past_the_end_are_clipped() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            1,
            vec![
                item(0.8, 5.0, effect("solid"), json!({"color": "#FF0000"}), 0),
                item(9.0, 10.0, effect("solid"), json!({"color": "#FF0000"}), 0),
            ],
        )?;
        let frames = compile(&document, &column_setup(1), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        assert_eq!(10, frames.len());
        assert_eq!(vec![Rgb::BLACK], frames[7]);
        assert_eq!(vec![Rgb::RED], frames[9]);
        Ok(())
    }

    #[test]
    fn test_long_items_only_draw_audible_frames() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            2,
            vec![
                item(0.5, 1e7, effect("solid"), json!({"color": "#FF0000"}), 1),
                item(0.0, 12.8, effect("fade"), json!({"color1": [0, 0, 0], "color2": [128, 0, 0]}), 0),
            ],
        )?;
        let frames = compile(&document, &column_setup(1), &LightshowRegistry::builtin(), 10.0, 1.0)?;

        assert_eq!(10, frames.len());
        // The fade keeps the pace of its full 128 frames.
        assert_eq!(vec![Rgb::new(4, 0, 0)], frames[4]);
        assert_eq!(vec![Rgb::RED], frames[5]);
        assert_eq!(vec![Rgb::RED], frames[9]);
        Ok(())
    }

    #[test]
    fn test_unrepresentable_items_are_an_error() -> Result<(), Box<dyn Error>> {
        let document = Document::new(
            "song.wav".into(),
            1,
            vec![item(0.5, 1e300, effect("solid"), json!({"color": "#FF0000"}), 0)],
        )?;
        assert!(matches!(
            compile(&document, &column_setup(1), &LightshowRegistry::builtin(), 10.0, 1.0),
            Err(CompileError::ItemTooLong { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_place() -> Result<(), CompileError> {
        let at = |start, end| item(start, end, effect("solid"), json!({}), 0);
        assert_eq!(
            Some(Placement {
                start: 5,
                steps: Steps::clipped(20, 5)
            }),
            place(&at(0.5, 2.5), 10.0, 10)?
        );
        assert_eq!(None, place(&at(1.0, 2.0), 10.0, 10)?);
        assert_eq!(None, place(&at(1e18, 1e18 + 1e6), 10.0, 10)?);
        assert_eq!(None, place(&at(0.0, 0.01), 10.0, 10)?);
        Ok(())
    }

    #[test]
    fn test_invalid_rate() -> Result<(), Box<dyn Error>> {
        let document = Document::new("song.wav".into(), 1, Vec::new())?;
        let setup = column_setup(1);
        let registry = LightshowRegistry::builtin();
        assert!(matches!(
            compile(&document, &setup, &registry, 0.0, 1.0),
            Err(CompileError::InvalidFrameRate(_))
        ));
        assert!(matches!(
            compile(&document, &setup, &registry, 30.0, f64::NAN),
            Err(CompileError::InvalidLength(_))
        ));
        Ok(())
    }
}

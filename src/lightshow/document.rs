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
use std::{io, path::PathBuf};

use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("unable to read lightshow {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid lightshow JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("lightshow has no audio file")]
    MissingAudioFile,

    #[error("timeline item {0} must name exactly one of effect and filter")]
    AmbiguousItem(usize),

    #[error("timeline item {index} ends at {end} but starts at {start}")]
    InvalidRange { index: usize, start: f64, end: f64 },

    #[error("timeline item {index} is on layer {layer}, but the show only has {layer_count} layers")]
    InvalidLayer {
        index: usize,
        layer: usize,
        layer_count: usize,
    },
}

/// What a timeline item does over its time range.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Draws frames from the named lightshow effect.
    Effect(String),
    /// Rewrites what has been drawn underneath over the item's range.
    Filter(String),
}

impl Operation {
    pub fn key(&self) -> &str {
        match self {
            Operation::Effect(key) | Operation::Filter(key) => key,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimelineItem {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    pub operation: Operation,
    pub parameters: Map<String, Value>,
    pub layer: usize,
}

/// A validated lightshow timeline.
#[derive(Debug, Clone)]
pub struct Document {
    audio_file: String,
    layer_count: usize,
    items: Vec<TimelineItem>,
}

impl Document {
    /// Validates every item. A single bad item rejects the whole document.
    pub fn new(
        audio_file: String,
        layer_count: usize,
        items: Vec<TimelineItem>,
    ) -> Result<Document, DocumentError> {
        for (index, item) in items.iter().enumerate() {
            // The negated comparison also rejects NaN.
            if !(item.end > item.start)
                || item.start < 0.0
                || !item.start.is_finite()
                || !item.end.is_finite()
            {
                return Err(DocumentError::InvalidRange {
                    index,
                    start: item.start,
                    end: item.end,
                });
            }
            if item.layer >= layer_count {
                return Err(DocumentError::InvalidLayer {
                    index,
                    layer: item.layer,
                    layer_count,
                });
            }
        }

        Ok(Document {
            audio_file,
            layer_count,
            items,
        })
    }

    pub fn audio_file(&self) -> &str {
        &self.audio_file
    }

    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    /// Items in compositing order: by layer, then by start time. Items on the same
    /// layer that start together keep their document order.
    pub fn ordered_items(&self) -> Vec<&TimelineItem> {
        let mut buckets: Vec<Vec<&TimelineItem>> = vec![Vec::new(); self.layer_count];
        for item in &self.items {
            buckets[item.layer].push(item);
        }
        buckets
            .into_iter()
            .flat_map(|mut bucket| {
                bucket.sort_by(|a, b| a.start.total_cmp(&b.start));
                bucket
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn item(start: f64, end: f64, effect: &str, layer: usize) -> TimelineItem {
        TimelineItem {
            start,
            end,
            operation: Operation::Effect(effect.to_string()),
            parameters: Map::new(),
            layer,
        }
    }

    #[test]
    fn test_invalid_items_reject_document() {
        assert!(matches!(
            Document::new("a.wav".into(), 1, vec![item(0.0, 1.0, "a", 0), item(2.0, 2.0, "b", 0)]),
            Err(DocumentError::InvalidRange { index: 1, .. })
        ));
        assert!(matches!(
            Document::new("a.wav".into(), 2, vec![item(0.0, 1.0, "a", 2)]),
            Err(DocumentError::InvalidLayer {
                index: 0,
                layer: 2,
                layer_count: 2
            })
        ));
        assert!(matches!(
            Document::new("a.wav".into(), 1, vec![item(0.0, f64::NAN, "a", 0)]),
            Err(DocumentError::InvalidRange { .. })
        ));
        assert!(matches!(
            Document::new("a.wav".into(), 1, vec![item(0.0, f64::INFINITY, "a", 0)]),
            Err(DocumentError::InvalidRange { index: 0, .. })
        ));
    }

    #[test]
    fn test_ordered_items() -> Result<(), DocumentError> {
        let document = Document::new(
            "a.wav".into(),
            2,
            vec![
                item(3.0, 4.0, "late", 0),
                item(0.0, 1.0, "top", 1),
                item(1.0, 2.0, "early", 0),
                item(1.0, 3.0, "tied", 0),
            ],
        )?;

        let keys: Vec<&str> = document
            .ordered_items()
            .iter()
            .map(|item| item.operation.key())
            .collect();
        assert_eq!(vec!["early", "tied", "late", "top"], keys);
        Ok(())
    }
}

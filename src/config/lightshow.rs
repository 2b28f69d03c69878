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
use std::{fs, path::Path};

use serde::Deserialize;

use crate::lightshow::{Document, DocumentError, Operation, TimelineItem};

fn default_layer_count() -> usize {
    1
}

/// Editor metadata stored alongside the timeline.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EditorData {
    #[serde(default = "default_layer_count")]
    layer_count: usize,
}

impl Default for EditorData {
    fn default() -> Self {
        EditorData {
            layer_count: default_layer_count(),
        }
    }
}

/// A single timeline entry as written by the editor. Exactly one of `effect`
/// and `filter` is expected.
#[derive(Deserialize, Debug)]
struct Entry {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    effect: Option<String>,
    filter: Option<String>,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    layer: usize,
}

/// The on-disk lightshow format.
#[derive(Deserialize, Debug)]
pub struct LightshowFile {
    audio_file: Option<String>,
    #[serde(default, rename = "editorData")]
    editor_data: EditorData,
    #[serde(default)]
    timeline: Vec<Entry>,
}

impl LightshowFile {
    pub fn read(path: &Path) -> Result<LightshowFile, DocumentError> {
        let contents = fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        LightshowFile::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<LightshowFile, DocumentError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Converts and validates the file. Any invalid item rejects the whole file.
    pub fn to_document(self) -> Result<Document, DocumentError> {
        let audio_file = self.audio_file.ok_or(DocumentError::MissingAudioFile)?;
        let items = self
            .timeline
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                let operation = match (entry.effect, entry.filter) {
                    (Some(effect), None) => Operation::Effect(effect),
                    (None, Some(filter)) => Operation::Filter(filter),
                    _ => return Err(DocumentError::AmbiguousItem(index)),
                };
                Ok(TimelineItem {
                    start: entry.start,
                    end: entry.end,
                    operation,
                    parameters: entry.parameters,
                    layer: entry.layer,
                })
            })
            .collect::<Result<Vec<TimelineItem>, DocumentError>>()?;

        Document::new(audio_file, self.editor_data.layer_count, items)
    }
}

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
use std::sync::Arc;

use parking_lot::Mutex;

use super::{Sink, SinkError, SinkFrame};

/// Keeps every frame it is sent. Clones share the same recording, so a test can hand
/// one clone to a renderer and inspect the other.
#[derive(Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<SinkFrame>>>,
}

impl RecordingSink {
    pub fn frames(&self) -> Vec<SinkFrame> {
        self.frames.lock().clone()
    }

    pub fn last(&self) -> Option<SinkFrame> {
        self.frames.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    pub fn reset(&self) {
        self.frames.lock().clear();
    }
}

impl Sink for RecordingSink {
    fn send(&self, frame: &SinkFrame) -> Result<(), SinkError> {
        self.frames.lock().push(frame.clone());
        Ok(())
    }
}

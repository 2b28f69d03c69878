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
//! Audio file decoding and analysis. Playback itself happens elsewhere; the
//! engines only need to know how long a track is and what it sounds like.

use std::{io, path::PathBuf};

mod decode;
mod spectrum;

pub use decode::{decode, duration, Pcm};
pub use spectrum::BarAnalyzer;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("unable to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },

    #[error("no audio track found in {0}")]
    NoAudioTrack(PathBuf),

    #[error("sample rate not specified in {0}")]
    UnknownSampleRate(PathBuf),

    #[error("{fps} fps is too high for audio at {sample_rate} Hz")]
    FrameRateTooHigh { fps: f64, sample_rate: u32 },

    #[error("FFT failed: {0}")]
    Fft(String),
}

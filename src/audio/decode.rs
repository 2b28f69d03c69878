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
use std::{fs::File, path::Path, time::Duration};

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::IntoSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::default::{get_codecs, get_probe};
use tracing::debug;

use super::AudioError;

/// Decoded mono audio.
#[derive(Debug, Clone)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Pcm {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

struct Opened {
    format_reader: Box<dyn FormatReader>,
    track_id: u32,
    sample_rate: u32,
    n_frames: Option<u64>,
    decoder: Box<dyn Decoder>,
}

fn open(path: &Path) -> Result<Opened, AudioError> {
    let file = File::open(path).map_err(|source| AudioError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|source| AudioError::Decode {
            path: path.to_path_buf(),
            source,
        })?;
    let format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AudioError::NoAudioTrack(path.to_path_buf()))?;
    let params = &track.codec_params;
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| AudioError::UnknownSampleRate(path.to_path_buf()))?;
    let decoder = get_codecs()
        .make(params, &DecoderOptions::default())
        .map_err(|source| AudioError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Opened {
        track_id: track.id,
        sample_rate,
        n_frames: params.n_frames,
        format_reader,
        decoder,
    })
}

/// Reads the next packet of the track. `None` at the end of the stream.
fn next_packet(opened: &mut Opened) -> Result<Option<Packet>, SymphoniaError> {
    loop {
        match opened.format_reader.next_packet() {
            Ok(packet) if packet.track_id() == opened.track_id => return Ok(Some(packet)),
            Ok(_) => continue,
            Err(SymphoniaError::ResetRequired) => {
                opened.decoder.reset();
                continue;
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        }
    }
}

/// Averages all channels of a planar buffer into `out`.
fn downmix<T>(buffer: &AudioBuffer<T>, out: &mut Vec<f32>)
where
    T: Sample + IntoSample<f32>,
{
    let channels = buffer.spec().channels.count();
    if channels == 0 {
        return;
    }
    let planes = buffer.planes();
    let planes = planes.planes();
    out.extend((0..buffer.frames()).map(|frame| {
        planes
            .iter()
            .map(|plane| -> f32 { plane[frame].into_sample() })
            .sum::<f32>()
            / channels as f32
    }));
}

fn downmix_ref(decoded: AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::F32(buf) => downmix(&buf, out),
        AudioBufferRef::F64(buf) => downmix(&buf, out),
        AudioBufferRef::S8(buf) => downmix(&buf, out),
        AudioBufferRef::S16(buf) => downmix(&buf, out),
        AudioBufferRef::S24(buf) => downmix(&buf, out),
        AudioBufferRef::S32(buf) => downmix(&buf, out),
        AudioBufferRef::U8(buf) => downmix(&buf, out),
        AudioBufferRef::U16(buf) => downmix(&buf, out),
        AudioBufferRef::U24(buf) => downmix(&buf, out),
        AudioBufferRef::U32(buf) => downmix(&buf, out),
    }
}

/// Decodes a whole file (WAV, MP3, FLAC, OGG, ...) into mono samples.
pub fn decode(path: &Path) -> Result<Pcm, AudioError> {
    let mut opened = open(path)?;
    let mut samples = Vec::with_capacity(opened.n_frames.unwrap_or(0) as usize);
    let decode_error = |source| AudioError::Decode {
        path: path.to_path_buf(),
        source,
    };

    while let Some(packet) = next_packet(&mut opened).map_err(decode_error)? {
        match opened.decoder.decode(&packet) {
            Ok(decoded) => downmix_ref(decoded, &mut samples),
            // A corrupt packet is skipped, the rest of the stream is still usable.
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(file = %path.display(), err = e, "Skipping undecodable packet");
            }
            Err(e) => return Err(decode_error(e)),
        }
    }

    debug!(
        file = %path.display(),
        samples = samples.len(),
        sample_rate = opened.sample_rate,
        "Decoded audio"
    );
    Ok(Pcm {
        samples,
        sample_rate: opened.sample_rate,
    })
}

/// The length of an audio file. Uses the container's frame count when it has
/// one and decodes the file otherwise.
pub fn duration(path: &Path) -> Result<Duration, AudioError> {
    let opened = open(path)?;
    match opened.n_frames {
        Some(n_frames) => Ok(Duration::from_secs_f64(
            n_frames as f64 / opened.sample_rate as f64,
        )),
        None => Ok(decode(path)?.duration()),
    }
}

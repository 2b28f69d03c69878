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
use realfft::RealFftPlanner;

use super::{AudioError, Pcm};

/// Lowest band edge in Hz.
const MIN_FREQUENCY: f32 = 20.0;

/// Avoids log(0) for silent bands.
const EPSILON: f32 = 1e-9;

/// Turns audio into per-frame bar heights for a spectrum display.
#[derive(Debug, Clone, Copy)]
pub struct BarAnalyzer {
    pub bar_count: usize,
    /// Weight of the current frame in the exponential smoothing.
    pub smoothing: f32,
    /// Applied after normalization. Higher values leave only the peaks tall.
    pub gamma: f32,
}

impl Default for BarAnalyzer {
    fn default() -> Self {
        BarAnalyzer {
            bar_count: 16,
            smoothing: 0.8,
            gamma: 8.0,
        }
    }
}

impl BarAnalyzer {
    /// Returns one row of `bar_count` heights in 0.0..=1.0 per `1/fps` seconds of
    /// audio. Bands are spaced logarithmically from 20 Hz to Nyquist.
    pub fn analyze(&self, pcm: &Pcm, fps: f64) -> Result<Vec<Vec<f32>>, AudioError> {
        let chunk_size = (pcm.sample_rate as f64 / fps) as usize;
        if chunk_size < 2 {
            return Err(AudioError::FrameRateTooHigh {
                fps,
                sample_rate: pcm.sample_rate,
            });
        }
        if pcm.samples.len() < chunk_size || self.bar_count == 0 {
            return Ok(Vec::new());
        }

        let bands = self.band_of_bins(chunk_size, pcm.sample_rate);
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(chunk_size);

        let intensities = pcm
            .samples
            .par_chunks_exact(chunk_size)
            .map_init(
                || (fft.make_input_vec(), fft.make_output_vec()),
                |(input, spectrum), chunk| -> Result<Vec<f32>, AudioError> {
                    input.copy_from_slice(chunk);
                    fft.process(input, spectrum)
                        .map_err(|e| AudioError::Fft(e.to_string()))?;

                    let mut sums = vec![0.0f32; self.bar_count];
                    for (bin, band) in bands.iter().enumerate() {
                        if let Some(band) = band {
                            sums[*band] += spectrum[bin].norm();
                        }
                    }
                    Ok(sums
                        .into_iter()
                        .map(|sum| 20.0 * (sum + EPSILON).log10())
                        .collect())
                },
            )
            .collect::<Result<Vec<Vec<f32>>, AudioError>>()?;

        Ok(self.shape(intensities))
    }

    /// Maps every FFT bin to the band it falls into, if any.
    fn band_of_bins(&self, chunk_size: usize, sample_rate: u32) -> Vec<Option<usize>> {
        let bin_count = chunk_size / 2 + 1;
        let bin_width = sample_rate as f32 / chunk_size as f32;
        let max_frequency = (bin_count - 1) as f32 * bin_width;
        let min_frequency = MIN_FREQUENCY.max(bin_width);

        let (low, high) = (min_frequency.log10(), max_frequency.log10());
        let edges: Vec<f32> = (0..=self.bar_count)
            .map(|i| 10f32.powf(low + (high - low) * i as f32 / self.bar_count as f32))
            .collect();

        (0..bin_count)
            .map(|bin| {
                let frequency = bin as f32 * bin_width;
                let above = edges.partition_point(|edge| *edge <= frequency);
                (above > 0 && above <= self.bar_count).then(|| above - 1)
            })
            .collect()
    }

    /// Smooths over time, then normalizes across the whole track and applies gamma.
    fn shape(&self, mut frames: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
        let mut previous = match frames.first() {
            Some(first) => first.clone(),
            None => return frames,
        };
        for frame in frames.iter_mut() {
            for (value, prev) in frame.iter_mut().zip(previous.iter()) {
                *value = self.smoothing * *value + (1.0 - self.smoothing) * prev;
            }
            previous.clone_from(frame);
        }

        let (min, max) = frames
            .iter()
            .flatten()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
                (min.min(*value), max.max(*value))
            });
        let span = max - min;

        for value in frames.iter_mut().flatten() {
            *value = if span > 0.0 {
                ((*value - min) / span).powf(self.gamma)
            } else {
                0.0
            };
        }
        frames
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutil::sine_signal;

    fn loudest(frame: &[f32]) -> usize {
        frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or_default()
    }

    #[test]
    fn test_tone_lands_in_its_band() -> Result<(), AudioError> {
        let analyzer = BarAnalyzer::default();
        let low = Pcm {
            samples: sine_signal(&[60.0], 44100, 1.0),
            sample_rate: 44100,
        };
        let high = Pcm {
            samples: sine_signal(&[8000.0], 44100, 1.0),
            sample_rate: 44100,
        };

        let low_frames = analyzer.analyze(&low, 30.0)?;
        let high_frames = analyzer.analyze(&high, 30.0)?;
        assert_eq!(30, low_frames.len());
        assert_eq!(16, low_frames[0].len());
        assert!(loudest(&low_frames[15]) < loudest(&high_frames[15]));
        Ok(())
    }

    #[test]
    fn test_heights_are_normalized() -> Result<(), AudioError> {
        let pcm = Pcm {
            samples: sine_signal(&[440.0, 2000.0], 22050, 0.5),
            sample_rate: 22050,
        };
        let frames = BarAnalyzer::default().analyze(&pcm, 20.0)?;
        let values: Vec<f32> = frames.into_iter().flatten().collect();
        assert!(values.iter().all(|value| (0.0..=1.0).contains(value)));
        assert!(values.iter().any(|value| (*value - 1.0).abs() < 1e-6));
        Ok(())
    }

    #[test]
    fn test_silence_and_short_audio() -> Result<(), AudioError> {
        let analyzer = BarAnalyzer::default();
        let silence = Pcm {
            samples: vec![0.0; 4410],
            sample_rate: 44100,
        };
        let frames = analyzer.analyze(&silence, 10.0)?;
        assert!(frames.iter().flatten().all(|value| *value == 0.0));

        let short = Pcm {
            samples: vec![0.0; 10],
            sample_rate: 44100,
        };
        assert!(analyzer.analyze(&short, 10.0)?.is_empty());

        assert!(matches!(
            analyzer.analyze(&short, 100000.0),
            Err(AudioError::FrameRateTooHigh { .. })
        ));
        Ok(())
    }
}

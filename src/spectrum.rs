//! Spectral Estimator
//!
//! Narrow-band amplitude estimate at each semitone of the grid.
//!
//! Only a fixed handful of frequencies matter, so instead of a full FFT each
//! bin is a single-frequency correlation of the Hann-tapered frame against a
//! precomputed phasor table.

use crate::semitone::{freq, NUM_BINS};
use rustfft::num_complex::Complex;
use std::f64::consts::PI;
use thiserror::Error;

/// Amplitude per semitone bin for one frame.
pub type SpectrumVector = [f32; NUM_BINS];

/// Errors returned by the Spectral Estimator.
#[derive(Debug, Error, PartialEq)]
pub enum SpectrumError {
    /// Frame received was not of the expected size.
    #[error("expected frame of length {expected}, got {got}")]
    InvalidFrameSize {
        /// The expected size of the audio frame.
        expected: usize,
        /// The actual size of the received audio frame.
        got: usize,
    },
}

/// Per-frame semitone amplitude estimator.
pub struct SpectralEstimator {
    frame_size: usize,
    sample_rate: u32,
    window: Vec<f32>,
    /// One table of `e^{-i 2π f j / R}` per measurable bin, lowest bin first.
    phasors: Vec<Vec<Complex<f32>>>,
}

impl SpectralEstimator {
    /// Precompute the taper and phasor tables for frames of `frame_size`
    /// samples at `sample_rate` Hz.
    ///
    /// Bins at or above the Nyquist frequency get no table and always read 0.
    pub fn new(frame_size: usize, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f64 / 2.0;
        let measurable = (0..NUM_BINS).take_while(|&i| freq(i) < nyquist).count();
        if measurable < NUM_BINS {
            log::warn!(
                "{} of {} semitone bins lie above Nyquist ({:.0} Hz) and will read silent",
                NUM_BINS - measurable,
                NUM_BINS,
                nyquist
            );
        }

        let phasors = (0..measurable)
            .map(|i| {
                let cycles_per_sample = freq(i) / sample_rate as f64;
                (0..frame_size)
                    .map(|j| {
                        // keep only the fractional cycle so the phase stays precise
                        let phase = -2.0 * PI * (cycles_per_sample * j as f64).fract();
                        Complex::new(phase.cos() as f32, phase.sin() as f32)
                    })
                    .collect()
            })
            .collect();

        log::debug!(
            "spectral estimator: {} samples at {} Hz, {} measurable bins",
            frame_size,
            sample_rate,
            measurable
        );

        SpectralEstimator {
            frame_size,
            sample_rate,
            window: make_hann_window(frame_size),
            phasors,
        }
    }

    /// Frame length this estimator expects.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Sample rate the phasor tables were built for.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of bins below the Nyquist frequency.
    pub fn measurable_bins(&self) -> usize {
        self.phasors.len()
    }

    /// Estimate the amplitude of every semitone bin in `frame`.
    ///
    /// Pure with respect to the estimator, so one instance can serve many
    /// threads.
    pub fn estimate(&self, frame: &[f32]) -> Result<SpectrumVector, SpectrumError> {
        if frame.len() != self.frame_size {
            return Err(SpectrumError::InvalidFrameSize {
                expected: self.frame_size,
                got: frame.len(),
            });
        }

        let windowed: Vec<f32> = frame
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| s * w)
            .collect();
        let windowed = windowed.as_slice();

        let scale = 1.0 / self.frame_size as f32;
        let mut spectrum = [0.0; NUM_BINS];
        let measured = &mut spectrum[..self.phasors.len()];

        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            measured
                .par_iter_mut()
                .zip(self.phasors.par_iter())
                .for_each(|(amp, table)| *amp = correlate(windowed, table) * scale);
        }

        #[cfg(not(feature = "parallel"))]
        {
            for (amp, table) in measured.iter_mut().zip(&self.phasors) {
                *amp = correlate(windowed, table) * scale;
            }
        }

        Ok(spectrum)
    }
}

/// Magnitude of the correlation between `samples` and one phasor table.
#[inline]
fn correlate(samples: &[f32], table: &[Complex<f32>]) -> f32 {
    let c = samples
        .iter()
        .zip(table)
        .fold(Complex::new(0.0f32, 0.0), |acc, (&s, &p)| acc + p * s);
    (c.re * c.re + c.im * c.im).sqrt()
}

/// Periodic Hann window, `0.5 - 0.5 cos(2π j / S)`.
fn make_hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|j| (0.5 - 0.5 * (2.0 * PI * j as f64 / size as f64).cos()) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(hz: f64, amplitude: f32, len: usize, rate: u32) -> Vec<f32> {
        (0..len)
            .map(|j| amplitude * (2.0 * PI * hz * j as f64 / rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn hann_window_shape() {
        let w = make_hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[2] - 0.5).abs() < 1e-6);
        assert!((w[6] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_frame_length() {
        let est = SpectralEstimator::new(1024, 44_100);
        assert_eq!(
            est.estimate(&[0.0; 512]),
            Err(SpectrumError::InvalidFrameSize {
                expected: 1024,
                got: 512
            })
        );
    }

    #[test]
    fn silence_reads_zero() {
        let est = SpectralEstimator::new(2048, 44_100);
        let spectrum = est.estimate(&vec![0.0; 2048]).unwrap();
        assert!(spectrum.iter().all(|&a| a == 0.0));
    }

    #[test]
    fn bins_above_nyquist_read_zero() {
        // 16 kHz: Nyquist 8 kHz sits between bins 79 and 80
        let est = SpectralEstimator::new(2048, 16_000);
        assert!(est.measurable_bins() < NUM_BINS);
        let noise: Vec<f32> = (0..2048)
            .map(|j| ((j * 7919) % 200) as f32 / 100.0 - 1.0)
            .collect();
        let spectrum = est.estimate(&noise).unwrap();
        assert!(spectrum[est.measurable_bins()..].iter().all(|&a| a == 0.0));
    }

    /// Textbook per-bin correlation in double precision.
    fn direct(frame: &[f32], rate: u32, bins: usize) -> Vec<f64> {
        let n = frame.len();
        (0..bins)
            .map(|i| {
                let (mut re, mut im) = (0.0, 0.0);
                for (j, &s) in frame.iter().enumerate() {
                    let w = 0.5 - 0.5 * (2.0 * PI * j as f64 / n as f64).cos();
                    let arg = -2.0 * PI * freq(i) / rate as f64 * j as f64;
                    re += arg.cos() * s as f64 * w;
                    im += arg.sin() * s as f64 * w;
                }
                (re * re + im * im).sqrt() / n as f64
            })
            .collect()
    }

    fn chord_frame(len: usize, rate: u32) -> Vec<f32> {
        let mut frame = sine(freq(0), 0.3, len, rate);
        for (k, s) in sine(freq(31), 0.2, len, rate).into_iter().enumerate() {
            frame[k] += s;
        }
        frame
    }

    #[test]
    fn matches_direct_correlation() {
        let est = SpectralEstimator::new(4096, 44_100);
        let frame = chord_frame(4096, 44_100);
        let spectrum = est.estimate(&frame).unwrap();
        let reference = direct(&frame, 44_100, NUM_BINS);
        for (i, (&got, &want)) in spectrum.iter().zip(&reference).enumerate() {
            assert!((got as f64 - want).abs() < 1e-4, "bin {i}: {got} vs {want}");
        }
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn parallel_bins_match_direct_correlation_across_threads() {
        use rayon::prelude::*;

        let est = SpectralEstimator::new(2048, 22_050);
        let frames: Vec<Vec<f32>> = (0..8)
            .map(|k| sine(freq(k * 9), 0.5, 2048, 22_050))
            .collect();
        let results: Vec<SpectrumVector> = frames
            .par_iter()
            .map(|f| est.estimate(f).unwrap())
            .collect();

        for (frame, spectrum) in frames.iter().zip(&results) {
            let reference = direct(frame, 22_050, est.measurable_bins());
            for (i, &want) in reference.iter().enumerate() {
                assert!((spectrum[i] as f64 - want).abs() < 1e-4, "bin {i}");
            }
            assert!(spectrum[est.measurable_bins()..].iter().all(|&a| a == 0.0));
        }
    }

    #[test]
    fn sine_amplitude_matches_hann_gain() {
        // amplitude A at an exact bin frequency reads A/2 times the Hann mean (1/2)
        let est = SpectralEstimator::new(8192, 44_100);
        let frame = sine(freq(29), 0.8, 8192, 44_100);
        let spectrum = est.estimate(&frame).unwrap();
        assert!((spectrum[29] - 0.2).abs() < 2e-3, "got {}", spectrum[29]);
    }
}

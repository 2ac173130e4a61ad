//! Pull-based metering math: peak/RMS levels and windowed magnitude
//! spectra. Everything here is computed on demand from a caller-supplied
//! sample window; nothing is cached between calls.

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use serde::Serialize;
use std::f32::consts::PI;
use std::sync::Arc;

/// Readings below this are reported as the floor.
pub const DB_FLOOR: f32 = -100.0;

/// Linear amplitude to decibels, clamped to [`DB_FLOOR`].
#[inline]
pub fn lin_to_db(lin: f32) -> f32 {
    if lin > 1e-10 {
        (20.0 * lin.log10()).max(DB_FLOOR)
    } else {
        DB_FLOOR
    }
}

/// Instantaneous peak and RMS of a sample window, in dB.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Levels {
    pub peak_db: f32,
    pub rms_db: f32,
}

pub fn levels(samples: &[f32]) -> Levels {
    if samples.is_empty() {
        return Levels {
            peak_db: DB_FLOOR,
            rms_db: DB_FLOOR,
        };
    }
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt();
    Levels {
        peak_db: lin_to_db(peak),
        rms_db: lin_to_db(rms),
    }
}

/// Hann-windowed real-FFT magnitude spectrum in dB.
///
/// Owns its plan and scratch buffers so repeated pulls (once per
/// animation frame, typically) don't re-plan or reallocate.
pub struct SpectrumAnalyzer {
    size: usize,
    r2c: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "fft size must be a power of two");
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(size);
        let spectrum = r2c.make_output_vec();
        let scratch = r2c.make_scratch_vec();
        // Hann window.
        let window = (0..size)
            .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / size as f32).cos()))
            .collect();
        Self {
            size,
            r2c,
            window,
            input: vec![0.0; size],
            spectrum,
            scratch,
        }
    }

    /// Number of frequency bins a call to [`magnitude_db`] returns.
    pub fn bins(&self) -> usize {
        self.size / 2 + 1
    }

    /// Compute the magnitude spectrum of `samples` in dB. Windows shorter
    /// than the FFT size are zero-padded; longer ones use the tail (the
    /// newest samples, given an oldest-first window).
    pub fn magnitude_db(&mut self, samples: &[f32]) -> Vec<f32> {
        let take = samples.len().min(self.size);
        let newest = &samples[samples.len() - take..];
        self.input[..take].copy_from_slice(newest);
        self.input[take..].fill(0.0);
        for (s, w) in self.input.iter_mut().zip(&self.window) {
            *s *= w;
        }

        // process_with_scratch only fails on length mismatches, which the
        // buffers above rule out.
        if self
            .r2c
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
            .is_err()
        {
            return vec![DB_FLOOR; self.bins()];
        }

        let norm = 2.0 / self.size as f32;
        self.spectrum
            .iter()
            .map(|c| lin_to_db(c.norm() * norm))
            .collect()
    }
}

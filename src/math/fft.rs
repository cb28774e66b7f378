//! FFT spectral analysis for stride detection.
//!
//! This module provides the power spectrum of a real signal with optional
//! tapering and zero-padding, plus the peak, harmonic and entropy queries the
//! spectral analyzer needs.
//!
//! ## Zero-padding
//!
//! A 4 s window at 100 Hz gives 0.25 Hz bins, too coarse to separate trot
//! from canter bounce. Padding to 1024 points interpolates the spectrum to
//! ~0.1 Hz and the peak is refined further by parabolic interpolation.

use std::f64::consts::PI;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::WindowFunction;

/// Generate window function coefficients.
///
/// Window functions taper the signal at endpoints to reduce spectral leakage
/// from the non-periodic edges of an analysis window.
pub fn generate_window(n: usize, window: WindowFunction) -> Vec<f64> {
    match window {
        WindowFunction::None => vec![1.0; n],
        WindowFunction::Hanning => {
            (0..n)
                .map(|i| {
                    let t = i as f64 / (n - 1).max(1) as f64;
                    0.5 * (1.0 - (2.0 * PI * t).cos())
                })
                .collect()
        }
        WindowFunction::Tukey => {
            let alpha = 0.5; // Taper ratio
            (0..n)
                .map(|i| {
                    let t = i as f64 / (n - 1).max(1) as f64;
                    if t < alpha / 2.0 {
                        0.5 * (1.0 + (2.0 * PI * t / alpha - PI).cos())
                    } else if t > 1.0 - alpha / 2.0 {
                        0.5 * (1.0 + (2.0 * PI * (t - 1.0) / alpha + PI).cos())
                    } else {
                        1.0
                    }
                })
                .collect()
        }
    }
}

/// A located spectral peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    pub bin: usize,
    /// Interpolated frequency (Hz).
    pub frequency: f64,
    pub power: f64,
}

/// One-sided power spectrum of a real signal.
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    /// Power for bins `0..=fft_len/2`.
    pub power: Vec<f64>,
    /// Frequency spacing between bins (Hz).
    pub bin_hz: f64,
}

impl PowerSpectrum {
    #[must_use]
    pub fn frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_hz
    }

    /// Nearest bin for a frequency, clamped to the spectrum.
    #[must_use]
    pub fn bin_of(&self, frequency: f64) -> usize {
        if self.power.is_empty() || self.bin_hz <= 0.0 {
            return 0;
        }
        let bin = (frequency / self.bin_hz).round().max(0.0) as usize;
        bin.min(self.power.len() - 1)
    }

    /// Strongest bin with frequency in `[lo, hi]`, refined by parabolic
    /// interpolation over its neighbours.
    #[must_use]
    pub fn peak_in_band(&self, lo: f64, hi: f64) -> Option<SpectralPeak> {
        let first = self.bin_of(lo).max(1);
        let last = self.bin_of(hi);
        if first > last {
            return None;
        }

        let (bin, &power) = self.power[first..=last]
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, p)| (i + first, p))?;

        if power <= 0.0 {
            return None;
        }

        let mut offset = 0.0;
        if bin > 0 && bin + 1 < self.power.len() {
            let a = self.power[bin - 1];
            let c = self.power[bin + 1];
            let denom = a - 2.0 * power + c;
            if denom.abs() > f64::EPSILON {
                offset = (0.5 * (a - c) / denom).clamp(-0.5, 0.5);
            }
        }

        Some(SpectralPeak {
            bin,
            frequency: (bin as f64 + offset) * self.bin_hz,
            power,
        })
    }

    /// Maximum power within `tolerance` Hz of `frequency`; zero above Nyquist.
    #[must_use]
    pub fn max_power_near(&self, frequency: f64, tolerance: f64) -> f64 {
        if self.power.is_empty() || frequency - tolerance > self.frequency(self.power.len() - 1) {
            return 0.0;
        }
        let first = self.bin_of(frequency - tolerance);
        let last = self.bin_of(frequency + tolerance);
        self.power[first..=last]
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Normalized Shannon entropy of the spectrum over `[lo, hi]`.
    ///
    /// Returns a value in `[0, 1]`; a flat or empty band is maximally
    /// uncertain (1.0).
    #[must_use]
    pub fn entropy(&self, lo: f64, hi: f64) -> f64 {
        let first = self.bin_of(lo).max(1);
        let last = self.bin_of(hi);
        if last <= first {
            return 1.0;
        }
        let band = &self.power[first..=last];
        let total: f64 = band.iter().sum();
        if total <= f64::EPSILON {
            return 1.0;
        }

        let entropy: f64 = band
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| {
                let q = p / total;
                -q * q.ln()
            })
            .sum();

        (entropy / (band.len() as f64).ln()).clamp(0.0, 1.0)
    }
}

struct CachedPlan {
    fft_len: usize,
    signal_len: usize,
    fft: Arc<dyn Fft<f64>>,
    taper: Vec<f64>,
}

/// Power spectrum computation with cached FFT plans and taper coefficients.
///
/// The FFT plan is rebuilt only when the padded length changes; the taper is
/// regenerated whenever the signal length changes. Only the plan itself is
/// kept, not a `FftPlanner`, so the analyzer can move across threads.
pub struct SpectrumPlanner {
    window_function: WindowFunction,
    min_fft_len: usize,
    cached: Option<CachedPlan>,
}

impl std::fmt::Debug for SpectrumPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumPlanner")
            .field("window_function", &self.window_function)
            .field("min_fft_len", &self.min_fft_len)
            .field("cached_fft_len", &self.cached.as_ref().map(|c| c.fft_len))
            .finish()
    }
}

impl SpectrumPlanner {
    pub fn new(min_fft_len: usize, window_function: WindowFunction) -> Self {
        Self {
            window_function,
            min_fft_len,
            cached: None,
        }
    }

    fn plan(&mut self, signal_len: usize) -> &CachedPlan {
        let fft_len = self.min_fft_len.max(signal_len.next_power_of_two());
        let plan = match self.cached.take() {
            Some(cached) if cached.fft_len == fft_len && cached.signal_len == signal_len => cached,
            Some(cached) if cached.fft_len == fft_len => CachedPlan {
                signal_len,
                taper: generate_window(signal_len, self.window_function),
                ..cached
            },
            _ => CachedPlan {
                fft_len,
                signal_len,
                fft: FftPlanner::new().plan_fft_forward(fft_len),
                taper: generate_window(signal_len, self.window_function),
            },
        };
        self.cached.insert(plan)
    }

    /// Compute the one-sided power spectrum of `signal` sampled at
    /// `sample_rate` Hz. The mean is removed before tapering.
    pub fn power_spectrum(&mut self, signal: &[f64], sample_rate: f64) -> PowerSpectrum {
        let n = signal.len();
        if n < 2 || sample_rate <= 0.0 {
            return PowerSpectrum {
                power: Vec::new(),
                bin_hz: 0.0,
            };
        }

        let mean = signal.iter().sum::<f64>() / n as f64;
        let plan = self.plan(n);
        let fft_len = plan.fft_len;

        let mut buffer: Vec<Complex<f64>> = signal
            .iter()
            .zip(plan.taper.iter())
            .map(|(&x, &w)| Complex::new((x - mean) * w, 0.0))
            .collect();
        buffer.resize(fft_len, Complex::new(0.0, 0.0));

        plan.fft.process(&mut buffer);

        let norm = n as f64;
        let power = buffer
            .iter()
            .take(fft_len / 2 + 1)
            .map(|c| c.norm_sqr() / norm)
            .collect();

        PowerSpectrum {
            power,
            bin_hz: sample_rate / fft_len as f64,
        }
    }
}

/// Single-frequency DFT of a mean-removed signal.
///
/// Returns the complex amplitude at `frequency`; its argument is the phase of
/// that component relative to the first sample.
#[must_use]
pub fn phasor_at(signal: &[f64], sample_rate: f64, frequency: f64) -> Complex64 {
    let n = signal.len();
    if n == 0 || sample_rate <= 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    let mean = signal.iter().sum::<f64>() / n as f64;
    let omega = 2.0 * PI * frequency / sample_rate;

    let sum = signal
        .iter()
        .enumerate()
        .fold(Complex64::new(0.0, 0.0), |acc, (i, &x)| {
            acc + Complex64::from_polar(x - mean, -omega * i as f64)
        });

    sum * (2.0 / n as f64)
}

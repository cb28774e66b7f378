//! Mathematical utilities for gait analysis.
//!
//! This module provides:
//! - [`fft`]: power spectra, peaks, harmonics, entropy and phasors
//! - [`stats`]: running statistics and lagged correlation

pub mod fft;
pub mod stats;

pub use fft::{generate_window, phasor_at, PowerSpectrum, SpectralPeak, SpectrumPlanner};
pub use stats::{max_abs_lagged_correlation, rms_about_mean, RunningStats};

//! Sliding-window spectral analysis of the filtered motion stream.
//!
//! This module provides [`SpectralAnalyzer`], which buffers preprocessed
//! samples over a fixed-duration horizon and, once per slide interval,
//! reduces the window to [`SpectralFeatures`].
//!
//! # Example
//!
//! ```
//! use gait_engine::preprocess::{CalibrationQuality, FilteredSample};
//! use gait_engine::{EngineConfig, SpectralAnalyzer};
//!
//! let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
//!
//! let mut windows = Vec::new();
//! for i in 0..600 {
//!     let t = i as f64 * 0.01;
//!     let bounce = (2.0 * std::f64::consts::PI * 2.0 * t).sin();
//!     let sample = FilteredSample {
//!         timestamp: t,
//!         acceleration: [0.0, 0.0, bounce],
//!         vertical: bounce,
//!         lateral: 0.0,
//!         yaw_rate: 0.0,
//!         quality: CalibrationQuality::Calibrated,
//!     };
//!     windows.extend(analyzer.push(sample));
//! }
//!
//! let last = windows.last().unwrap();
//! assert!((last.features.stride_frequency - 2.0).abs() < 0.1);
//! ```

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::math::fft::SpectrumPlanner;
use crate::math::stats::{max_abs_lagged_correlation, mean, rms_about_mean};
use crate::preprocess::FilteredSample;
use crate::types::{FeatureConfidence, SpectralFeatures};

/// Absolute floor on samples for a normal-confidence window.
const MIN_ANALYSIS_SAMPLES: usize = 32;

/// Minimum half-width (Hz) of the search band around each harmonic.
const HARMONIC_TOLERANCE_HZ: f64 = 0.15;

/// Channels of an analyzed window kept for the lead detector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowSignals {
    pub vertical: Vec<f64>,
    pub lateral: Vec<f64>,
    /// Measured sample rate of the window (Hz).
    pub sample_rate: f64,
}

/// One analyzed window.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisWindow {
    pub start_time: f64,
    /// Timestamp of the newest sample in the window.
    pub end_time: f64,
    pub features: SpectralFeatures,
    /// First window emitted after a sensor gap; its features must not be
    /// used for classification.
    pub after_gap: bool,
    /// Mean yaw rate over the window (rad/s).
    pub mean_yaw_rate: f64,
    pub signals: WindowSignals,
}

/// Sliding-window spectral analyzer.
///
/// Maintains a buffer of recent filtered samples, trimming data older than
/// the window horizon, and emits one [`AnalysisWindow`] every slide interval.
/// A timestamp jump longer than the gap threshold clears the buffer; samples
/// with non-increasing timestamps are dropped.
#[derive(Debug)]
pub struct SpectralAnalyzer {
    config: EngineConfig,
    max_points: usize,
    buffer: VecDeque<FilteredSample>,
    next_emit: Option<f64>,
    after_gap: bool,
    gaps: u32,
    planner: SpectrumPlanner,
}

impl SpectralAnalyzer {
    /// Create a new analyzer from the engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        let max_points = config.window_samples() * 2;
        Self {
            max_points,
            buffer: VecDeque::with_capacity(max_points),
            next_emit: None,
            after_gap: false,
            gaps: 0,
            planner: SpectrumPlanner::new(config.fft_size, config.window_function),
            config: config.clone(),
        }
    }

    /// Push one filtered sample; returns a window when a slide boundary is
    /// crossed.
    pub fn push(&mut self, sample: FilteredSample) -> Option<AnalysisWindow> {
        let timestamp = sample.timestamp;
        if let Some(last) = self.buffer.back() {
            if timestamp <= last.timestamp {
                debug!(timestamp, last = last.timestamp, "Dropping non-monotonic sample");
                return None;
            }
            let dt = timestamp - last.timestamp;
            if dt > self.config.gap_threshold_seconds {
                warn!(gap_seconds = dt, at = timestamp, "Sensor gap, discarding window");
                self.buffer.clear();
                self.after_gap = true;
                self.gaps += 1;
                self.next_emit = Some(timestamp + self.config.slide_seconds);
            }
        }

        self.buffer.push_back(sample);
        self.trim_to_horizon();
        self.enforce_max_size();

        let next_emit = *self
            .next_emit
            .get_or_insert(timestamp + self.config.slide_seconds);
        if timestamp < next_emit {
            return None;
        }

        let mut following = next_emit + self.config.slide_seconds;
        if following <= timestamp {
            following = timestamp + self.config.slide_seconds;
        }
        self.next_emit = Some(following);

        let mut window = self.analyze();
        window.after_gap = std::mem::take(&mut self.after_gap);
        Some(window)
    }

    /// Trim samples older than the window horizon.
    fn trim_to_horizon(&mut self) {
        let Some(newest) = self.buffer.back().map(|s| s.timestamp) else {
            return;
        };
        let cutoff = newest - self.config.window_seconds;
        while self.buffer.front().is_some_and(|s| s.timestamp < cutoff) {
            self.buffer.pop_front();
        }
    }

    fn enforce_max_size(&mut self) {
        while self.buffer.len() > self.max_points {
            self.buffer.pop_front();
        }
    }

    /// Reduce the current buffer to features.
    fn analyze(&mut self) -> AnalysisWindow {
        let start_time = self.buffer.front().map_or(0.0, |s| s.timestamp);
        let end_time = self.buffer.back().map_or(0.0, |s| s.timestamp);

        let calibrated: Vec<&FilteredSample> = self
            .buffer
            .iter()
            .filter(|s| s.quality.is_calibrated())
            .collect();

        let vertical: Vec<f64> = calibrated.iter().map(|s| s.vertical).collect();
        let lateral: Vec<f64> = calibrated.iter().map(|s| s.lateral).collect();
        let yaw: Vec<f64> = calibrated.iter().map(|s| s.yaw_rate).collect();

        let span = match (calibrated.first(), calibrated.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        };
        let sample_rate = if span > 0.0 {
            (calibrated.len() - 1) as f64 / span
        } else {
            self.config.sample_rate_hz
        };

        let calibrated_count = calibrated.len();
        let enough = calibrated_count >= MIN_ANALYSIS_SAMPLES
            && span >= self.config.min_window_fill * self.config.window_seconds;

        let features = if enough {
            self.compute_features(&vertical, &yaw, sample_rate)
        } else {
            SpectralFeatures {
                vertical_rms: rms_about_mean(&vertical),
                ..SpectralFeatures::low_confidence(calibrated_count)
            }
        };

        AnalysisWindow {
            start_time,
            end_time,
            features,
            after_gap: false,
            mean_yaw_rate: mean(&yaw),
            signals: WindowSignals {
                vertical,
                lateral,
                sample_rate,
            },
        }
    }

    fn compute_features(&mut self, vertical: &[f64], yaw: &[f64], sample_rate: f64) -> SpectralFeatures {
        let spectrum = self.planner.power_spectrum(vertical, sample_rate);
        let vertical_rms = rms_about_mean(vertical);
        let spectral_entropy =
            spectrum.entropy(self.config.min_stride_hz, self.config.entropy_band_max_hz);

        let Some(peak) = spectrum.peak_in_band(self.config.min_stride_hz, self.config.max_stride_hz)
        else {
            return SpectralFeatures {
                spectral_entropy,
                vertical_rms,
                sample_count: vertical.len(),
                confidence: FeatureConfidence::Normal,
                ..SpectralFeatures::default()
            };
        };

        let stride = peak.frequency;
        let tolerance = HARMONIC_TOLERANCE_HZ.max(2.0 * spectrum.bin_hz);
        let harmonic_ratio_2 = spectrum.max_power_near(2.0 * stride, tolerance) / peak.power;
        let harmonic_ratio_3 = spectrum.max_power_near(3.0 * stride, tolerance) / peak.power;

        // Yaw and vertical bounce can lead or lag by up to half a stride.
        let max_lag = (sample_rate / (2.0 * stride.max(self.config.min_stride_hz))).round() as usize;
        let vertical_yaw_coherence = max_abs_lagged_correlation(vertical, yaw, max_lag);

        SpectralFeatures {
            stride_frequency: stride,
            spectral_entropy,
            harmonic_ratio_2,
            harmonic_ratio_3,
            vertical_yaw_coherence,
            vertical_rms,
            sample_count: vertical.len(),
            confidence: FeatureConfidence::Normal,
        }
    }

    /// Number of sensor gaps seen.
    #[must_use]
    pub const fn gaps(&self) -> u32 {
        self.gaps
    }

    /// Current number of samples in the buffer.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Time span covered by the buffer.
    #[must_use]
    pub fn time_span(&self) -> f64 {
        match (self.buffer.front(), self.buffer.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    /// Reset the analyzer state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.next_emit = None;
        self.after_gap = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::CalibrationQuality;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn bounce(t: f64, freq: f64, h2: f64, h3: f64) -> f64 {
        let w = 2.0 * PI * freq * t;
        w.sin() + h2 * (2.0 * w).sin() + h3 * (3.0 * w).sin()
    }

    fn sample(t: f64, vertical: f64, yaw: f64) -> FilteredSample {
        FilteredSample {
            timestamp: t,
            acceleration: [0.0, 0.0, vertical],
            vertical,
            lateral: 0.0,
            yaw_rate: yaw,
            quality: CalibrationQuality::Calibrated,
        }
    }

    fn run(analyzer: &mut SpectralAnalyzer, seconds: f64, f: impl Fn(f64) -> FilteredSample) -> Vec<AnalysisWindow> {
        let n = (seconds * 100.0) as usize;
        (0..n).filter_map(|i| analyzer.push(f(i as f64 * 0.01))).collect()
    }

    #[test]
    fn test_emits_once_per_slide() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        let windows = run(&mut analyzer, 10.0, |t| sample(t, bounce(t, 2.0, 0.0, 0.0), 0.0));
        assert_eq!(windows.len(), 9);
        for pair in windows.windows(2) {
            assert_relative_eq!(pair[1].end_time - pair[0].end_time, 1.0, epsilon = 0.011);
        }
        assert!(analyzer.time_span() <= 4.0 + 1e-9);
    }

    #[test]
    fn test_low_confidence_until_filled() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        let windows = run(&mut analyzer, 6.0, |t| sample(t, bounce(t, 2.0, 0.0, 0.0), 0.0));
        assert!(windows[0].features.is_low_confidence());
        assert!(windows[1].features.is_low_confidence());
        assert!(!windows.last().unwrap().features.is_low_confidence());
    }

    #[test]
    fn test_trot_signature() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        let windows = run(&mut analyzer, 8.0, |t| sample(t, bounce(t, 2.2, 0.8, 0.0), 0.0));
        let f = windows.last().unwrap().features;

        assert_relative_eq!(f.stride_frequency, 2.2, epsilon = 0.05);
        assert_relative_eq!(f.harmonic_ratio_2, 0.64, epsilon = 0.08);
        assert!(f.harmonic_ratio_3 < 0.05);
        assert_eq!(f.vertical_yaw_coherence, 0.0);
        assert!(f.spectral_entropy < 0.7);
    }

    #[test]
    fn test_canter_signature_with_yaw() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        let windows = run(&mut analyzer, 8.0, |t| {
            let yaw = 0.4 * (2.0 * PI * 1.8 * t - 0.5).sin();
            sample(t, bounce(t, 1.8, 0.0, 0.7), yaw)
        });
        let f = windows.last().unwrap().features;

        assert_relative_eq!(f.stride_frequency, 1.8, epsilon = 0.05);
        assert_relative_eq!(f.harmonic_ratio_3, 0.49, epsilon = 0.08);
        assert!(f.harmonic_ratio_2 < 0.05);
        assert!(f.vertical_yaw_coherence > 0.6);
    }

    #[test]
    fn test_gap_clears_buffer_and_flags_window() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        run(&mut analyzer, 6.0, |t| sample(t, bounce(t, 2.0, 0.0, 0.0), 0.0));

        let resumed: Vec<AnalysisWindow> = (0..300)
            .filter_map(|i| {
                let t = 9.0 + i as f64 * 0.01;
                analyzer.push(sample(t, bounce(t, 2.0, 0.0, 0.0), 0.0))
            })
            .collect();

        assert_eq!(analyzer.gaps(), 1);
        assert!(resumed[0].after_gap);
        assert!(resumed[0].features.is_low_confidence());
        assert!(resumed[1..].iter().all(|w| !w.after_gap));
    }

    #[test]
    fn test_non_monotonic_samples_dropped() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        analyzer.push(sample(1.0, 0.0, 0.0));
        analyzer.push(sample(1.01, 0.0, 0.0));
        analyzer.push(sample(1.005, 0.0, 0.0));
        assert_eq!(analyzer.n_samples(), 2);
    }

    #[test]
    fn test_uncalibrated_samples_excluded() {
        let mut analyzer = SpectralAnalyzer::new(&EngineConfig::default());
        let windows = run(&mut analyzer, 6.0, |t| FilteredSample {
            quality: CalibrationQuality::Uncalibrated,
            ..sample(t, bounce(t, 2.0, 0.0, 0.0), 0.0)
        });
        assert!(windows.iter().all(|w| w.features.is_low_confidence()));
        assert_eq!(windows.last().unwrap().features.sample_count, 0);
    }
}

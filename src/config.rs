//! Configuration for the gait engine.
//!
//! This module provides [`EngineConfig`], which centralizes the tunable
//! parameters of the analysis pipeline, and the closed table of
//! [`MountPosition`] calibrations selected once at ride start.
//!
//! # Example
//!
//! ```
//! use gait_engine::{EngineConfig, MountPosition};
//!
//! // Use default configuration
//! let config = EngineConfig::default();
//! assert!(config.validate().is_ok());
//!
//! // Shorter slide interval for live display
//! let live = EngineConfig::responsive().with_window_seconds(3.0);
//!
//! let mount = MountPosition::ThighPocket.calibration();
//! assert!(mount.ema_alpha < MountPosition::ChestPocket.calibration().ema_alpha);
//! ```

use crate::error::{GaitError, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for the gait analysis pipeline.
///
/// # Latency vs compute
///
/// - `window_seconds`: spectral resolution; longer windows resolve stride
///   frequency better but react slower.
/// - `slide_seconds`: how often a window is analyzed and classified. Halving
///   it doubles FFT work and halves classification latency.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    // Sampling
    /// Nominal accelerometer rate (Hz). The analyzer measures the real rate
    /// from timestamps; this only sizes buffers.
    pub sample_rate_hz: f64,

    // Windowing
    /// Analysis window duration in seconds.
    pub window_seconds: f64,

    /// Interval between consecutive analyses in seconds.
    pub slide_seconds: f64,

    /// Fraction of the window duration that calibrated samples must span
    /// before features are considered reliable.
    pub min_window_fill: f64,

    /// Minimum FFT length; windows are zero-padded up to this size.
    pub fft_size: usize,

    /// Taper applied before the FFT.
    pub window_function: WindowFunction,

    // Spectral band
    /// Lowest frequency considered a stride (Hz).
    pub min_stride_hz: f64,

    /// Highest frequency considered a stride (Hz).
    pub max_stride_hz: f64,

    /// Upper edge of the band used for spectral entropy (Hz).
    pub entropy_band_max_hz: f64,

    // Data quality
    /// Timestamp jump (s) treated as a sensor gap.
    pub gap_threshold_seconds: f64,

    /// Maximum age (s) of a held GPS fix.
    pub gps_max_age_seconds: f64,

    /// Vertical RMS (m/s²) below which a window is stationary.
    pub stationary_rms: f64,

    // Classification
    /// Default probability of staying in the current gait per window.
    pub self_transition_probability: f64,

    /// Learned centers are ignored until a horse has this many rides.
    pub min_learned_rides: u32,

    // Lead
    /// Confidence at or above which a lead is reported as known.
    pub lead_confidence_threshold: f64,

    /// Number of sub-windows used to measure lead phase consistency.
    pub lead_sub_windows: usize,

    /// Mean yaw rate (rad/s) above which a segment has a rein.
    pub rein_yaw_threshold: f64,

    /// General numerical epsilon.
    pub numerical_eps: f64,
}

/// Taper applied to each analysis window before the FFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WindowFunction {
    /// No windowing (rectangular window).
    None,
    /// Hann window - good general-purpose choice for stride peaks.
    #[default]
    Hanning,
    /// Tukey window with alpha=0.5 - tapers only the endpoints.
    Tukey,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100.0,

            window_seconds: 4.0,
            slide_seconds: 1.0,
            min_window_fill: 0.75,
            fft_size: 1024,
            window_function: WindowFunction::Hanning,

            min_stride_hz: 0.5,
            max_stride_hz: 4.0,
            entropy_band_max_hz: 12.0,

            gap_threshold_seconds: 0.5,
            gps_max_age_seconds: 2.0,
            stationary_rms: 0.25,

            self_transition_probability: 0.85,
            min_learned_rides: 3,

            lead_confidence_threshold: 0.7,
            lead_sub_windows: 4,
            rein_yaw_threshold: 0.1,

            numerical_eps: 1e-9,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz <= 0.0 {
            return Err(GaitError::invalid_config("sample_rate_hz must be positive"));
        }
        if self.window_seconds <= 0.0 {
            return Err(GaitError::invalid_config("window_seconds must be positive"));
        }
        if self.slide_seconds <= 0.0 || self.slide_seconds > self.window_seconds {
            return Err(GaitError::invalid_config(
                "slide_seconds must be in (0, window_seconds]",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_window_fill) || self.min_window_fill == 0.0 {
            return Err(GaitError::invalid_config("min_window_fill must be in (0, 1]"));
        }
        if self.fft_size < 16 || !self.fft_size.is_power_of_two() {
            return Err(GaitError::invalid_config(
                "fft_size must be a power of two >= 16",
            ));
        }
        if self.min_stride_hz <= 0.0 || self.max_stride_hz <= self.min_stride_hz {
            return Err(GaitError::invalid_config(
                "stride band must satisfy 0 < min_stride_hz < max_stride_hz",
            ));
        }
        if self.max_stride_hz * 2.0 > self.sample_rate_hz {
            return Err(GaitError::invalid_config(
                "max_stride_hz must be below the Nyquist frequency",
            ));
        }
        if self.gap_threshold_seconds <= 0.0 {
            return Err(GaitError::invalid_config(
                "gap_threshold_seconds must be positive",
            ));
        }
        if !(0.5..1.0).contains(&self.self_transition_probability) {
            return Err(GaitError::invalid_config(
                "self_transition_probability must be in [0.5, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.lead_confidence_threshold) {
            return Err(GaitError::invalid_config(
                "lead_confidence_threshold must be in [0, 1]",
            ));
        }
        if self.lead_sub_windows < 2 {
            return Err(GaitError::invalid_config("lead_sub_windows must be at least 2"));
        }
        Ok(())
    }

    /// Preset for live display: faster slide, same window.
    #[must_use]
    pub fn responsive() -> Self {
        Self {
            slide_seconds: 0.5,
            ..Self::default()
        }
    }

    /// Preset for battery-constrained devices: fewer, cheaper analyses.
    #[must_use]
    pub fn low_power() -> Self {
        Self {
            slide_seconds: 2.0,
            fft_size: 512,
            ..Self::default()
        }
    }

    /// Number of samples in a full window at the nominal rate.
    #[must_use]
    pub fn window_samples(&self) -> usize {
        (self.window_seconds * self.sample_rate_hz).round() as usize
    }

    /// Set the analysis window duration.
    #[must_use]
    pub const fn with_window_seconds(mut self, seconds: f64) -> Self {
        self.window_seconds = seconds;
        self
    }

    /// Set the slide interval.
    #[must_use]
    pub const fn with_slide_seconds(mut self, seconds: f64) -> Self {
        self.slide_seconds = seconds;
        self
    }

    /// Set the default self-transition probability.
    #[must_use]
    pub const fn with_self_transition(mut self, probability: f64) -> Self {
        self.self_transition_probability = probability;
        self
    }

    /// Set the FFT taper.
    #[must_use]
    pub const fn with_window_function(mut self, window: WindowFunction) -> Self {
        self.window_function = window;
        self
    }

    /// Set the nominal sample rate.
    #[must_use]
    pub const fn with_sample_rate(mut self, hz: f64) -> Self {
        self.sample_rate_hz = hz;
        self
    }
}

/// Where the phone is carried during the ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MountPosition {
    /// Rider's thigh pocket; strong leg motion, needs heavier smoothing.
    #[default]
    ThighPocket,
    /// Chest or jacket pocket; follows the rider's torso.
    ChestPocket,
    /// Upper-arm band.
    Armband,
}

/// Preprocessing constants for one mount position.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MountCalibration {
    /// Samples averaged to establish the gravity baseline.
    pub settle_samples: usize,
    /// EMA coefficient; lower smooths more.
    pub ema_alpha: f64,
    /// Baseline drift (radians) that triggers recalibration.
    pub drift_tolerance: f64,
}

const MOUNT_CALIBRATIONS: [MountCalibration; 3] = [
    // ThighPocket
    MountCalibration {
        settle_samples: 200,
        ema_alpha: 0.3,
        drift_tolerance: 0.35,
    },
    // ChestPocket
    MountCalibration {
        settle_samples: 150,
        ema_alpha: 0.5,
        drift_tolerance: 0.25,
    },
    // Armband
    MountCalibration {
        settle_samples: 150,
        ema_alpha: 0.4,
        drift_tolerance: 0.3,
    },
];

impl MountPosition {
    pub const ALL: [Self; 3] = [Self::ThighPocket, Self::ChestPocket, Self::Armband];

    /// Look up the calibration constants for this mount.
    #[must_use]
    pub const fn calibration(self) -> MountCalibration {
        MOUNT_CALIBRATIONS[self as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window_samples(), 400);
        assert_eq!(config.self_transition_probability, 0.85);
    }

    #[test]
    fn test_presets_validate() {
        assert!(EngineConfig::responsive().validate().is_ok());
        assert!(EngineConfig::low_power().validate().is_ok());
        assert_eq!(EngineConfig::responsive().slide_seconds, 0.5);
        assert_eq!(EngineConfig::low_power().fft_size, 512);
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();

        config.slide_seconds = 5.0;
        assert!(config.validate().is_err());

        config.slide_seconds = 1.0;
        config.fft_size = 1000;
        assert!(config.validate().is_err());

        config.fft_size = 1024;
        config.self_transition_probability = 1.0;
        assert!(config.validate().is_err());

        config.self_transition_probability = 0.85;
        config.max_stride_hz = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let config = EngineConfig::default()
            .with_window_seconds(6.0)
            .with_slide_seconds(0.5)
            .with_self_transition(0.9);
        assert_eq!(config.window_seconds, 6.0);
        assert_eq!(config.slide_seconds, 0.5);
        assert_eq!(config.self_transition_probability, 0.9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_mount_table() {
        let thigh = MountPosition::ThighPocket.calibration();
        let chest = MountPosition::ChestPocket.calibration();
        assert!(thigh.ema_alpha < chest.ema_alpha);
        assert!(thigh.settle_samples >= chest.settle_samples);
        for mount in MountPosition::ALL {
            let cal = mount.calibration();
            assert!(cal.ema_alpha > 0.0 && cal.ema_alpha <= 1.0);
            assert!(cal.drift_tolerance > 0.0);
        }
    }
}

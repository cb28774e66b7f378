//! Motion preprocessing: gravity baseline, smoothing and drift tracking.
//!
//! The phone sits in a pocket at an arbitrary orientation. A gravity baseline
//! averaged over the mount's settle window defines "up"; every later sample
//! is smoothed with the mount's EMA and projected onto that frame to produce
//! the vertical, lateral and yaw channels the analyzer consumes.
//!
//! A slow gravity tracker keeps running after the baseline is fixed. When the
//! angle between the two exceeds the mount's drift tolerance (the phone has
//! rotated in the pocket), the baseline is discarded and re-established over
//! the next settle window instead of feeding skewed axes downstream.

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::config::MountCalibration;
use crate::types::MotionSample;

/// EMA coefficient of the slow gravity tracker used for drift detection.
const DRIFT_TRACKER_ALPHA: f64 = 0.01;

/// Standard gravity (m/s²), used before a baseline exists.
const STANDARD_GRAVITY: f64 = 9.806_65;

/// Calibration state attached to every filtered sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationQuality {
    /// Initial baseline not yet established; sample is unfiltered.
    Uncalibrated,
    /// Baseline was discarded after drift and is being re-established.
    Recalibrating,
    Calibrated,
}

impl CalibrationQuality {
    #[must_use]
    pub const fn is_calibrated(self) -> bool {
        matches!(self, Self::Calibrated)
    }
}

/// One preprocessed sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredSample {
    pub timestamp: f64,
    /// Smoothed acceleration with gravity removed, device frame (m/s²).
    pub acceleration: [f64; 3],
    /// Component along the baseline "up" axis (m/s²).
    pub vertical: f64,
    /// Horizontal component along the device's lateral axis (m/s²).
    pub lateral: f64,
    /// Rotation rate about the vertical axis (rad/s); zero without a gyro.
    pub yaw_rate: f64,
    pub quality: CalibrationQuality,
}

#[derive(Debug, Clone, Copy)]
struct Baseline {
    gravity: Vector3<f64>,
    up: Vector3<f64>,
    lateral: Vector3<f64>,
}

impl Baseline {
    fn from_gravity(gravity: Vector3<f64>) -> Option<Self> {
        let up = gravity.try_normalize(1e-6)?;
        let lateral = [Vector3::x(), Vector3::y()]
            .into_iter()
            .find_map(|axis| (axis - up * axis.dot(&up)).try_normalize(1e-3))?;
        Some(Self {
            gravity,
            up,
            lateral,
        })
    }
}

/// Per-sample filter and baseline tracker for one ride.
#[derive(Debug, Clone)]
pub struct MotionPreprocessor {
    mount: MountCalibration,
    settle_sum: Vector3<f64>,
    settle_count: usize,
    baseline: Option<Baseline>,
    smoothed: Option<Vector3<f64>>,
    smoothed_rotation: Vector3<f64>,
    drift_tracker: Vector3<f64>,
    recalibrating: bool,
    recalibrations: u32,
}

impl MotionPreprocessor {
    pub fn new(mount: MountCalibration) -> Self {
        Self {
            mount,
            settle_sum: Vector3::zeros(),
            settle_count: 0,
            baseline: None,
            smoothed: None,
            smoothed_rotation: Vector3::zeros(),
            drift_tracker: Vector3::zeros(),
            recalibrating: false,
            recalibrations: 0,
        }
    }

    /// Filter one sample.
    pub fn process(&mut self, sample: &MotionSample) -> FilteredSample {
        let accel = Vector3::from(sample.acceleration);
        let rotation = sample.rotation_rate.map(Vector3::from);

        let Some(baseline) = self.baseline else {
            return self.settle(sample.timestamp, accel);
        };

        let alpha = self.mount.ema_alpha;
        let smoothed = match self.smoothed {
            Some(prev) => accel * alpha + prev * (1.0 - alpha),
            None => accel,
        };
        self.smoothed = Some(smoothed);
        if let Some(rotation) = rotation {
            self.smoothed_rotation = rotation * alpha + self.smoothed_rotation * (1.0 - alpha);
        }

        self.drift_tracker =
            accel * DRIFT_TRACKER_ALPHA + self.drift_tracker * (1.0 - DRIFT_TRACKER_ALPHA);
        let drift = self.drift_tracker.angle(&baseline.gravity);
        if drift > self.mount.drift_tolerance {
            info!(
                drift_rad = drift,
                tolerance = self.mount.drift_tolerance,
                "Orientation drift exceeded tolerance, recalibrating"
            );
            self.request_recalibration();
            return self.settle(sample.timestamp, accel);
        }

        let linear = smoothed - baseline.gravity;
        FilteredSample {
            timestamp: sample.timestamp,
            acceleration: linear.into(),
            vertical: linear.dot(&baseline.up),
            lateral: linear.dot(&baseline.lateral),
            yaw_rate: if rotation.is_some() {
                self.smoothed_rotation.dot(&baseline.up)
            } else {
                0.0
            },
            quality: CalibrationQuality::Calibrated,
        }
    }

    /// Accumulate a settle sample and pass it through unfiltered.
    fn settle(&mut self, timestamp: f64, accel: Vector3<f64>) -> FilteredSample {
        self.settle_sum += accel;
        self.settle_count += 1;

        let quality = if self.recalibrating {
            CalibrationQuality::Recalibrating
        } else {
            CalibrationQuality::Uncalibrated
        };

        if self.settle_count >= self.mount.settle_samples.max(1) {
            let gravity = self.settle_sum / self.settle_count as f64;
            if let Some(baseline) = Baseline::from_gravity(gravity) {
                debug!(
                    gravity = gravity.norm(),
                    samples = self.settle_count,
                    "Gravity baseline established"
                );
                self.baseline = Some(baseline);
                self.drift_tracker = gravity;
                self.smoothed = None;
                self.recalibrating = false;
            }
            self.settle_sum = Vector3::zeros();
            self.settle_count = 0;
        }

        FilteredSample {
            timestamp,
            acceleration: accel.into(),
            vertical: accel.norm() - STANDARD_GRAVITY,
            lateral: 0.0,
            yaw_rate: 0.0,
            quality,
        }
    }

    fn request_recalibration(&mut self) {
        self.baseline = None;
        self.smoothed = None;
        self.settle_sum = Vector3::zeros();
        self.settle_count = 0;
        self.recalibrating = true;
        self.recalibrations += 1;
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Number of drift-triggered recalibrations so far.
    #[must_use]
    pub const fn recalibrations(&self) -> u32 {
        self.recalibrations
    }

    /// Baseline gravity estimate, if established.
    #[must_use]
    pub fn gravity(&self) -> Option<[f64; 3]> {
        self.baseline.map(|b| b.gravity.into())
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.mount);
    }
}

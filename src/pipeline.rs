//! Single-ride gait engine.
//!
//! [`GaitEngine`] wires the stages together for one ride:
//!
//! ```text
//! MotionSample -> MotionPreprocessor -> SpectralAnalyzer -> GaitClassifier
//!                                                      \-> LeadDetector
//!                                                           -> Segmenter -> GaitSegment
//! ```
//!
//! Processing never fails: bad samples are dropped, gaps are held, and
//! missing GPS falls back to spectral-only decisions.
//!
//! # Example
//!
//! ```
//! use gait_engine::{Breed, EngineConfig, GaitEngine, HorseProfile, MotionSample, MountPosition};
//!
//! let horse = HorseProfile::new("bella", Breed::Warmblood);
//! let mut engine = GaitEngine::new(EngineConfig::default(), MountPosition::ChestPocket, horse)?;
//!
//! for i in 0..1_000 {
//!     let t = i as f64 * 0.01;
//!     let bounce = (2.0 * std::f64::consts::PI * 1.2 * t).sin();
//!     engine.process(&MotionSample::new(t, [0.0, 0.0, 9.81 + bounce]));
//! }
//!
//! let outcome = engine.finish()?;
//! assert_eq!(outcome.summary.samples, 1_000);
//! # Ok::<(), gait_engine::GaitError>(())
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::calibration::{CalibrationUpdate, MIN_OBSERVATION_WINDOWS};
use crate::classifier::{Classification, GaitClassifier};
use crate::config::{EngineConfig, MountPosition};
use crate::error::{GaitError, Result};
use crate::horse::{EffectiveBounds, HorseProfile};
use crate::lead::LeadDetector;
use crate::preprocess::MotionPreprocessor;
use crate::segmenter::{Segmenter, WindowObservation};
use crate::spectral::{AnalysisWindow, SpectralAnalyzer};
use crate::types::{Gait, GaitSegment, GpsFix, MotionSample};

/// Holds the latest GPS fix until it goes stale.
#[derive(Debug, Clone, Copy, Default)]
struct GpsTracker {
    latest: Option<(f64, GpsFix)>,
    max_age: f64,
}

impl GpsTracker {
    fn new(max_age: f64) -> Self {
        Self {
            latest: None,
            max_age,
        }
    }

    fn update(&mut self, timestamp: f64, fix: GpsFix) {
        if fix.is_valid() {
            self.latest = Some((timestamp, fix));
        }
    }

    fn current(&self, now: f64) -> Option<GpsFix> {
        self.latest
            .filter(|(at, _)| now - at <= self.max_age)
            .map(|(_, fix)| fix)
    }
}

/// Time and distance spent in one gait over a ride.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GaitTotals {
    pub segments: usize,
    pub duration: f64,
    pub distance: f64,
}

/// Ride-level counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RideSummary {
    pub horse_id: String,
    pub start_time: f64,
    pub end_time: f64,
    pub samples: u64,
    pub dropped_samples: u64,
    pub windows: u64,
    pub sensor_gaps: u32,
    pub recalibrations: u32,
    pub totals: BTreeMap<Gait, GaitTotals>,
}

impl RideSummary {
    #[must_use]
    pub fn total_distance(&self) -> f64 {
        self.totals.values().map(|t| t.distance).sum()
    }

    fn record(&mut self, segment: &GaitSegment) {
        let totals = self.totals.entry(segment.gait).or_default();
        totals.segments += 1;
        totals.duration += segment.duration();
        totals.distance += segment.distance;
    }
}

/// Result of finishing a ride.
#[derive(Debug, Clone, PartialEq)]
pub struct RideOutcome {
    /// Segment flushed at ride end.
    pub final_segment: Option<GaitSegment>,
    pub summary: RideSummary,
    pub calibration: CalibrationUpdate,
}

/// Gait engine for one ride.
#[derive(Debug)]
pub struct GaitEngine {
    profile: HorseProfile,
    preprocessor: MotionPreprocessor,
    analyzer: SpectralAnalyzer,
    classifier: GaitClassifier,
    lead: LeadDetector,
    segmenter: Segmenter,
    gps: GpsTracker,
    last_timestamp: Option<f64>,
    last_classification: Option<Classification>,
    summary: RideSummary,
}

impl GaitEngine {
    /// Build an engine for one ride.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration or the horse's tuning is invalid.
    pub fn new(config: EngineConfig, mount: MountPosition, profile: HorseProfile) -> Result<Self> {
        config.validate()?;
        profile.tuning.validate()?;

        let bounds = EffectiveBounds::compose(&profile, config.min_learned_rides);
        info!(
            horse = %profile.id,
            breed = ?profile.breed,
            mount = ?mount,
            learned = profile.learned.is_some(),
            "Gait engine started"
        );

        Ok(Self {
            preprocessor: MotionPreprocessor::new(mount.calibration()),
            analyzer: SpectralAnalyzer::new(&config),
            classifier: GaitClassifier::new(bounds, &profile.tuning, &config),
            lead: LeadDetector::new(&config),
            segmenter: Segmenter::new(bounds, &config),
            gps: GpsTracker::new(config.gps_max_age_seconds),
            last_timestamp: None,
            last_classification: None,
            summary: RideSummary {
                horse_id: profile.id.clone(),
                ..RideSummary::default()
            },
            profile,
        })
    }

    /// Feed one sample; returns a segment when a transition closes one.
    pub fn process(&mut self, sample: &MotionSample) -> Option<GaitSegment> {
        let t = sample.timestamp;
        if !sample.is_finite() {
            debug!(timestamp = t, "Dropping non-finite sample");
            self.summary.dropped_samples += 1;
            return None;
        }
        if self.last_timestamp.is_some_and(|last| t <= last) {
            debug!(timestamp = t, "Dropping out-of-order sample");
            self.summary.dropped_samples += 1;
            return None;
        }
        if self.last_timestamp.is_none() {
            self.summary.start_time = t;
            self.segmenter.begin(t);
        }
        self.last_timestamp = Some(t);
        self.summary.samples += 1;

        if let Some(fix) = sample.gps {
            self.gps.update(t, fix);
        }

        let filtered = self.preprocessor.process(sample);
        let window = self.analyzer.push(filtered)?;
        self.on_window(&window)
    }

    fn on_window(&mut self, window: &AnalysisWindow) -> Option<GaitSegment> {
        self.summary.windows += 1;
        let gps = self.gps.current(window.end_time);

        let classification = if window.after_gap {
            self.classifier.hold()
        } else {
            self.classifier.classify(&window.features, gps)
        };
        if classification.changed {
            info!(
                to = %classification.gait,
                at = window.end_time,
                evidence = classification.evidence,
                "Gait changed"
            );
        }

        let lead = (classification.gait.has_lead() && !window.features.is_low_confidence())
            .then(|| self.lead.detect(&window.signals, window.features.stride_frequency));
        let gps_speed = gps
            .filter(|fix| fix.quality().is_trustworthy())
            .map(|fix| fix.speed);

        self.last_classification = Some(classification);
        let closed = self.segmenter.observe(WindowObservation {
            window,
            classification: &classification,
            lead,
            gps_speed,
        });
        if let Some(segment) = &closed {
            self.summary.record(segment);
        }
        closed
    }

    /// Flush the open segment and produce the ride outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::NoData`] if no sample was ever processed.
    pub fn finish(mut self) -> Result<RideOutcome> {
        let end = self.last_timestamp.ok_or(GaitError::NoData)?;

        let final_segment = self.segmenter.finish(end);
        if let Some(segment) = &final_segment {
            self.summary.record(segment);
        }
        self.summary.end_time = end;
        self.summary.sensor_gaps = self.analyzer.gaps();
        self.summary.recalibrations = self.preprocessor.recalibrations();

        let calibration = CalibrationUpdate {
            horse_id: self.profile.id.clone(),
            breed: self.profile.breed,
            ride_time: end,
            observations: self.segmenter.observations(MIN_OBSERVATION_WINDOWS),
        };

        info!(
            horse = %self.profile.id,
            duration_s = end - self.summary.start_time,
            distance_m = self.summary.total_distance(),
            windows = self.summary.windows,
            "Ride finished"
        );

        Ok(RideOutcome {
            final_segment,
            summary: self.summary,
            calibration,
        })
    }

    /// Label of the open segment.
    #[must_use]
    pub fn current_gait(&self) -> Option<Gait> {
        self.segmenter.current_gait()
    }

    /// Latest classification, if any window has been analyzed.
    #[must_use]
    pub const fn last_classification(&self) -> Option<&Classification> {
        self.last_classification.as_ref()
    }

    #[must_use]
    pub const fn profile(&self) -> &HorseProfile {
        &self.profile
    }

    #[must_use]
    pub const fn bounds(&self) -> &EffectiveBounds {
        self.classifier.bounds()
    }
}

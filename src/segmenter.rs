//! Turns the per-window gait stream into contiguous segments.
//!
//! The first segment opens at ride start. Every later segment opens exactly
//! where the previous one closed, so closed segments tile the ride with no
//! gaps or overlaps. Sensor gaps never force a boundary; the held label simply
//! continues.

use std::collections::BTreeMap;

use tracing::debug;

use crate::calibration::GaitObservation;
use crate::classifier::Classification;
use crate::config::EngineConfig;
use crate::horse::EffectiveBounds;
use crate::lead::{LeadDetector, LeadEstimate};
use crate::spectral::AnalysisWindow;
use crate::types::{Gait, GaitSegment, Lead, Rein, SpectralFeatures};

/// Everything the segmenter needs about one analyzed window.
#[derive(Debug, Clone, Copy)]
pub struct WindowObservation<'a> {
    pub window: &'a AnalysisWindow,
    pub classification: &'a Classification,
    pub lead: Option<LeadEstimate>,
    /// Ground speed from a trustworthy, fresh GPS fix.
    pub gps_speed: Option<f64>,
}

#[derive(Debug, Clone)]
struct OpenSegment {
    gait: Gait,
    start_time: f64,
    distance: f64,
    rhythm_score: f64,
    lead_directions: Vec<f64>,
    yaw_sum: f64,
    windows: usize,
    snapshot: Option<SpectralFeatures>,
}

impl OpenSegment {
    fn new(gait: Gait, start_time: f64) -> Self {
        Self {
            gait,
            start_time,
            distance: 0.0,
            rhythm_score: 0.0,
            lead_directions: Vec::new(),
            yaw_sum: 0.0,
            windows: 0,
            snapshot: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct GaitAccumulator {
    windows: usize,
    frequency: f64,
    harmonic_2: f64,
    harmonic_3: f64,
}

/// Segment builder for one ride.
#[derive(Debug, Clone)]
pub struct Segmenter {
    bounds: EffectiveBounds,
    lead: LeadDetector,
    rein_threshold: f64,
    ride_start: Option<f64>,
    last_time: f64,
    /// Meters per second over the last accounted interval.
    last_rate: f64,
    open: Option<OpenSegment>,
    summaries: BTreeMap<Gait, GaitAccumulator>,
}

impl Segmenter {
    pub fn new(bounds: EffectiveBounds, config: &EngineConfig) -> Self {
        Self {
            bounds,
            lead: LeadDetector::new(config),
            rein_threshold: config.rein_yaw_threshold,
            ride_start: None,
            last_time: 0.0,
            last_rate: 0.0,
            open: None,
            summaries: BTreeMap::new(),
        }
    }

    /// Mark the ride start; later calls are ignored.
    pub fn begin(&mut self, timestamp: f64) {
        if self.ride_start.is_none() {
            self.ride_start = Some(timestamp);
            self.last_time = timestamp;
        }
    }

    /// Account for one window; returns the segment it closed, if any.
    pub fn observe(&mut self, obs: WindowObservation<'_>) -> Option<GaitSegment> {
        let window = obs.window;
        let features = &window.features;
        let gait = obs.classification.gait;
        self.begin(window.start_time);

        let interval = (window.end_time - self.last_time).max(0.0);
        let current = self.open.as_ref().map_or(gait, |o| o.gait);
        self.last_rate = self.rate(current, features, obs.gps_speed);
        self.last_time = window.end_time;

        let ride_start = self.ride_start.unwrap_or(window.start_time);
        let open = self
            .open
            .get_or_insert_with(|| OpenSegment::new(gait, ride_start));
        open.distance += self.last_rate * interval;

        let closed = if open.gait == gait {
            None
        } else {
            let next = OpenSegment::new(gait, window.end_time);
            let previous = std::mem::replace(open, next);
            Some(self.close(previous, window.end_time))
        };

        let Some(open) = self.open.as_mut() else {
            return closed;
        };
        open.windows += 1;
        open.rhythm_score = obs.classification.rhythm_score;
        open.yaw_sum += window.mean_yaw_rate;
        if !features.is_low_confidence() && !window.after_gap {
            open.snapshot = Some(*features);
            let acc = self.summaries.entry(gait).or_default();
            acc.windows += 1;
            acc.frequency += features.stride_frequency;
            acc.harmonic_2 += features.harmonic_ratio_2;
            acc.harmonic_3 += features.harmonic_ratio_3;
        }
        if gait.has_lead() {
            if let Some(estimate) = obs.lead {
                open.lead_directions.push(estimate.direction);
            }
        }
        closed
    }

    /// Close the ride at `end_time`.
    ///
    /// A ride that never produced a window still yields one stationary
    /// segment covering its span. A segment opened by a transition on the
    /// very last sample has no extent and is discarded; the segment closed
    /// by that transition already ends at `end_time`.
    pub fn finish(&mut self, end_time: f64) -> Option<GaitSegment> {
        let start = self.ride_start?;
        match self.open.take() {
            Some(open) if end_time <= open.start_time => {
                debug!(gait = %open.gait, at = end_time, "Discarding empty trailing segment");
                None
            }
            Some(mut open) => {
                let tail = (end_time - self.last_time).max(0.0);
                open.distance += self.last_rate * tail;
                self.last_time = end_time.max(self.last_time);
                Some(self.close(open, end_time.max(self.last_time)))
            }
            None if end_time > start => {
                let open = OpenSegment::new(Gait::Stationary, start);
                Some(self.close(open, end_time))
            }
            None => None,
        }
    }

    /// Meters per second over one interval.
    fn rate(&self, gait: Gait, features: &SpectralFeatures, gps_speed: Option<f64>) -> f64 {
        if let Some(speed) = gps_speed {
            return speed;
        }
        if gait == Gait::Stationary || features.is_low_confidence() {
            return 0.0;
        }
        self.bounds.stride_length(features.vertical_rms) * features.stride_frequency
    }

    fn close(&self, open: OpenSegment, end_time: f64) -> GaitSegment {
        let duration = end_time - open.start_time;
        let lead = if open.gait.has_lead() {
            self.lead.aggregate(&open.lead_directions)
        } else {
            LeadEstimate::default()
        };
        let mean_yaw = if open.windows > 0 {
            open.yaw_sum / open.windows as f64
        } else {
            0.0
        };

        let segment = GaitSegment {
            gait: open.gait,
            start_time: open.start_time,
            end_time,
            distance: open.distance,
            average_speed: if duration > 0.0 {
                open.distance / duration
            } else {
                0.0
            },
            rhythm_score: if open.gait == Gait::Stationary {
                0.0
            } else {
                open.rhythm_score
            },
            lead: if open.gait.has_lead() { lead.lead } else { Lead::Unknown },
            lead_confidence: lead.confidence,
            rein: Rein::from_yaw_rate(mean_yaw, self.rein_threshold),
            window_count: open.windows,
            spectral_snapshot: open.snapshot,
        };
        debug!(
            gait = %segment.gait,
            start = segment.start_time,
            end = segment.end_time,
            distance_m = segment.distance,
            "Segment closed"
        );
        segment
    }

    /// Gait of the open segment.
    #[must_use]
    pub fn current_gait(&self) -> Option<Gait> {
        self.open.as_ref().map(|o| o.gait)
    }

    /// Per-gait averages over confident windows, for gaits seen in at least
    /// `min_windows` windows.
    #[must_use]
    pub fn observations(&self, min_windows: usize) -> Vec<GaitObservation> {
        self.summaries
            .iter()
            .filter(|(gait, acc)| **gait != Gait::Stationary && acc.windows >= min_windows.max(1))
            .map(|(gait, acc)| {
                let n = acc.windows as f64;
                GaitObservation {
                    gait: *gait,
                    stride_frequency: acc.frequency / n,
                    harmonic_ratio_2: acc.harmonic_2 / n,
                    harmonic_ratio_3: acc.harmonic_3 / n,
                    windows: acc.windows,
                }
            })
            .collect()
    }
}

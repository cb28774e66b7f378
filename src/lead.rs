//! Canter/gallop lead estimation and rein cross-checks.
//!
//! The leading foreleg shows up as a consistent phase offset between the
//! lateral sway and the vertical bounce at the stride frequency. The window
//! is split into sub-windows; each yields one phase difference. Confidence is
//! how consistently the sub-windows agree, scaled by how far the mean offset
//! sits from the symmetric (0 or π) case.
//!
//! A lateral channel leading the vertical by a quarter stride reads as a left
//! lead; lagging reads as a right lead.

use num_complex::Complex64;

use crate::config::EngineConfig;
use crate::math::fft::phasor_at;
use crate::spectral::WindowSignals;
use crate::types::{GaitSegment, Lead, Rein, ReinSegment};

/// Lead estimate for one window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LeadEstimate {
    /// Gated lead.
    pub lead: Lead,
    /// Confidence in 0..=1.
    pub confidence: f64,
    /// Confidence signed positive for left, negative for right.
    pub direction: f64,
}

/// Report a lead only when the confidence reaches the threshold.
#[must_use]
pub fn gate_lead(direction: f64, confidence: f64, threshold: f64) -> Lead {
    if confidence < threshold || direction == 0.0 {
        Lead::Unknown
    } else if direction > 0.0 {
        Lead::Left
    } else {
        Lead::Right
    }
}

/// Whether a lead suits the rein; `None` when the lead is unknown.
///
/// A mismatch is a counter-canter or cross-canter, which riders may do on
/// purpose; callers treat `Some(false)` as a coaching signal.
#[must_use]
pub const fn is_correct_lead(lead: Lead, rein: Rein) -> Option<bool> {
    match (lead, rein) {
        (Lead::Unknown, _) => None,
        (Lead::Left, Rein::Left) | (Lead::Right, Rein::Right) => Some(true),
        (Lead::Left, Rein::Right) | (Lead::Right, Rein::Left) => Some(false),
    }
}

/// Check a segment's lead against externally tracked rein segments.
///
/// Uses the rein segment with the largest time overlap.
#[must_use]
pub fn lead_correctness(segment: &GaitSegment, reins: &[ReinSegment]) -> Option<bool> {
    if !segment.gait.has_lead() {
        return None;
    }
    let overlap = |r: &ReinSegment| {
        (segment.end_time.min(r.end_time) - segment.start_time.max(r.start_time)).max(0.0)
    };
    let rein = reins
        .iter()
        .filter(|r| overlap(r) > 0.0)
        .max_by(|a, b| overlap(a).total_cmp(&overlap(b)))?;
    is_correct_lead(segment.lead, rein.rein)
}

/// Phase-based lead detector.
#[derive(Debug, Clone)]
pub struct LeadDetector {
    sub_windows: usize,
    threshold: f64,
}

impl LeadDetector {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            sub_windows: config.lead_sub_windows,
            threshold: config.lead_confidence_threshold,
        }
    }

    /// Estimate the lead of one window at the given stride frequency.
    #[must_use]
    pub fn detect(&self, signals: &WindowSignals, stride_frequency: f64) -> LeadEstimate {
        let n = signals.vertical.len().min(signals.lateral.len());
        if stride_frequency <= 0.0 || signals.sample_rate <= 0.0 || n == 0 {
            return LeadEstimate::default();
        }

        // Each sub-window must hold at least one full stride.
        let stride_samples = (signals.sample_rate / stride_frequency).ceil() as usize;
        let chunks = self.sub_windows.min(n / stride_samples.max(1));
        if chunks < 2 {
            return LeadEstimate::default();
        }
        let len = n / chunks;

        let mut unit_sum = Complex64::new(0.0, 0.0);
        let mut used = 0usize;
        for k in 0..chunks {
            let range = k * len..(k + 1) * len;
            let vertical = phasor_at(&signals.vertical[range.clone()], signals.sample_rate, stride_frequency);
            let lateral = phasor_at(&signals.lateral[range], signals.sample_rate, stride_frequency);
            if vertical.norm() < 1e-9 || lateral.norm() < 1e-9 {
                continue;
            }
            let delta = lateral.arg() - vertical.arg();
            unit_sum += Complex64::from_polar(1.0, delta);
            used += 1;
        }
        if used < 2 {
            return LeadEstimate::default();
        }

        let mean = unit_sum / used as f64;
        let asymmetry = mean.arg().sin();
        let confidence = (mean.norm() * asymmetry.abs()).clamp(0.0, 1.0);
        let direction = confidence.copysign(asymmetry);

        LeadEstimate {
            lead: gate_lead(direction, confidence, self.threshold),
            confidence,
            direction,
        }
    }

    /// Combine per-window directions into one segment estimate.
    #[must_use]
    pub fn aggregate(&self, directions: &[f64]) -> LeadEstimate {
        if directions.is_empty() {
            return LeadEstimate::default();
        }
        let direction = directions.iter().sum::<f64>() / directions.len() as f64;
        let confidence = direction.abs().min(1.0);
        LeadEstimate {
            lead: gate_lead(direction, confidence, self.threshold),
            confidence,
            direction,
        }
    }
}

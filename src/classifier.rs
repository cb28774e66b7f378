//! Per-window gait decision.
//!
//! [`GaitClassifier`] scores each moving gait from the window's spectral
//! features, fuses the spectral label with a GPS speed prior, and passes the
//! fused candidate through a sticky state machine so that a single ambiguous
//! window cannot flip the label.
//!
//! # Fusion policy
//!
//! | Spectral vs GPS | GPS trustworthy | Result |
//! |-----------------|-----------------|--------|
//! | agree | any | agreed label, full evidence |
//! | disagree | no | spectral |
//! | both ≤ trot | yes | GPS |
//! | both ≥ trot | yes | spectral |
//! | straddle trot | yes | trot |
//!
//! For a fixed spectral label the fused label never decreases as speed rises.

use tracing::debug;

use crate::config::EngineConfig;
use crate::horse::{EffectiveBounds, GaitTuning};
use crate::math::stats::RunningStats;
use crate::types::{Gait, GpsFix, SpectralFeatures};

/// Speed distance (m/s) from a boundary at which GPS evidence saturates.
const GPS_EVIDENCE_SPAN: f64 = 0.5;

/// Effect of transition responsiveness on the self-transition probability.
const RESPONSIVENESS_SCALE: f64 = 0.1;

/// Rhythm score weights for frequency variation and harmonic spread.
const RHYTHM_FREQUENCY_WEIGHT: f64 = 4.0;
const RHYTHM_HARMONIC_WEIGHT: f64 = 2.0;

/// Outcome of classifying one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    /// State after this window.
    pub gait: Gait,
    /// True when `gait` differs from the state before this window.
    pub changed: bool,
    /// Fused candidate before smoothing.
    pub candidate: Gait,
    /// Support for the candidate over the current state, 0..=1.
    pub evidence: f64,
    /// Speed prior, when GPS was trustworthy.
    pub speed_prior: Option<Gait>,
    /// Stride regularity of the current run, 0..=100.
    pub rhythm_score: f64,
}

/// Spectral likelihood of each gait, indexed by [`Gait::index`].
///
/// Stationary scores zero; it is decided by the vertical RMS floor instead.
#[must_use]
pub fn spectral_scores(features: &SpectralFeatures, bounds: &EffectiveBounds) -> [f64; 5] {
    let h2 = features.harmonic_ratio_2.clamp(0.0, 1.0);
    let h3 = features.harmonic_ratio_3.clamp(0.0, 1.0);
    let coherence = features.vertical_yaw_coherence.clamp(0.0, 1.0);
    let entropy = features.spectral_entropy.clamp(0.0, 1.0);

    let mut scores = [0.0; 5];
    for gait in Gait::MOVING {
        let Some(range) = bounds.frequency_range(gait) else {
            continue;
        };
        let z = (features.stride_frequency - range.center()) / range.half_width().max(1e-3);
        let frequency_match = (-0.5 * z * z).exp();
        let shape = match gait {
            Gait::Walk => (1.0 - 0.3 * h2.max(h3)) * (1.0 - 0.3 * coherence),
            Gait::Trot => (0.4 + 0.6 * h2) * (1.0 - 0.5 * h3),
            Gait::Canter => (0.4 + 0.6 * h3) * (0.6 + 0.4 * coherence) * (1.0 - 0.5 * h2),
            Gait::Gallop => (0.5 + 0.5 * entropy) * (0.6 + 0.4 * coherence),
            Gait::Stationary => 0.0,
        };
        scores[gait.index()] = frequency_match * shape;
    }
    scores
}

/// Combine the spectral label with an optional trustworthy speed prior.
#[must_use]
pub fn fuse_labels(spectral: Gait, speed_prior: Option<Gait>) -> Gait {
    match speed_prior {
        None => spectral,
        Some(gps) if gps == spectral => spectral,
        Some(gps) if gps <= Gait::Trot && spectral <= Gait::Trot => gps,
        Some(gps) if gps >= Gait::Trot && spectral >= Gait::Trot => spectral,
        Some(_) => Gait::Trot,
    }
}

/// How far `speed` sits inside the speed range of `gait`, 0..=1.
fn speed_depth(bounds: &EffectiveBounds, gait: Gait, speed: f64) -> f64 {
    let (low, high) = bounds.speed.range(gait);
    let mut distance = f64::INFINITY;
    if gait != Gait::Stationary {
        distance = distance.min(speed - low);
    }
    if high.is_finite() {
        distance = distance.min(high - speed);
    }
    if distance.is_infinite() {
        return 1.0;
    }
    (distance / GPS_EVIDENCE_SPAN).clamp(0.0, 1.0)
}

/// Sticky gait state machine for one ride.
#[derive(Debug, Clone)]
pub struct GaitClassifier {
    bounds: EffectiveBounds,
    stationary_rms: f64,
    eps: f64,
    stay_probability: f64,
    canter_sensitivity: f64,
    state: Option<Gait>,
    frequency: RunningStats,
    harmonic_2: RunningStats,
    harmonic_3: RunningStats,
}

impl GaitClassifier {
    pub fn new(bounds: EffectiveBounds, tuning: &GaitTuning, config: &EngineConfig) -> Self {
        let tuning = tuning.active();
        let stay_probability = (config.self_transition_probability
            - RESPONSIVENESS_SCALE * tuning.transition_responsiveness)
            .clamp(0.6, 0.97);
        Self {
            bounds,
            stationary_rms: config.stationary_rms,
            eps: config.numerical_eps,
            stay_probability,
            canter_sensitivity: tuning.canter_sensitivity,
            state: None,
            frequency: RunningStats::new(),
            harmonic_2: RunningStats::new(),
            harmonic_3: RunningStats::new(),
        }
    }

    /// Classify one window given the GPS fix current at its end, if any.
    pub fn classify(&mut self, features: &SpectralFeatures, gps: Option<GpsFix>) -> Classification {
        let speed = gps
            .filter(|fix| fix.quality().is_trustworthy())
            .map(|fix| fix.speed);
        let speed_prior = speed.map(|s| self.bounds.speed.gait_for_speed(s));

        let (candidate, evidence) = match (features.is_low_confidence(), speed, speed_prior) {
            (true, Some(s), Some(prior)) => (prior, speed_depth(&self.bounds, prior, s)),
            (true, _, _) => {
                let held = self.state.unwrap_or(Gait::Stationary);
                (held, 0.0)
            }
            (false, _, _) => self.fused_candidate(features, speed, speed_prior),
        };

        let previous = self.state;
        let gait = match previous {
            None => candidate,
            Some(current) if candidate != current && evidence > self.switch_threshold(candidate) => {
                debug!(
                    from = %current,
                    to = %candidate,
                    evidence,
                    "Gait transition accepted"
                );
                candidate
            }
            Some(current) => current,
        };
        self.state = Some(gait);

        let changed = previous.is_some_and(|p| p != gait);
        if changed {
            self.reset_rhythm();
        }
        if !features.is_low_confidence() {
            self.frequency.push(features.stride_frequency);
            self.harmonic_2.push(features.harmonic_ratio_2);
            self.harmonic_3.push(features.harmonic_ratio_3);
        }

        Classification {
            gait,
            changed,
            candidate,
            evidence,
            speed_prior,
            rhythm_score: self.rhythm_score(),
        }
    }

    /// Keep the current state for a window that must not be classified.
    pub fn hold(&mut self) -> Classification {
        let gait = *self.state.get_or_insert(Gait::Stationary);
        Classification {
            gait,
            changed: false,
            candidate: gait,
            evidence: 0.0,
            speed_prior: None,
            rhythm_score: self.rhythm_score(),
        }
    }

    fn fused_candidate(
        &self,
        features: &SpectralFeatures,
        speed: Option<f64>,
        speed_prior: Option<Gait>,
    ) -> (Gait, f64) {
        let scores = spectral_scores(features, &self.bounds);
        let spectral = if features.vertical_rms < self.stationary_rms {
            Gait::Stationary
        } else {
            Gait::MOVING
                .into_iter()
                .max_by(|a, b| scores[a.index()].total_cmp(&scores[b.index()]))
                .unwrap_or(Gait::Stationary)
        };

        let fused = fuse_labels(spectral, speed_prior);
        let evidence = match (speed, speed_prior) {
            (_, Some(prior)) if prior == spectral => 1.0,
            (Some(s), Some(prior)) if fused == prior => speed_depth(&self.bounds, prior, s),
            (Some(s), Some(prior)) if fused != spectral => {
                0.5 * (speed_depth(&self.bounds, prior, s) + self.margin(&scores, fused))
            }
            _ if spectral == Gait::Stationary => 1.0,
            _ => self.margin(&scores, fused),
        };
        (fused, evidence)
    }

    /// Relative spectral advantage of `candidate` over the current state.
    fn margin(&self, scores: &[f64; 5], candidate: Gait) -> f64 {
        let Some(current) = self.state else {
            return 1.0;
        };
        let a = scores[candidate.index()];
        let b = scores[current.index()];
        ((a - b) / (a + b).max(self.eps)).max(0.0)
    }

    fn switch_threshold(&self, candidate: Gait) -> f64 {
        let base = 1.0 - self.stay_probability;
        if candidate == Gait::Canter {
            base * self.canter_sensitivity
        } else {
            base
        }
    }

    fn rhythm_score(&self) -> f64 {
        if self.state == Some(Gait::Stationary) || self.frequency.count() == 0 {
            return 0.0;
        }
        let cv = self.frequency.std_dev() / self.frequency.mean().abs().max(self.eps);
        let spread = self.harmonic_2.std_dev() + self.harmonic_3.std_dev();
        100.0 * (-(RHYTHM_FREQUENCY_WEIGHT * cv + RHYTHM_HARMONIC_WEIGHT * spread)).exp()
    }

    fn reset_rhythm(&mut self) {
        self.frequency.reset();
        self.harmonic_2.reset();
        self.harmonic_3.reset();
    }

    /// Current state, if any window has been classified.
    #[must_use]
    pub const fn state(&self) -> Option<Gait> {
        self.state
    }

    /// Probability of staying in the current state after tuning.
    #[must_use]
    pub const fn stay_probability(&self) -> f64 {
        self.stay_probability
    }

    #[must_use]
    pub const fn bounds(&self) -> &EffectiveBounds {
        &self.bounds
    }
}

//! Per-horse learned parameters, updated after each ride.
//!
//! Each gait's center frequency and harmonic means follow an EMA whose
//! coefficient shrinks with the number of rides that observed the gait:
//!
//! ```text
//! alpha(n) = max(0.05, 0.5 / (1 + 0.25 n))
//! ```
//!
//! so the first few rides move the model quickly and later rides only refine
//! it. The first observation of a gait blends with the breed prior center
//! instead of replacing it.

use std::collections::HashMap;

use tracing::{info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::horse::{Breed, GaitTuning, HorseProfile, LearnedGait, LearnedGaitParameters};
use crate::types::Gait;

/// Confident windows a gait needs in one ride to count as observed.
pub const MIN_OBSERVATION_WINDOWS: usize = 5;

const ALPHA_INITIAL: f64 = 0.5;
const ALPHA_DECAY: f64 = 0.25;
const ALPHA_FLOOR: f64 = 0.05;

/// EMA coefficient after `observations` prior updates.
#[must_use]
pub fn learning_rate(observations: u32) -> f64 {
    (ALPHA_INITIAL / (1.0 + ALPHA_DECAY * f64::from(observations))).max(ALPHA_FLOOR)
}

/// Mean features of one gait over one ride.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaitObservation {
    pub gait: Gait,
    pub stride_frequency: f64,
    pub harmonic_ratio_2: f64,
    pub harmonic_ratio_3: f64,
    pub windows: usize,
}

/// Calibration feedback emitted when a ride finishes.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationUpdate {
    pub horse_id: String,
    pub breed: Breed,
    /// Timestamp of the ride end (s).
    pub ride_time: f64,
    pub observations: Vec<GaitObservation>,
}

/// Persistent state of one horse.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HorseRecord {
    pub breed: Breed,
    pub tuning: GaitTuning,
    pub learned: LearnedGaitParameters,
}

/// In-memory store of per-horse calibration.
///
/// One record per horse; updates never touch other horses.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CalibrationStore {
    records: HashMap<String, HorseRecord>,
}

impl CalibrationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one ride into the horse's learned parameters.
    pub fn apply(&mut self, update: &CalibrationUpdate) -> &LearnedGaitParameters {
        let record = self
            .records
            .entry(update.horse_id.clone())
            .or_insert_with(|| HorseRecord {
                breed: update.breed,
                ..HorseRecord::default()
            });
        record.breed = update.breed;

        if !record.learned.is_consistent() {
            warn!(horse = %update.horse_id, "Learned parameters inconsistent, starting over");
            record.learned = LearnedGaitParameters::default();
        }

        let priors = update.breed.priors();
        let learned = &mut record.learned;
        for obs in &update.observations {
            if obs.windows < MIN_OBSERVATION_WINDOWS || !obs.stride_frequency.is_finite() {
                continue;
            }
            let Some(prior) = priors.frequency_range(obs.gait) else {
                continue;
            };
            let entry = learned.gaits.entry(obs.gait).or_insert(LearnedGait {
                center_frequency: prior.center(),
                harmonic_ratio_2: obs.harmonic_ratio_2,
                harmonic_ratio_3: obs.harmonic_ratio_3,
                observations: 0,
            });
            let alpha = learning_rate(entry.observations);
            entry.center_frequency += alpha * (obs.stride_frequency - entry.center_frequency);
            entry.harmonic_ratio_2 += alpha * (obs.harmonic_ratio_2 - entry.harmonic_ratio_2);
            entry.harmonic_ratio_3 += alpha * (obs.harmonic_ratio_3 - entry.harmonic_ratio_3);
            entry.observations += 1;
        }
        learned.ride_count += 1;
        learned.last_updated = update.ride_time;

        info!(
            horse = %update.horse_id,
            rides = learned.ride_count,
            gaits = update.observations.len(),
            "Calibration updated"
        );
        learned
    }

    /// Profile for the next ride of a horse.
    ///
    /// Unknown horses get a cold-start profile for `breed`.
    #[must_use]
    pub fn profile_for(&self, horse_id: &str, breed: Breed) -> HorseProfile {
        let mut profile = HorseProfile::new(horse_id, breed);
        if let Some(record) = self.records.get(horse_id) {
            profile.tuning = record.tuning;
            if record.learned.ride_count > 0 {
                profile.learned = Some(record.learned.clone());
            }
        }
        profile
    }

    /// Replace a horse's tuning.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GaitError::InvalidTuning`] if any delta is out of range.
    pub fn set_tuning(&mut self, horse_id: &str, breed: Breed, tuning: GaitTuning) -> Result<()> {
        tuning.validate()?;
        let record = self.records.entry(horse_id.to_string()).or_default();
        record.breed = breed;
        record.tuning = tuning;
        Ok(())
    }

    /// Clear learned parameters and tuning for one horse.
    pub fn reset(&mut self, horse_id: &str) {
        if self.records.remove(horse_id).is_some() {
            info!(horse = horse_id, "Calibration reset");
        }
    }

    #[must_use]
    pub fn record(&self, horse_id: &str) -> Option<&HorseRecord> {
        self.records.get(horse_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(feature = "serde")]
impl CalibrationStore {
    /// Serialize the store as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GaitError::Snapshot`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GaitError::Snapshot`] on malformed input.
    pub fn try_from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a JSON snapshot, treating anything unreadable as cold start.
    #[must_use]
    pub fn from_json_or_cold_start(json: &str) -> Self {
        Self::try_from_json(json).unwrap_or_else(|e| {
            warn!(error = %e, "Calibration snapshot unreadable, starting cold");
            Self::default()
        })
    }
}

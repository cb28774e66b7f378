//! Per-horse classification model: breed priors, user tuning, learned
//! parameters, and the effective bounds they compose into for one ride.
//!
//! The three layers combine in a fixed order:
//!
//! 1. [`BiomechanicalPriors`] from the breed table give the cold-start model.
//! 2. [`GaitTuning`] shifts frequency ranges and speed boundaries when the
//!    user has enabled customization.
//! 3. [`LearnedGaitParameters`] nudge frequency centers toward what this horse
//!    has actually shown, once enough rides have been recorded.

use std::collections::BTreeMap;
use std::str::FromStr;

use tracing::warn;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{GaitError, Result};
use crate::types::Gait;

/// Minimum separation (m/s) kept between adjacent speed boundaries.
const MIN_BOUNDARY_GAP: f64 = 0.2;

/// Fraction of the prior speed boundary moved per unit of speed sensitivity.
const SPEED_SENSITIVITY_SCALE: f64 = 0.2;

/// Accepted heights (m at withers); anything else falls back to the breed's.
const PLAUSIBLE_HEIGHT: std::ops::RangeInclusive<f64> = 0.8..=2.2;

/// Closed frequency interval in Hz.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrequencyRange {
    pub low: f64,
    pub high: f64,
}

impl FrequencyRange {
    #[must_use]
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    #[must_use]
    pub fn center(&self) -> f64 {
        0.5 * (self.low + self.high)
    }

    #[must_use]
    pub fn half_width(&self) -> f64 {
        0.5 * (self.high - self.low)
    }

    #[must_use]
    pub fn contains(&self, frequency: f64) -> bool {
        (self.low..=self.high).contains(&frequency)
    }

    #[must_use]
    pub fn shifted(&self, offset: f64) -> Self {
        Self::new(self.low + offset, self.high + offset)
    }

    /// Same width, new center.
    #[must_use]
    pub fn recentered(&self, center: f64) -> Self {
        let half = self.half_width();
        Self::new(center - half, center + half)
    }
}

/// Speed boundaries (m/s) between consecutive gaits.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpeedBoundaries {
    pub stationary_max: f64,
    pub walk_trot: f64,
    pub trot_canter: f64,
    pub canter_gallop: f64,
}

impl SpeedBoundaries {
    /// Gait whose speed range contains `speed`.
    #[must_use]
    pub fn gait_for_speed(&self, speed: f64) -> Gait {
        if speed < self.stationary_max {
            Gait::Stationary
        } else if speed < self.walk_trot {
            Gait::Walk
        } else if speed < self.trot_canter {
            Gait::Trot
        } else if speed < self.canter_gallop {
            Gait::Canter
        } else {
            Gait::Gallop
        }
    }

    /// Speed range `[low, high)` of a gait; gallop is open-ended.
    #[must_use]
    pub fn range(&self, gait: Gait) -> (f64, f64) {
        match gait {
            Gait::Stationary => (0.0, self.stationary_max),
            Gait::Walk => (self.stationary_max, self.walk_trot),
            Gait::Trot => (self.walk_trot, self.trot_canter),
            Gait::Canter => (self.trot_canter, self.canter_gallop),
            Gait::Gallop => (self.canter_gallop, f64::INFINITY),
        }
    }

    /// Restore strict ordering after independent shifts.
    fn ordered(mut self) -> Self {
        self.walk_trot = self.walk_trot.max(self.stationary_max + MIN_BOUNDARY_GAP);
        self.trot_canter = self.trot_canter.max(self.walk_trot + MIN_BOUNDARY_GAP);
        self.canter_gallop = self.canter_gallop.max(self.trot_canter + MIN_BOUNDARY_GAP);
        self
    }
}

/// Breed category selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Breed {
    /// Reference-size sport horse; also the fallback for unknown breeds.
    #[default]
    Warmblood,
    Thoroughbred,
    Arabian,
    QuarterHorse,
    Draft,
    Pony,
}

impl Breed {
    pub const ALL: [Self; 6] = [
        Self::Warmblood,
        Self::Thoroughbred,
        Self::Arabian,
        Self::QuarterHorse,
        Self::Draft,
        Self::Pony,
    ];

    /// Look up the static priors for this breed.
    #[must_use]
    pub fn priors(self) -> &'static BiomechanicalPriors {
        &BREED_PRIORS[self as usize]
    }

    /// Parse a breed name, falling back to the reference breed.
    #[must_use]
    pub fn from_name_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(breed = name, "Unknown breed, using reference priors");
            Self::default()
        })
    }
}

impl FromStr for Breed {
    type Err = GaitError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "warmblood" | "default" => Ok(Self::Warmblood),
            "thoroughbred" => Ok(Self::Thoroughbred),
            "arabian" | "arab" => Ok(Self::Arabian),
            "quarterhorse" => Ok(Self::QuarterHorse),
            "draft" | "draught" => Ok(Self::Draft),
            "pony" => Ok(Self::Pony),
            _ => Err(GaitError::invalid_config(format!("unknown breed: {s}"))),
        }
    }
}

/// Static biomechanical model of a breed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiomechanicalPriors {
    pub breed: Breed,
    /// Dominant vertical frequency ranges for walk, trot, canter, gallop.
    pub frequency: [FrequencyRange; 4],
    pub speed: SpeedBoundaries,
    /// Stride length per meter of height at unit vertical RMS.
    pub stride_length_coefficient: f64,
    pub reference_height_m: f64,
    pub reference_mass_kg: f64,
}

impl BiomechanicalPriors {
    #[must_use]
    pub fn frequency_range(&self, gait: Gait) -> Option<FrequencyRange> {
        moving_index(gait).map(|i| self.frequency[i])
    }
}

/// Index into per-moving-gait arrays.
pub(crate) const fn moving_index(gait: Gait) -> Option<usize> {
    match gait {
        Gait::Stationary => None,
        Gait::Walk => Some(0),
        Gait::Trot => Some(1),
        Gait::Canter => Some(2),
        Gait::Gallop => Some(3),
    }
}

static BREED_PRIORS: [BiomechanicalPriors; 6] = [
    BiomechanicalPriors {
        breed: Breed::Warmblood,
        frequency: [
            FrequencyRange::new(0.8, 1.6),
            FrequencyRange::new(1.8, 2.6),
            FrequencyRange::new(1.4, 2.2),
            FrequencyRange::new(2.2, 3.2),
        ],
        speed: SpeedBoundaries {
            stationary_max: 0.3,
            walk_trot: 1.9,
            trot_canter: 3.8,
            canter_gallop: 7.0,
        },
        stride_length_coefficient: 0.9,
        reference_height_m: 1.68,
        reference_mass_kg: 600.0,
    },
    BiomechanicalPriors {
        breed: Breed::Thoroughbred,
        frequency: [
            FrequencyRange::new(0.85, 1.65),
            FrequencyRange::new(1.85, 2.65),
            FrequencyRange::new(1.45, 2.25),
            FrequencyRange::new(2.25, 3.3),
        ],
        speed: SpeedBoundaries {
            stationary_max: 0.3,
            walk_trot: 2.0,
            trot_canter: 4.0,
            canter_gallop: 8.0,
        },
        stride_length_coefficient: 0.95,
        reference_height_m: 1.63,
        reference_mass_kg: 500.0,
    },
    BiomechanicalPriors {
        breed: Breed::Arabian,
        frequency: [
            FrequencyRange::new(0.9, 1.7),
            FrequencyRange::new(1.9, 2.7),
            FrequencyRange::new(1.5, 2.3),
            FrequencyRange::new(2.3, 3.3),
        ],
        speed: SpeedBoundaries {
            stationary_max: 0.3,
            walk_trot: 1.8,
            trot_canter: 3.6,
            canter_gallop: 7.5,
        },
        stride_length_coefficient: 0.88,
        reference_height_m: 1.52,
        reference_mass_kg: 430.0,
    },
    BiomechanicalPriors {
        breed: Breed::QuarterHorse,
        frequency: [
            FrequencyRange::new(0.85, 1.65),
            FrequencyRange::new(1.85, 2.65),
            FrequencyRange::new(1.45, 2.25),
            FrequencyRange::new(2.25, 3.3),
        ],
        speed: SpeedBoundaries {
            stationary_max: 0.3,
            walk_trot: 1.8,
            trot_canter: 3.6,
            canter_gallop: 7.5,
        },
        stride_length_coefficient: 0.85,
        reference_height_m: 1.55,
        reference_mass_kg: 500.0,
    },
    BiomechanicalPriors {
        breed: Breed::Draft,
        frequency: [
            FrequencyRange::new(0.7, 1.5),
            FrequencyRange::new(1.7, 2.5),
            FrequencyRange::new(1.3, 2.1),
            FrequencyRange::new(2.1, 3.0),
        ],
        speed: SpeedBoundaries {
            stationary_max: 0.3,
            walk_trot: 1.7,
            trot_canter: 3.5,
            canter_gallop: 6.0,
        },
        stride_length_coefficient: 0.8,
        reference_height_m: 1.75,
        reference_mass_kg: 850.0,
    },
    BiomechanicalPriors {
        breed: Breed::Pony,
        frequency: [
            FrequencyRange::new(1.05, 1.85),
            FrequencyRange::new(2.05, 2.85),
            FrequencyRange::new(1.65, 2.45),
            FrequencyRange::new(2.45, 3.5),
        ],
        speed: SpeedBoundaries {
            stationary_max: 0.25,
            walk_trot: 1.5,
            trot_canter: 3.0,
            canter_gallop: 5.5,
        },
        stride_length_coefficient: 0.8,
        reference_height_m: 1.35,
        reference_mass_kg: 300.0,
    },
];

/// User-adjustable per-horse deltas. Neutral by default.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaitTuning {
    /// Customization is applied only when set.
    pub enabled: bool,
    /// Uniform shift of every frequency range (Hz).
    pub frequency_offset_hz: f64,
    /// Positive values lower the walk/trot and trot/canter speed boundaries.
    pub speed_sensitivity: f64,
    /// Positive values lower the self-transition probability.
    pub transition_responsiveness: f64,
    /// Multiplier on the acceptance threshold for entering canter; values
    /// below 1.0 make canter easier to detect.
    pub canter_sensitivity: f64,
    /// Shift of the walk/trot speed boundary (m/s).
    pub walk_trot_delta: f64,
    /// Shift of the trot/canter speed boundary (m/s).
    pub trot_canter_delta: f64,
}

impl Default for GaitTuning {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency_offset_hz: 0.0,
            speed_sensitivity: 0.0,
            transition_responsiveness: 0.0,
            canter_sensitivity: 1.0,
            walk_trot_delta: 0.0,
            trot_canter_delta: 0.0,
        }
    }
}

impl GaitTuning {
    /// Validate every delta against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::InvalidTuning`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&'static str, f64, f64, f64); 6] = [
            ("frequency_offset_hz", self.frequency_offset_hz, -0.5, 0.5),
            ("speed_sensitivity", self.speed_sensitivity, -1.0, 1.0),
            ("transition_responsiveness", self.transition_responsiveness, -1.0, 1.0),
            ("canter_sensitivity", self.canter_sensitivity, 0.25, 4.0),
            ("walk_trot_delta", self.walk_trot_delta, -1.0, 1.0),
            ("trot_canter_delta", self.trot_canter_delta, -1.5, 1.5),
        ];
        for (field, value, min, max) in checks {
            if !value.is_finite() || value < min || value > max {
                return Err(GaitError::invalid_tuning(field, value, min, max));
            }
        }
        Ok(())
    }

    /// Tuning that actually applies: neutral unless enabled.
    #[must_use]
    pub fn active(&self) -> Self {
        if self.enabled {
            *self
        } else {
            Self::default()
        }
    }
}

/// Learned model of one gait for one horse.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LearnedGait {
    pub center_frequency: f64,
    pub harmonic_ratio_2: f64,
    pub harmonic_ratio_3: f64,
    /// Rides that contributed an observation of this gait.
    pub observations: u32,
}

/// Learned per-gait parameters for one horse.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LearnedGaitParameters {
    pub gaits: BTreeMap<Gait, LearnedGait>,
    pub ride_count: u32,
    /// Timestamp (s) of the ride that last updated this record.
    pub last_updated: f64,
}

impl LearnedGaitParameters {
    #[must_use]
    pub fn gait(&self, gait: Gait) -> Option<&LearnedGait> {
        self.gaits.get(&gait)
    }

    /// Structurally usable values only; anything else counts as cold start.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.last_updated.is_finite()
            && self.gaits.iter().all(|(gait, learned)| {
                *gait != Gait::Stationary
                    && learned.center_frequency.is_finite()
                    && learned.center_frequency > 0.0
                    && learned.harmonic_ratio_2.is_finite()
                    && learned.harmonic_ratio_3.is_finite()
            })
    }
}

/// Everything the engine needs to know about the horse being ridden.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HorseProfile {
    pub id: String,
    pub breed: Breed,
    /// Height at withers (m), if known.
    pub height_m: Option<f64>,
    pub tuning: GaitTuning,
    pub learned: Option<LearnedGaitParameters>,
}

impl HorseProfile {
    #[must_use]
    pub fn new(id: impl Into<String>, breed: Breed) -> Self {
        Self {
            id: id.into(),
            breed,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_height(mut self, height_m: f64) -> Self {
        self.height_m = Some(height_m);
        self
    }

    #[must_use]
    pub fn with_tuning(mut self, tuning: GaitTuning) -> Self {
        self.tuning = tuning;
        self
    }

    #[must_use]
    pub fn with_learned(mut self, learned: LearnedGaitParameters) -> Self {
        self.learned = Some(learned);
        self
    }

    /// Height used by the stride-length model.
    #[must_use]
    pub fn effective_height(&self) -> f64 {
        self.height_m
            .filter(|h| PLAUSIBLE_HEIGHT.contains(h))
            .unwrap_or_else(|| self.breed.priors().reference_height_m)
    }
}

/// Classification bounds for one horse for one ride.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveBounds {
    /// Walk, trot, canter, gallop.
    pub frequency: [FrequencyRange; 4],
    pub speed: SpeedBoundaries,
    pub stride_length_coefficient: f64,
    pub height_m: f64,
}

impl EffectiveBounds {
    /// Compose breed priors, active tuning and learned centers.
    ///
    /// Learned centers apply only after `min_learned_rides` rides and pull the
    /// tuned center part of the way toward the learned value; the pull grows
    /// with ride count and is capped at 75%.
    #[must_use]
    pub fn compose(profile: &HorseProfile, min_learned_rides: u32) -> Self {
        let priors = profile.breed.priors();
        let tuning = profile.tuning.active();

        let mut frequency = priors
            .frequency
            .map(|range| range.shifted(tuning.frequency_offset_hz));

        let scale = 1.0 - SPEED_SENSITIVITY_SCALE * tuning.speed_sensitivity;
        let speed = SpeedBoundaries {
            stationary_max: priors.speed.stationary_max,
            walk_trot: priors.speed.walk_trot * scale + tuning.walk_trot_delta,
            trot_canter: priors.speed.trot_canter * scale + tuning.trot_canter_delta,
            canter_gallop: priors.speed.canter_gallop,
        }
        .ordered();

        if let Some(learned) = profile
            .learned
            .as_ref()
            .filter(|l| l.ride_count >= min_learned_rides && l.is_consistent())
        {
            let rides = f64::from(learned.ride_count);
            let weight = (rides / (rides + 5.0)).min(0.75);
            for gait in Gait::MOVING {
                let (Some(i), Some(l)) = (moving_index(gait), learned.gait(gait)) else {
                    continue;
                };
                let center = frequency[i].center();
                frequency[i] = frequency[i].recentered(center + weight * (l.center_frequency - center));
            }
        }

        Self {
            frequency,
            speed,
            stride_length_coefficient: priors.stride_length_coefficient,
            height_m: profile.effective_height(),
        }
    }

    #[must_use]
    pub fn frequency_range(&self, gait: Gait) -> Option<FrequencyRange> {
        moving_index(gait).map(|i| self.frequency[i])
    }

    /// Meters per stride at a given vertical RMS.
    #[must_use]
    pub fn stride_length(&self, vertical_rms: f64) -> f64 {
        self.stride_length_coefficient * self.height_m * vertical_rms.max(0.0).powf(0.25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_bounds() -> EffectiveBounds {
        EffectiveBounds::compose(&HorseProfile::default(), 3)
    }

    #[test]
    fn test_breed_table_is_indexed_by_tag() {
        for breed in Breed::ALL {
            let priors = breed.priors();
            assert_eq!(priors.breed, breed);
            let s = priors.speed;
            assert!(s.stationary_max < s.walk_trot);
            assert!(s.walk_trot < s.trot_canter);
            assert!(s.trot_canter < s.canter_gallop);
        }
    }

    #[test]
    fn test_breed_parsing() {
        assert_eq!("Quarter Horse".parse::<Breed>().unwrap(), Breed::QuarterHorse);
        assert_eq!("ARABIAN".parse::<Breed>().unwrap(), Breed::Arabian);
        assert!("unicorn".parse::<Breed>().is_err());
        assert_eq!(Breed::from_name_or_default("unicorn"), Breed::Warmblood);
    }

    #[test]
    fn test_speed_mapping() {
        let speed = Breed::Warmblood.priors().speed;
        assert_eq!(speed.gait_for_speed(0.0), Gait::Stationary);
        assert_eq!(speed.gait_for_speed(1.5), Gait::Walk);
        assert_eq!(speed.gait_for_speed(3.0), Gait::Trot);
        assert_eq!(speed.gait_for_speed(4.0), Gait::Canter);
        assert_eq!(speed.gait_for_speed(9.0), Gait::Gallop);
    }

    #[test]
    fn test_disabled_tuning_is_ignored() {
        let tuning = GaitTuning {
            enabled: false,
            frequency_offset_hz: 0.3,
            ..GaitTuning::default()
        };
        let profile = HorseProfile::default().with_tuning(tuning);
        assert_eq!(EffectiveBounds::compose(&profile, 3), default_bounds());
    }

    #[test]
    fn test_tuning_shifts_bounds() {
        let tuning = GaitTuning {
            enabled: true,
            frequency_offset_hz: 0.2,
            walk_trot_delta: 0.3,
            trot_canter_delta: -0.5,
            ..GaitTuning::default()
        };
        let bounds = EffectiveBounds::compose(&HorseProfile::default().with_tuning(tuning), 3);
        let base = default_bounds();

        for i in 0..4 {
            assert_relative_eq!(bounds.frequency[i].low, base.frequency[i].low + 0.2);
        }
        assert_relative_eq!(bounds.speed.walk_trot, base.speed.walk_trot + 0.3);
        assert_relative_eq!(bounds.speed.trot_canter, base.speed.trot_canter - 0.5);
    }

    #[test]
    fn test_speed_sensitivity_lowers_boundaries() {
        let tuning = GaitTuning {
            enabled: true,
            speed_sensitivity: 1.0,
            ..GaitTuning::default()
        };
        let bounds = EffectiveBounds::compose(&HorseProfile::default().with_tuning(tuning), 3);
        let base = default_bounds();
        assert!(bounds.speed.walk_trot < base.speed.walk_trot);
        assert!(bounds.speed.trot_canter < base.speed.trot_canter);
        assert_eq!(bounds.speed.canter_gallop, base.speed.canter_gallop);
    }

    #[test]
    fn test_extreme_deltas_keep_order() {
        let tuning = GaitTuning {
            enabled: true,
            walk_trot_delta: 1.0,
            trot_canter_delta: -1.5,
            ..GaitTuning::default()
        };
        let s = EffectiveBounds::compose(&HorseProfile::new("x", Breed::Pony).with_tuning(tuning), 3).speed;
        assert!(s.stationary_max < s.walk_trot);
        assert!(s.walk_trot < s.trot_canter);
        assert!(s.trot_canter < s.canter_gallop);
    }

    #[test]
    fn test_tuning_validation() {
        assert!(GaitTuning::default().validate().is_ok());
        let bad = GaitTuning {
            canter_sensitivity: 10.0,
            ..GaitTuning::default()
        };
        match bad.validate() {
            Err(GaitError::InvalidTuning { field, .. }) => assert_eq!(field, "canter_sensitivity"),
            other => panic!("unexpected {other:?}"),
        }
        let nan = GaitTuning {
            frequency_offset_hz: f64::NAN,
            ..GaitTuning::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_learned_centers_need_enough_rides() {
        let mut learned = LearnedGaitParameters {
            ride_count: 2,
            ..LearnedGaitParameters::default()
        };
        learned.gaits.insert(
            Gait::Trot,
            LearnedGait {
                center_frequency: 2.6,
                harmonic_ratio_2: 0.5,
                harmonic_ratio_3: 0.1,
                observations: 2,
            },
        );

        let few = EffectiveBounds::compose(&HorseProfile::default().with_learned(learned.clone()), 3);
        assert_eq!(few, default_bounds());

        learned.ride_count = 5;
        let many = EffectiveBounds::compose(&HorseProfile::default().with_learned(learned), 3);
        let trot = many.frequency_range(Gait::Trot).unwrap();
        let base = default_bounds().frequency_range(Gait::Trot).unwrap();
        // weight = 5 / 10
        assert_relative_eq!(trot.center(), base.center() + 0.5 * (2.6 - base.center()));
        assert_relative_eq!(trot.half_width(), base.half_width());
    }

    #[test]
    fn test_corrupted_learned_state_is_cold_start() {
        let mut learned = LearnedGaitParameters {
            ride_count: 10,
            ..LearnedGaitParameters::default()
        };
        learned.gaits.insert(
            Gait::Walk,
            LearnedGait {
                center_frequency: f64::NAN,
                harmonic_ratio_2: 0.0,
                harmonic_ratio_3: 0.0,
                observations: 10,
            },
        );
        let bounds = EffectiveBounds::compose(&HorseProfile::default().with_learned(learned), 3);
        assert_eq!(bounds, default_bounds());
    }

    #[test]
    fn test_height_fallback_and_stride_length() {
        let unknown = HorseProfile::new("a", Breed::Pony);
        assert_relative_eq!(unknown.effective_height(), 1.35);
        let implausible = HorseProfile::new("b", Breed::Pony).with_height(7.0);
        assert_relative_eq!(implausible.effective_height(), 1.35);

        let bounds = default_bounds();
        assert_relative_eq!(bounds.stride_length(1.0), 0.9 * 1.68);
        assert_relative_eq!(bounds.stride_length(16.0), 0.9 * 1.68 * 2.0);
    }
}

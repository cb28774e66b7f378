//! Core data model shared by every pipeline stage.
//!
//! | Type | Produced by | Consumed by |
//! |------|-------------|-------------|
//! | [`MotionSample`] | device sensor source | preprocessor, GPS tracker |
//! | [`SpectralFeatures`] | spectral analyzer | classifier, lead detector, segmenter |
//! | [`GaitSegment`] | segmenter | persistence (external) |

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One GPS fix attached to a motion sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GpsFix {
    /// Ground speed in m/s.
    pub speed: f64,
    /// Horizontal accuracy radius in meters.
    pub horizontal_accuracy: f64,
}

impl GpsFix {
    #[must_use]
    pub const fn new(speed: f64, horizontal_accuracy: f64) -> Self {
        Self {
            speed,
            horizontal_accuracy,
        }
    }

    /// A fix is usable when both values are finite and non-negative.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.speed.is_finite()
            && self.speed >= 0.0
            && self.horizontal_accuracy.is_finite()
            && self.horizontal_accuracy >= 0.0
    }

    #[must_use]
    pub fn quality(&self) -> GpsQuality {
        if self.is_valid() {
            GpsQuality::from_accuracy(self.horizontal_accuracy)
        } else {
            GpsQuality::None
        }
    }
}

/// One sensor reading.
///
/// Acceleration is in the device frame with gravity included (m/s²).
/// Rotation rate is in rad/s. GPS arrives at a lower rate and is absent on
/// most samples.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotionSample {
    /// Seconds since an arbitrary epoch; must increase within a ride.
    pub timestamp: f64,
    pub acceleration: [f64; 3],
    pub rotation_rate: Option<[f64; 3]>,
    pub gps: Option<GpsFix>,
}

impl MotionSample {
    #[must_use]
    pub const fn new(timestamp: f64, acceleration: [f64; 3]) -> Self {
        Self {
            timestamp,
            acceleration,
            rotation_rate: None,
            gps: None,
        }
    }

    #[must_use]
    pub const fn with_rotation(mut self, rotation_rate: [f64; 3]) -> Self {
        self.rotation_rate = Some(rotation_rate);
        self
    }

    #[must_use]
    pub const fn with_gps(mut self, speed: f64, horizontal_accuracy: f64) -> Self {
        self.gps = Some(GpsFix::new(speed, horizontal_accuracy));
        self
    }

    /// Whether the timestamp and motion channels are all finite.
    ///
    /// The GPS fix is not checked; invalid fixes are ignored downstream.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.acceleration.iter().all(|a| a.is_finite())
            && self
                .rotation_rate
                .map_or(true, |r| r.iter().all(|w| w.is_finite()))
    }
}

/// Tiered GPS signal quality derived from horizontal accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GpsQuality {
    #[default]
    None,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl GpsQuality {
    /// Map a horizontal accuracy radius in meters to a tier.
    #[must_use]
    pub fn from_accuracy(meters: f64) -> Self {
        if !meters.is_finite() || meters < 0.0 {
            Self::None
        } else if meters <= 5.0 {
            Self::Excellent
        } else if meters <= 10.0 {
            Self::Good
        } else if meters <= 20.0 {
            Self::Fair
        } else if meters <= 50.0 {
            Self::Poor
        } else {
            Self::None
        }
    }

    /// Fair and below are not trusted for the speed prior.
    #[must_use]
    pub const fn is_trustworthy(self) -> bool {
        matches!(self, Self::Good | Self::Excellent)
    }
}

/// Gait label, ordered from slowest to fastest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Gait {
    #[default]
    Stationary,
    Walk,
    Trot,
    Canter,
    Gallop,
}

impl Gait {
    pub const ALL: [Self; 5] = [
        Self::Stationary,
        Self::Walk,
        Self::Trot,
        Self::Canter,
        Self::Gallop,
    ];

    /// Gaits with a stride frequency model.
    pub const MOVING: [Self; 4] = [Self::Walk, Self::Trot, Self::Canter, Self::Gallop];

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Lead only exists in the three-beat and four-beat running gaits.
    #[must_use]
    pub const fn has_lead(self) -> bool {
        matches!(self, Self::Canter | Self::Gallop)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Walk => "walk",
            Self::Trot => "trot",
            Self::Canter => "canter",
            Self::Gallop => "gallop",
        }
    }
}

impl std::fmt::Display for Gait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Leading foreleg in canter or gallop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Lead {
    Left,
    Right,
    #[default]
    Unknown,
}

/// Direction of travel around an arena or circle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Rein {
    /// Counter-clockwise travel.
    Left,
    /// Clockwise travel.
    Right,
}

impl Rein {
    /// Infer rein from mean yaw rate about the vertical axis (rad/s).
    ///
    /// Positive yaw is counter-clockwise when viewed from above.
    #[must_use]
    pub fn from_yaw_rate(mean_yaw_rate: f64, threshold: f64) -> Option<Self> {
        if mean_yaw_rate > threshold {
            Some(Self::Left)
        } else if mean_yaw_rate < -threshold {
            Some(Self::Right)
        } else {
            None
        }
    }
}

/// Rein direction tracked over a time range by an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReinSegment {
    pub rein: Rein,
    pub start_time: f64,
    pub end_time: f64,
}

/// Whether spectral features can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FeatureConfidence {
    #[default]
    Normal,
    /// Too few (calibrated) samples in the window.
    Low,
}

/// Frequency-domain summary of one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpectralFeatures {
    /// Dominant vertical frequency inside the stride band (Hz).
    pub stride_frequency: f64,
    /// Normalized Shannon entropy of the power spectrum, 0..=1.
    pub spectral_entropy: f64,
    /// Power near 2f over power at f.
    pub harmonic_ratio_2: f64,
    /// Power near 3f over power at f.
    pub harmonic_ratio_3: f64,
    /// Peak absolute vertical/yaw correlation, 0..=1.
    pub vertical_yaw_coherence: f64,
    /// RMS of the mean-removed vertical channel (m/s²).
    pub vertical_rms: f64,
    pub sample_count: usize,
    pub confidence: FeatureConfidence,
}

impl SpectralFeatures {
    /// Feature set for a window that could not be analyzed.
    #[must_use]
    pub fn low_confidence(sample_count: usize) -> Self {
        Self {
            sample_count,
            spectral_entropy: 1.0,
            confidence: FeatureConfidence::Low,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_low_confidence(&self) -> bool {
        self.confidence == FeatureConfidence::Low
    }
}

/// A closed run of windows sharing one gait label.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GaitSegment {
    pub gait: Gait,
    pub start_time: f64,
    pub end_time: f64,
    /// Meters covered.
    pub distance: f64,
    /// Meters per second over the segment.
    pub average_speed: f64,
    /// Stride regularity, 0..=100.
    pub rhythm_score: f64,
    pub lead: Lead,
    pub lead_confidence: f64,
    /// Rein inferred from yaw over the segment, if turning was sustained.
    pub rein: Option<Rein>,
    pub window_count: usize,
    /// Features of the last confident window in the segment.
    pub spectral_snapshot: Option<SpectralFeatures>,
}

impl GaitSegment {
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Lead/rein pairing against the segment's own inferred rein.
    ///
    /// `None` when either side is unknown or the gait has no lead.
    #[must_use]
    pub fn is_correct_lead(&self) -> Option<bool> {
        if !self.gait.has_lead() {
            return None;
        }
        self.rein
            .and_then(|rein| crate::lead::is_correct_lead(self.lead, rein))
    }
}

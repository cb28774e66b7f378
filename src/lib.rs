//! Gait Engine Library
//!
//! Real-time equine gait segmentation from a phone's inertial sensors and GPS.
//!
//! The engine turns an ordered stream of accelerometer, gyroscope and GPS
//! samples into contiguous segments labeled stationary, walk, trot, canter or
//! gallop, with distance, rhythm regularity and (in canter and gallop) the
//! leading leg. Classification adapts to each horse through breed priors,
//! optional user tuning and parameters learned across rides.
//!
//! # Features
//!
//! - **Mount-aware preprocessing**: gravity baseline and smoothing per pocket
//!   position, with drift-triggered recalibration
//! - **FFT-based**: stride frequency, harmonic ratios and spectral entropy over
//!   a sliding window
//! - **Sticky classification**: spectral and GPS evidence fused and smoothed so
//!   a single ambiguous window cannot flip the label
//! - **Per-horse learning**: center frequencies refined after every ride
//!
//! # Quick Start
//!
//! ```
//! use gait_engine::{Breed, EngineConfig, GaitEngine, HorseProfile, MotionSample, MountPosition};
//!
//! let horse = HorseProfile::new("bella", Breed::Arabian).with_height(1.5);
//! let mut engine = GaitEngine::new(EngineConfig::default(), MountPosition::ThighPocket, horse)?;
//!
//! let mut segments = Vec::new();
//! for i in 0..500 {
//!     let sample = MotionSample::new(i as f64 * 0.01, [0.0, 0.0, 9.81]);
//!     segments.extend(engine.process(&sample));
//! }
//! let outcome = engine.finish()?;
//! segments.extend(outcome.final_segment);
//!
//! assert_eq!(segments.len(), 1);
//! # Ok::<(), gait_engine::GaitError>(())
//! ```
//!
//! # Presets
//!
//! ```
//! use gait_engine::EngineConfig;
//!
//! let standard = EngineConfig::default();
//! let live = EngineConfig::responsive();
//! let battery = EngineConfig::low_power();
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod calibration;
pub mod classifier;
pub mod config;
pub mod error;
pub mod horse;
pub mod lead;
pub mod math;
pub mod pipeline;
pub mod preprocess;
pub mod segmenter;
pub mod session;
pub mod spectral;
pub mod types;

// Re-exports for convenient access
pub use calibration::{CalibrationStore, CalibrationUpdate, GaitObservation};
pub use classifier::{Classification, GaitClassifier};
pub use config::{EngineConfig, MountCalibration, MountPosition, WindowFunction};
pub use error::{GaitError, Result};
pub use horse::{Breed, EffectiveBounds, GaitTuning, HorseProfile, LearnedGaitParameters};
pub use lead::{is_correct_lead, lead_correctness, LeadDetector};
pub use pipeline::{GaitEngine, RideOutcome, RideSummary};
pub use session::{RideSession, SampleProducer};
pub use spectral::SpectralAnalyzer;
pub use types::{
    Gait, GaitSegment, GpsFix, GpsQuality, Lead, MotionSample, Rein, ReinSegment, SpectralFeatures,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

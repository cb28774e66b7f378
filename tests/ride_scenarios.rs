//! End-to-end ride scenarios on synthetic sensor streams.
//!
//! Each ride is generated at 100 Hz with a phone upright in a chest pocket:
//! vertical bounce on z with per-gait harmonics, lateral sway on x for the
//! lead, and yaw on the gyro z axis for turning.

use gait_engine::session::RideSession;
use gait_engine::{
    Breed, CalibrationStore, EngineConfig, Gait, GaitEngine, GaitSegment, HorseProfile, Lead,
    MotionSample, MountPosition, Rein, RideOutcome,
};
use std::f64::consts::{FRAC_PI_2, PI};

// =============================================================================
// RIDE GENERATOR
// =============================================================================

const RATE: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
struct Stride {
    frequency: f64,
    h2: f64,
    h3: f64,
    speed: f64,
    sway: f64,
    yaw_wobble: f64,
}

fn stride(gait: Gait) -> Stride {
    let (frequency, h2, h3, speed, sway, yaw_wobble) = match gait {
        Gait::Stationary => (0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
        Gait::Walk => (1.2, 0.05, 0.02, 1.4, 0.0, 0.0),
        Gait::Trot => (2.2, 0.8, 0.0, 3.0, 0.0, 0.0),
        Gait::Canter => (1.8, 0.0, 0.7, 5.0, 0.8, 0.5),
        Gait::Gallop => (2.8, 0.2, 0.2, 9.0, 0.8, 0.6),
    };
    Stride {
        frequency,
        h2,
        h3,
        speed,
        sway,
        yaw_wobble,
    }
}

#[derive(Debug, Clone, Copy)]
struct RideOptions {
    /// GPS accuracy in meters; `None` rides without GPS.
    gps_accuracy: Option<f64>,
    /// Phase of lateral sway relative to vertical bounce.
    lead_phase: f64,
    /// Constant yaw rate (rad/s); positive turns left.
    turn_rate: f64,
    /// Samples between these times are never delivered.
    gap: Option<(f64, f64)>,
    /// Uniform noise amplitude on every accelerometer axis.
    noise: f64,
}

impl Default for RideOptions {
    fn default() -> Self {
        Self {
            gps_accuracy: Some(5.0),
            lead_phase: FRAC_PI_2,
            turn_rate: 0.0,
            gap: None,
            noise: 0.0,
        }
    }
}

/// Deterministic uniform noise.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }
}

fn generate_ride(phases: &[(Stride, f64)], options: RideOptions) -> Vec<MotionSample> {
    let mut samples = Vec::new();
    let mut rng = XorShift(0x9E37_79B9_7F4A_7C15);
    let mut phase = 0.0_f64;
    let mut index = 0usize;

    for &(s, seconds) in phases {
        let n = (seconds * RATE).round() as usize;
        for _ in 0..n {
            let t = index as f64 / RATE;
            index += 1;
            phase += 2.0 * PI * s.frequency / RATE;

            let bounce = if s.frequency > 0.0 {
                2.0 * (phase.sin() + s.h2 * (2.0 * phase).sin() + s.h3 * (3.0 * phase).sin())
            } else {
                0.0
            };
            let mut acc = [
                s.sway * (phase + options.lead_phase).sin(),
                0.0,
                9.81 + bounce,
            ];
            if options.noise > 0.0 {
                for a in &mut acc {
                    *a += options.noise * rng.next();
                }
            }
            let yaw = options.turn_rate + s.yaw_wobble * (phase - 0.5).sin();

            if options.gap.is_some_and(|(start, end)| t >= start && t < end) {
                continue;
            }

            let mut sample = MotionSample::new(t, acc).with_rotation([0.0, 0.0, yaw]);
            if let Some(accuracy) = options.gps_accuracy {
                if index % RATE as usize == 1 {
                    sample = sample.with_gps(s.speed, accuracy);
                }
            }
            samples.push(sample);
        }
    }
    samples
}

fn ride_with(profile: HorseProfile, samples: &[MotionSample]) -> (Vec<GaitSegment>, RideOutcome) {
    let mut engine =
        GaitEngine::new(EngineConfig::default(), MountPosition::ChestPocket, profile).unwrap();
    let mut segments: Vec<GaitSegment> = samples.iter().filter_map(|s| engine.process(s)).collect();
    let outcome = engine.finish().unwrap();
    segments.extend(outcome.final_segment.clone());
    (segments, outcome)
}

fn ride(samples: &[MotionSample]) -> (Vec<GaitSegment>, RideOutcome) {
    ride_with(HorseProfile::new("bella", Breed::Warmblood), samples)
}

fn assert_tiles(segments: &[GaitSegment], start: f64, end: f64) {
    assert!(!segments.is_empty());
    assert_eq!(segments[0].start_time, start);
    assert_eq!(segments.last().unwrap().end_time, end);
    for pair in segments.windows(2) {
        assert_eq!(pair[0].end_time, pair[1].start_time);
    }
    for s in segments {
        assert!(s.end_time > s.start_time, "empty segment {s:?}");
    }
}

fn gaits(segments: &[GaitSegment]) -> Vec<Gait> {
    segments.iter().map(|s| s.gait).collect()
}

/// True when `expected` appears in order within `actual`.
fn is_subsequence(expected: &[Gait], actual: &[Gait]) -> bool {
    let mut it = actual.iter();
    expected.iter().all(|g| it.any(|a| a == g))
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn test_schooling_session_segments() {
    let samples = generate_ride(
        &[
            (stride(Gait::Stationary), 3.0),
            (stride(Gait::Walk), 20.0),
            (stride(Gait::Trot), 20.0),
            (stride(Gait::Canter), 20.0),
        ],
        RideOptions {
            turn_rate: 0.3,
            ..RideOptions::default()
        },
    );
    let (segments, outcome) = ride(&samples);
    let labels = gaits(&segments);

    assert_tiles(&segments, 0.0, samples.last().unwrap().timestamp);
    assert!(
        is_subsequence(&[Gait::Walk, Gait::Trot, Gait::Canter], &labels),
        "{labels:?}"
    );
    assert!(segments.len() <= 6, "{labels:?}");
    assert_eq!(labels.last(), Some(&Gait::Canter));

    let canter = segments.last().unwrap();
    assert!(canter.duration() > 15.0);
    assert_eq!(canter.lead, Lead::Left);
    assert!(canter.lead_confidence >= 0.7);
    assert_eq!(canter.rein, Some(Rein::Left));
    assert_eq!(canter.is_correct_lead(), Some(true));
    assert!(canter.rhythm_score > 0.0 && canter.rhythm_score <= 100.0);

    // GPS-based distance: roughly 20 s each at 1.4, 3.0 and 5.0 m/s
    let distance = outcome.summary.total_distance();
    assert!(distance > 150.0 && distance < 230.0, "{distance}");

    let observed: Vec<Gait> = outcome.calibration.observations.iter().map(|o| o.gait).collect();
    assert!(observed.contains(&Gait::Walk));
    assert!(observed.contains(&Gait::Trot));
    assert!(observed.contains(&Gait::Canter));
}

#[test]
fn test_cross_canter_is_flagged() {
    let samples = generate_ride(
        &[(stride(Gait::Stationary), 3.0), (stride(Gait::Canter), 20.0)],
        RideOptions {
            lead_phase: -FRAC_PI_2,
            turn_rate: 0.3,
            ..RideOptions::default()
        },
    );
    let (segments, _) = ride(&samples);
    let canter = segments.iter().find(|s| s.gait == Gait::Canter).unwrap();

    assert_eq!(canter.lead, Lead::Right);
    assert_eq!(canter.rein, Some(Rein::Left));
    assert_eq!(canter.is_correct_lead(), Some(false));
}

#[test]
fn test_gap_does_not_force_boundary() {
    let phases = [(stride(Gait::Stationary), 3.0), (stride(Gait::Trot), 25.0)];
    let no_gps = RideOptions {
        gps_accuracy: None,
        ..RideOptions::default()
    };
    let (plain, _) = ride(&generate_ride(&phases, no_gps));

    let gapped_samples = generate_ride(
        &phases,
        RideOptions {
            gap: Some((14.0, 16.0)),
            ..no_gps
        },
    );
    let (gapped, outcome) = ride(&gapped_samples);

    assert_eq!(outcome.summary.sensor_gaps, 1);
    assert_eq!(gaits(&plain), gaits(&gapped));
    assert_eq!(gaits(&gapped), [Gait::Stationary, Gait::Trot]);
    assert_tiles(&gapped, 0.0, gapped_samples.last().unwrap().timestamp);
}

#[test]
fn test_noisy_trot_does_not_flicker() {
    let samples = generate_ride(
        &[(stride(Gait::Stationary), 3.0), (stride(Gait::Trot), 40.0)],
        RideOptions {
            gps_accuracy: None,
            noise: 0.4,
            ..RideOptions::default()
        },
    );
    let (segments, _) = ride(&samples);
    assert_eq!(gaits(&segments), [Gait::Stationary, Gait::Trot]);
}

#[test]
fn test_poor_gps_trot_at_canter_speed() {
    // 4.0 m/s reported at 40 m accuracy; spectrum is a 2.1 Hz trot
    let trot = Stride {
        frequency: 2.1,
        speed: 4.0,
        ..stride(Gait::Trot)
    };
    let samples = generate_ride(
        &[(stride(Gait::Stationary), 3.0), (trot, 15.0)],
        RideOptions {
            gps_accuracy: Some(40.0),
            ..RideOptions::default()
        },
    );
    let (segments, _) = ride(&samples);
    assert_eq!(gaits(&segments).last(), Some(&Gait::Trot));
    assert!(segments.iter().all(|s| s.gait <= Gait::Trot));
}

#[test]
fn test_ride_without_windows() {
    let samples = generate_ride(&[(stride(Gait::Stationary), 0.5)], RideOptions::default());
    let (segments, outcome) = ride(&samples);
    assert_eq!(gaits(&segments), [Gait::Stationary]);
    assert_eq!(outcome.summary.windows, 0);
    assert!(outcome.calibration.observations.is_empty());
}

#[test]
fn test_learning_converges_across_rides() {
    // This horse trots faster than the breed prior (2.2 Hz)
    let quick_trot = Stride {
        frequency: 2.45,
        ..stride(Gait::Trot)
    };
    let samples = generate_ride(
        &[(stride(Gait::Stationary), 3.0), (quick_trot, 25.0)],
        RideOptions::default(),
    );

    let mut store = CalibrationStore::new();
    let mut centers = Vec::new();
    for _ in 0..6 {
        let profile = store.profile_for("bella", Breed::Warmblood);
        let (_, outcome) = ride_with(profile, &samples);
        let learned = store.apply(&outcome.calibration);
        centers.push(learned.gait(Gait::Trot).unwrap().center_frequency);
    }

    for pair in centers.windows(2) {
        assert!(pair[1] > pair[0]);
        assert!(pair[1] <= 2.5);
    }
    // Each ride moves the center less than the one before, starting from the prior.
    let mut path = vec![2.2];
    path.extend(&centers);
    let steps: Vec<f64> = path.windows(2).map(|c| c[1] - c[0]).collect();
    for pair in steps.windows(2) {
        assert!(pair[1].abs() < pair[0].abs(), "{steps:?}");
    }
    assert!((centers.last().unwrap() - 2.45).abs() < 0.05, "{centers:?}");

    let profile = store.profile_for("bella", Breed::Warmblood);
    let engine =
        GaitEngine::new(EngineConfig::default(), MountPosition::ChestPocket, profile).unwrap();
    let trot = engine.bounds().frequency_range(Gait::Trot).unwrap();
    assert!(trot.center() > 2.3);
}

#[tokio::test]
async fn test_session_matches_direct_processing() {
    let samples = generate_ride(
        &[
            (stride(Gait::Stationary), 3.0),
            (stride(Gait::Walk), 15.0),
            (stride(Gait::Trot), 15.0),
        ],
        RideOptions::default(),
    );
    let (direct, _) = ride(&samples);

    let engine = GaitEngine::new(
        EngineConfig::default(),
        MountPosition::ChestPocket,
        HorseProfile::new("bella", Breed::Warmblood),
    )
    .unwrap();
    let (session, mut producer, mut segment_rx) = RideSession::start(engine, 1024);
    for (i, sample) in samples.iter().enumerate() {
        assert!(producer.offer(*sample).unwrap());
        if i % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }
    let outcome = session.finish().await.unwrap();

    let mut streamed = Vec::new();
    while let Some(segment) = segment_rx.recv().await {
        streamed.push(segment);
    }

    assert_eq!(producer.dropped(), 0);
    assert_eq!(outcome.summary.samples, samples.len() as u64);
    assert_eq!(streamed, direct);
}

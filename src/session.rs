//! Asynchronous ride session.
//!
//! The sensor callback must never block, so samples go through a bounded
//! channel into a task that owns the [`GaitEngine`]. When the queue is full
//! the newest sample is dropped; its GPS fix (which arrives rarely) is carried
//! onto the next sample that gets through. Closed segments leave through an
//! unbounded channel so a slow consumer never stalls processing.
//!
//! # Example
//!
//! ```
//! use gait_engine::session::RideSession;
//! use gait_engine::{EngineConfig, GaitEngine, HorseProfile, MotionSample, MountPosition};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let engine = GaitEngine::new(
//!     EngineConfig::default(),
//!     MountPosition::ThighPocket,
//!     HorseProfile::default(),
//! )?;
//! let (session, mut producer, mut segments) = RideSession::start(engine, 256);
//!
//! for i in 0..100 {
//!     producer.offer(MotionSample::new(i as f64 * 0.01, [0.0, 0.0, 9.81]))?;
//!     tokio::task::yield_now().await;
//! }
//!
//! let outcome = session.finish().await?;
//! assert!(segments.recv().await.is_some());
//! # assert!(outcome.summary.samples > 0);
//! # Ok::<(), gait_engine::GaitError>(())
//! # }).unwrap();
//! ```

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{GaitError, Result};
use crate::pipeline::{GaitEngine, RideOutcome};
use crate::types::{GaitSegment, GpsFix, MotionSample};

#[derive(Debug)]
enum Command {
    Sample(MotionSample),
    Finish,
}

/// Non-blocking sample intake owned by the sensor callback.
#[derive(Debug)]
pub struct SampleProducer {
    tx: mpsc::Sender<Command>,
    pending_gps: Option<GpsFix>,
    dropped: u64,
}

impl SampleProducer {
    /// Offer one sample without waiting.
    ///
    /// Returns `Ok(false)` when the queue was full and the sample was dropped.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::SessionClosed`] once the session has finished.
    pub fn offer(&mut self, mut sample: MotionSample) -> Result<bool> {
        if sample.gps.is_none() {
            sample.gps = self.pending_gps.take();
        }
        match self.tx.try_send(Command::Sample(sample)) {
            Ok(()) => {
                self.pending_gps = None;
                Ok(true)
            }
            Err(TrySendError::Full(command)) => {
                if let Command::Sample(rejected) = command {
                    self.pending_gps = rejected.gps;
                    self.dropped += 1;
                    debug!(
                        timestamp = rejected.timestamp,
                        dropped = self.dropped,
                        "Queue full, sample dropped"
                    );
                }
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(GaitError::SessionClosed),
        }
    }

    /// Samples dropped because the queue was full.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Handle to a running ride.
#[derive(Debug)]
pub struct RideSession {
    control: mpsc::Sender<Command>,
    task: JoinHandle<Result<RideOutcome>>,
}

impl RideSession {
    /// Spawn the processing task on the current tokio runtime.
    ///
    /// `capacity` bounds the sample queue.
    pub fn start(
        engine: GaitEngine,
        capacity: usize,
    ) -> (Self, SampleProducer, mpsc::UnboundedReceiver<GaitSegment>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (segment_tx, segment_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run(engine, rx, segment_tx));
        let producer = SampleProducer {
            tx: tx.clone(),
            pending_gps: None,
            dropped: 0,
        };
        (Self { control: tx, task }, producer, segment_rx)
    }

    /// Stop intake, flush the open segment, and return the ride outcome.
    ///
    /// Samples already queued are processed first.
    ///
    /// # Errors
    ///
    /// Returns [`GaitError::NoData`] for a ride without samples and
    /// [`GaitError::TaskFailed`] if the processing task panicked.
    pub async fn finish(self) -> Result<RideOutcome> {
        // A send error means the task already exited; the join below reports why.
        let _ = self.control.send(Command::Finish).await;
        self.task
            .await
            .map_err(|e| GaitError::task_failed(e.to_string()))?
    }
}

async fn run(
    mut engine: GaitEngine,
    mut rx: mpsc::Receiver<Command>,
    segments: mpsc::UnboundedSender<GaitSegment>,
) -> Result<RideOutcome> {
    info!(horse = %engine.profile().id, "Ride session started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Sample(sample) => {
                if let Some(segment) = engine.process(&sample) {
                    if segments.send(segment).is_err() {
                        debug!("Segment receiver dropped");
                    }
                }
            }
            Command::Finish => break,
        }
    }
    rx.close();

    let outcome = engine.finish()?;
    if let Some(segment) = &outcome.final_segment {
        let _ = segments.send(segment.clone());
    }
    info!(
        samples = outcome.summary.samples,
        windows = outcome.summary.windows,
        "Ride session stopped"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, MountPosition};
    use crate::horse::HorseProfile;

    fn engine() -> GaitEngine {
        GaitEngine::new(
            EngineConfig::default(),
            MountPosition::ChestPocket,
            HorseProfile::new("bella", Default::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_full_queue_drops_and_carries_gps() {
        let (session, mut producer, _segments) = RideSession::start(engine(), 2);

        // Current-thread runtime: the task cannot drain until we yield.
        assert!(producer.offer(MotionSample::new(0.00, [0.0, 0.0, 9.81])).unwrap());
        assert!(producer.offer(MotionSample::new(0.01, [0.0, 0.0, 9.81])).unwrap());
        let dropped = MotionSample::new(0.02, [0.0, 0.0, 9.81]).with_gps(3.0, 4.0);
        assert!(!producer.offer(dropped).unwrap());
        assert_eq!(producer.dropped(), 1);
        assert_eq!(producer.pending_gps, Some(GpsFix::new(3.0, 4.0)));

        tokio::task::yield_now().await;
        let accepted = producer.offer(MotionSample::new(0.03, [0.0, 0.0, 9.81])).unwrap();
        if accepted {
            assert_eq!(producer.pending_gps, None);
        }

        let outcome = session.finish().await.unwrap();
        assert_eq!(outcome.summary.samples, if accepted { 3 } else { 2 });
    }

    #[tokio::test]
    async fn test_offer_after_finish_fails() {
        let (session, mut producer, mut segments) = RideSession::start(engine(), 16);
        for i in 0..10 {
            producer.offer(MotionSample::new(i as f64 * 0.01, [0.0, 0.0, 9.81])).unwrap();
        }
        session.finish().await.unwrap();

        assert!(matches!(
            producer.offer(MotionSample::new(1.0, [0.0, 0.0, 9.81])),
            Err(GaitError::SessionClosed)
        ));
        let last = segments.recv().await.unwrap();
        assert_eq!(last.start_time, 0.0);
        assert!(segments.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_session_reports_no_data() {
        let (session, _producer, _segments) = RideSession::start(engine(), 4);
        assert!(matches!(session.finish().await, Err(GaitError::NoData)));
    }
}

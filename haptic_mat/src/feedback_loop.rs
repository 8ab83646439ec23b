// THEORY:
// The `feedback_loop` is the runtime shell around the pipeline. It owns the mat
// device and runs strictly sequential cycles:
//
//   request -> read (bounded timeout) -> decode -> analyze -> select -> hand off
//
// Key architectural principles:
// 1.  **One cycle at a time**: The serial exchange is blocking, so the whole loop runs
//     on one blocking task (`spawn_blocking`) rather than on the async workers. No
//     two cycles ever overlap and nobody else touches the device.
// 2.  **Channels at the edges**: A `watch` channel carries the stop request in, a
//     bounded `mpsc` channel carries each cycle's flags out to the actuation
//     transport. Dropping the receiver also stops the loop.
// 3.  **Cancellation between cycles**: The stop flag is checked before each request
//     and while a hand-off waits for room in the channel, so a receiver that stops
//     draining cannot pin the loop. An in-flight read is only ever bounded by the
//     port's read timeout.

use crate::config::MatConfig;
use crate::core_modules::actuator_selector::ActuatorFlags;
use crate::core_modules::mat_device::{MatDevice, MatTransport};
use crate::error::{MatError, Result};
use crate::pipeline::{CycleReport, PosturePipeline};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// How long a hand-off waits before retrying a full channel.
const HANDOFF_RETRY: Duration = Duration::from_millis(5);

/// What became of one cycle's flags.
enum HandOff {
    Delivered,
    Stopped,
    Closed,
}

/// Queues `flags` for the actuation transport, giving up if the loop is stopped
/// while the channel is full.
fn hand_off(
    sink: &mpsc::Sender<ActuatorFlags>,
    stop: &watch::Receiver<bool>,
    flags: ActuatorFlags,
) -> HandOff {
    loop {
        match sink.try_send(flags) {
            Ok(()) => return HandOff::Delivered,
            Err(TrySendError::Closed(_)) => return HandOff::Closed,
            Err(TrySendError::Full(_)) => {
                if *stop.borrow() {
                    return HandOff::Stopped;
                }
                std::thread::sleep(HANDOFF_RETRY);
            }
        }
    }
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub cycles: u64,
    pub corrected: u64,
    pub skipped: u64,
}

pub struct FeedbackLoop<T: MatTransport> {
    device: MatDevice<T>,
    pipeline: PosturePipeline,
    cycle_interval: Duration,
}

impl<T: MatTransport + 'static> FeedbackLoop<T> {
    pub fn new(device: MatDevice<T>, config: &MatConfig) -> Self {
        Self {
            device,
            pipeline: PosturePipeline::from_config(config),
            cycle_interval: Duration::from_millis(config.feedback.cycle_interval_ms),
        }
    }

    /// One request/response exchange followed by the full analysis.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let reading = self.device.get_pressure_matrix();
        self.pipeline.generate_report(reading)
    }

    /// Runs cycles on the current thread until stopped, the flag receiver goes
    /// away, or the device fails. Must not be called from an async context.
    pub fn run_blocking(
        mut self,
        stop: watch::Receiver<bool>,
        sink: mpsc::Sender<ActuatorFlags>,
    ) -> Result<LoopSummary> {
        let mut summary = LoopSummary::default();
        info!("feedback loop started");

        while !*stop.borrow() {
            let report = self.run_cycle()?;
            summary.cycles += 1;
            if report.is_skipped() {
                summary.skipped += 1;
            } else {
                summary.corrected += 1;
            }

            match hand_off(&sink, &stop, report.flags()) {
                HandOff::Delivered => {}
                HandOff::Stopped => {
                    debug!("stopped while the actuation channel was full");
                    break;
                }
                HandOff::Closed => {
                    debug!("actuation transport closed");
                    break;
                }
            }
            if *stop.borrow() {
                break;
            }
            if !self.cycle_interval.is_zero() {
                std::thread::sleep(self.cycle_interval);
            }
        }

        info!(
            cycles = summary.cycles,
            corrected = summary.corrected,
            skipped = summary.skipped,
            "feedback loop stopped"
        );
        Ok(summary)
    }

    /// Starts the loop on the blocking pool of the current tokio runtime.
    pub fn spawn(self, sink: mpsc::Sender<ActuatorFlags>) -> FeedbackHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::task::spawn_blocking(move || self.run_blocking(stop_rx, sink));
        FeedbackHandle { stop_tx, task }
    }
}

/// Control handle for a spawned loop.
pub struct FeedbackHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<Result<LoopSummary>>,
}

impl FeedbackHandle {
    /// Asks the loop to finish after the current cycle.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Waits for the loop to end on its own (device error or closed transport).
    pub async fn join(self) -> Result<LoopSummary> {
        self.task
            .await
            .map_err(|e| MatError::Task(e.to_string()))?
    }

    pub async fn shutdown(self) -> Result<LoopSummary> {
        self.stop();
        self.join().await
    }
}

/// Creates the flag channel sized from the configuration.
pub fn actuator_channel(
    config: &MatConfig,
) -> (mpsc::Sender<ActuatorFlags>, mpsc::Receiver<ActuatorFlags>) {
    mpsc::channel(config.feedback.channel_capacity.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_decoder::encode_frame;
    use crate::core_modules::mat_device::{ReplayStep, ReplayTransport};

    fn config() -> MatConfig {
        let mut config = MatConfig::default();
        config.feedback.cycle_interval_ms = 0;
        config
    }

    #[test]
    fn run_cycle_returns_flags_for_a_frame() {
        let frame = encode_frame(&[(1, 0, 1), (1, 2, 2)]);
        let transport = ReplayTransport::new([ReplayStep::Respond(frame)]);
        let mut feedback = FeedbackLoop::new(MatDevice::new(transport), &config());
        let report = feedback.run_cycle().unwrap();
        assert!(!report.is_skipped());
        assert!(report.flags().thumb && report.flags().wrist);
    }

    #[test]
    fn run_cycle_skips_when_the_mat_is_silent() {
        let mut feedback = FeedbackLoop::new(MatDevice::new(ReplayTransport::new([])), &config());
        let report = feedback.run_cycle().unwrap();
        assert!(report.is_skipped());
        assert!(report.flags().is_neutral());
    }

    #[test]
    fn loop_stops_when_the_receiver_is_dropped() {
        let transport = ReplayTransport::new([ReplayStep::Silence, ReplayStep::Silence]);
        let feedback = FeedbackLoop::new(MatDevice::new(transport), &config());
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (sink, receiver) = mpsc::channel(1);
        drop(receiver);

        let summary = feedback.run_blocking(stop_rx, sink).unwrap();
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn loop_does_not_start_when_already_stopped() {
        let feedback = FeedbackLoop::new(MatDevice::new(ReplayTransport::new([])), &config());
        let (_stop_tx, stop_rx) = watch::channel(true);
        let (sink, _receiver) = mpsc::channel(1);
        assert_eq!(feedback.run_blocking(stop_rx, sink).unwrap(), LoopSummary::default());
    }

    #[test]
    fn full_channel_does_not_outlive_a_stop() {
        let feedback = FeedbackLoop::new(MatDevice::new(ReplayTransport::new([])), &config());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (sink, receiver) = mpsc::channel(1);

        let worker = std::thread::spawn(move || feedback.run_blocking(stop_rx, sink));
        while receiver.len() < 1 {
            std::thread::sleep(Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(30));
        stop_tx.send(true).unwrap();

        let summary = worker.join().unwrap().unwrap();
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn device_failure_ends_the_loop_with_an_error() {
        let transport = ReplayTransport::new([ReplayStep::Disconnect]);
        let feedback = FeedbackLoop::new(MatDevice::new(transport), &config());
        let (_stop_tx, stop_rx) = watch::channel(false);
        let (sink, _receiver) = mpsc::channel(4);
        assert!(matches!(
            feedback.run_blocking(stop_rx, sink),
            Err(MatError::Device(_))
        ));
    }
}

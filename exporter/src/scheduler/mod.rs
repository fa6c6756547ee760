//! Measurement scheduler
//!
//! Runs one probe cycle at a time:
//! - run the primary probe built from configuration
//! - on failure, retry once without the pinned server when fallback is on
//! - write the result into the metrics sink (`up` last)
//! - sleep for the scrape interval, waking early on cancellation
//!
//! No cycle failure leaves this module; the only visible effect is `up = 0`
//! and a log line.

use crate::metrics::MetricsSink;
use crate::probe::{ProbeConfig, Prober};
use payload::{FailureKind, MeasurementResult, ProbeOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Sleeping,
    ShuttingDown,
    Terminated,
}

/// Which attempt within a cycle produced an outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Primary,
    Fallback,
}

/// Summary of one cycle, mostly for logging and tests
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Failure kind per attempt, `None` for the attempt that succeeded
    pub attempts: Vec<(Stage, Option<FailureKind>)>,
    pub succeeded: bool,
}

impl CycleReport {
    pub fn invocations(&self) -> usize {
        self.attempts.len()
    }
}

/// Scheduling knobs taken from the process configuration
#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    pub primary: ProbeConfig,
    pub use_fallback: bool,
    pub interval: Duration,
}

pub struct Scheduler<P> {
    prober: P,
    sink: Arc<MetricsSink>,
    settings: ScheduleSettings,
    cancel: CancellationToken,
    state: SchedulerState,
}

impl<P: Prober> Scheduler<P> {
    pub fn new(
        prober: P,
        sink: Arc<MetricsSink>,
        settings: ScheduleSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            prober,
            sink,
            settings,
            cancel,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!("Scheduler state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Loop until cancelled. A cycle that has started always finishes.
    pub async fn run(&mut self) {
        info!(
            "Starting measurement loop (interval: {}s, fallback: {})",
            self.settings.interval.as_secs(),
            self.fallback_applies()
        );

        while !self.cancel.is_cancelled() {
            self.transition(SchedulerState::Running);
            self.run_cycle().await;

            self.transition(SchedulerState::Sleeping);
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        self.transition(SchedulerState::ShuttingDown);
        info!("Measurement loop stopped");
        self.transition(SchedulerState::Terminated);
    }

    /// Fallback only makes sense when a specific server was pinned
    fn fallback_applies(&self) -> bool {
        self.settings.use_fallback && self.settings.primary.target_server.is_some()
    }

    /// Run the primary probe and, if needed, one fallback probe, then
    /// update the sink.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut attempts = Vec::with_capacity(2);

        let primary = self.prober.run(&self.settings.primary).await;
        let failure = match primary {
            ProbeOutcome::Success(result) => {
                attempts.push((Stage::Primary, None));
                self.publish(&result, Stage::Primary).await;
                return CycleReport {
                    attempts,
                    succeeded: true,
                };
            }
            ProbeOutcome::Failure(failure) => failure,
        };

        attempts.push((Stage::Primary, Some(failure.kind)));
        error!("Speedtest failed ({}): {}", failure.kind, failure.detail);

        if !self.fallback_applies() {
            self.sink.record_failure().await;
            return CycleReport {
                attempts,
                succeeded: false,
            };
        }

        info!("Retrying speedtest without pinned server...");
        let fallback_config = self.settings.primary.without_server();

        let succeeded = match self.prober.run(&fallback_config).await {
            ProbeOutcome::Success(result) => {
                attempts.push((Stage::Fallback, None));
                self.publish(&result, Stage::Fallback).await;
                true
            }
            ProbeOutcome::Failure(failure) => {
                attempts.push((Stage::Fallback, Some(failure.kind)));
                error!(
                    "Fallback speedtest failed ({}): {}; no server reachable",
                    failure.kind, failure.detail
                );
                self.sink.record_failure().await;
                false
            }
        };

        CycleReport {
            attempts,
            succeeded,
        }
    }

    async fn publish(&self, result: &MeasurementResult, stage: Stage) {
        self.sink.record_success(result).await;

        info!(
            "Server used: ID={}, Name={}",
            result.server.id, result.server.name
        );
        match stage {
            Stage::Primary => info!(
                "Speedtest completed: down {:.2} Mbit/s, up {:.2} Mbit/s, ping {:.2} ms",
                result.download_mbps(),
                result.upload_mbps(),
                result.ping_ms
            ),
            Stage::Fallback => warn!(
                "Fallback speedtest completed: down {:.2} Mbit/s, up {:.2} Mbit/s, ping {:.2} ms",
                result.download_mbps(),
                result.upload_mbps(),
                result.ping_ms
            ),
        }
    }
}

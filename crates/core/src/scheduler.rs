//! Scheduler: repeated pipeline runs on a fixed period.
//!
//! The scheduler counts passed, failed and missed runs. A run that returns
//! a journal counts as passed, even when optional components failed inside
//! it; a run that errors counts as failed. When a tick's target time is
//! already in the past the missed counter increments and the run starts
//! immediately.
//!
//! Ctrl-C never cancels a run mid-flight: the stop request is honoured at
//! the next tick evaluation, and an interrupted sleep returns control to
//! the stop check.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::sync::Notify;

use crate::definition::ScheduleDefinition;
use crate::pipeline::Pipeline;
use crate::{Error, Result};

/// Categorized run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerRuns {
    /// Runs that returned a journal
    pub passed: u64,
    /// Runs that raised a pipeline error
    pub failed: u64,
    /// Ticks whose target time had already passed at evaluation
    pub missed: u64,
}

/// Drives repeated runs of one pipeline
pub struct Scheduler {
    pipeline: Pipeline,
    frequency: Duration,
    samples: Option<u64>,
    start: Option<u64>,
    stop_on_failure: bool,
    runs: SchedulerRuns,
    last_run_epoch: Option<u64>,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, schedule: &ScheduleDefinition) -> Self {
        tracing::info!(
            "Scheduler created for pipeline {}: frequency {}, samples {:?}",
            pipeline.name(),
            humantime::format_duration(schedule.frequency),
            schedule.samples,
        );
        Self {
            pipeline,
            frequency: schedule.frequency,
            samples: schedule.samples,
            start: schedule.start,
            stop_on_failure: schedule.stop_on_failure,
            runs: SchedulerRuns::default(),
            last_run_epoch: None,
        }
    }

    /// Current run counters
    pub fn runs(&self) -> SchedulerRuns {
        self.runs
    }

    /// Epoch seconds of the last started run
    pub fn last_run_epoch(&self) -> Option<u64> {
        self.last_run_epoch
    }

    /// Run the scheduling loop until the sample count is reached, a failure
    /// stops it, or the process receives Ctrl-C.
    pub async fn run(&mut self) -> Result<()> {
        let shutdown = Shutdown::install();

        if let Some(start) = self.start {
            let now = epoch_now();
            if start <= now {
                return Err(Error::InvalidDefinition(format!(
                    "schedule start time {} is not in the future",
                    start
                )));
            }
            let delay = Duration::from_secs(start - now);
            tracing::info!(
                "Pipeline scheduled to run in {} ...",
                humantime::format_duration(delay)
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.wait() => {
                    tracing::info!("Interrupted before the first run, exiting ...");
                    return Ok(());
                }
            }
        } else {
            tracing::info!("Pipeline scheduled immediately ...");
        }

        loop {
            let tick_started = Instant::now();
            self.last_run_epoch = Some(epoch_now());

            match self.pipeline.run().await {
                Ok(_) => {
                    self.runs.passed += 1;
                }
                Err(err) => {
                    tracing::error!("Pipeline {} failed: {}", self.pipeline.name(), err);
                    self.runs.failed += 1;
                    if self.stop_on_failure {
                        return Err(Error::SchedulerStopOnFailure {
                            failed: self.runs.failed,
                        });
                    }
                }
            }

            if let Some(samples) = self.samples {
                if self.runs.passed >= samples {
                    tracing::info!(
                        "Pipeline {} collected {} samples successfully. {} executions \
                         failed, {} executions missed. Exiting ...",
                        self.pipeline.name(),
                        self.runs.passed,
                        self.runs.failed,
                        self.runs.missed,
                    );
                    return Ok(());
                }
            }

            if shutdown.requested() {
                tracing::info!(
                    "Interrupted. {} passed, {} failed, {} missed. Exiting ...",
                    self.runs.passed,
                    self.runs.failed,
                    self.runs.missed,
                );
                return Ok(());
            }

            let target = tick_started + self.frequency;
            let now = Instant::now();
            if target <= now {
                self.runs.missed += 1;
                tracing::info!(
                    "Next run missed. Starting pipeline {} immediately ...",
                    self.pipeline.name()
                );
                continue;
            }

            tracing::info!(
                "Scheduling next pipeline run in {} ({} passed, {} failed, {} missed)",
                humantime::format_duration(target - now),
                self.runs.passed,
                self.runs.failed,
                self.runs.missed,
            );
            tokio::select! {
                _ = tokio::time::sleep(target - now) => {}
                _ = shutdown.wait() => {
                    tracing::info!(
                        "Interrupted. {} passed, {} failed, {} missed. Exiting ...",
                        self.runs.passed,
                        self.runs.failed,
                        self.runs.missed,
                    );
                    return Ok(());
                }
            }
        }
    }
}

/// Ctrl-C listener decoupled from the scheduling loop, so a signal arriving
/// mid-run is remembered until the next stop check.
struct Shutdown {
    stop: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    fn install() -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());

        let stop_flag = stop.clone();
        let notifier = notify.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                stop_flag.store(true, Ordering::SeqCst);
                // notify_one stores a permit, so a waiter that registers
                // later still observes the signal
                notifier.notify_one();
            }
        });

        Self { stop, notify }
    }

    fn requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        self.notify.notified().await;
    }
}

fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

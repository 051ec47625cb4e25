//! Periodic re-fetch covering silent push channels.
//!
//! A [`PollingFallback`] owns one background task per started schedule.
//! The first fetch happens one interval after `start`; the initial load is
//! the caller's job. Fetch failures are logged and the next tick retries.
//! Once `stop` returns, no further fetch is started and no result from an
//! in-flight fetch is delivered.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::domain::SubjectId;
use crate::error::SyncError;

#[derive(Debug)]
struct Schedule {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Background re-fetch schedule for one subject.
#[derive(Debug, Default)]
pub struct PollingFallback {
    schedule: Option<Schedule>,
}

impl PollingFallback {
    /// Creates a stopped fallback.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts fetching every `interval`, replacing any running schedule.
    ///
    /// `fetch` is called with `subject_id` on each tick; each successful
    /// result is handed to `on_result` unless the schedule was stopped while
    /// the fetch ran. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for a zero interval.
    pub fn start<S, F, Fut, H>(
        &mut self,
        subject_id: SubjectId,
        interval: Duration,
        fetch: F,
        on_result: H,
    ) -> Result<(), SyncError>
    where
        S: Send + 'static,
        F: Fn(SubjectId) -> Fut + Send + 'static,
        Fut: Future<Output = Result<S, SyncError>> + Send + 'static,
        H: Fn(S) + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        self.stop();

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut failures: u32 = 0;
            loop {
                ticker.tick().await;
                if !flag.load(Ordering::Acquire) {
                    break;
                }
                match fetch(subject_id.clone()).await {
                    Ok(result) => {
                        failures = 0;
                        if !flag.load(Ordering::Acquire) {
                            break;
                        }
                        on_result(result);
                    }
                    Err(err) => {
                        failures = failures.saturating_add(1);
                        tracing::warn!(
                            %subject_id,
                            error = %err,
                            consecutive_failures = failures,
                            "poll fetch failed; retrying next tick"
                        );
                    }
                }
            }
            tracing::debug!(%subject_id, "polling stopped");
        });

        tracing::debug!(interval_ms = interval.as_millis(), "polling started");
        self.schedule = Some(Schedule { running, task });
        Ok(())
    }

    /// Cancels the schedule. Idempotent.
    pub fn stop(&mut self) {
        if let Some(schedule) = self.schedule.take() {
            schedule.running.store(false, Ordering::Release);
            schedule.task.abort();
        }
    }

    /// Returns `true` while a schedule is active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.schedule
            .as_ref()
            .is_some_and(|schedule| schedule.running.load(Ordering::Acquire))
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}

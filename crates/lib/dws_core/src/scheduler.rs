//! Lifecycle shared by the background tasks.
//!
//! A [`PeriodicTask`] runs a job immediately on `start()` and then on every
//! interval tick until `stop()`. Stopping cancels any pending wait (and an
//! in-flight job) and joins the task. `stop()` on a stopped task is a no-op.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long `stop()` waits for the task to wind down.
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Background task lifecycle errors.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    #[error("{0} did not stop within {1:?}")]
    Timeout(&'static str, Duration),

    #[error("{0} task failed: {1}")]
    Join(&'static str, String),
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PeriodicTask {
    name: &'static str,
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl PeriodicTask {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            running: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the loop. `job` is invoked once per tick, the first time
    /// immediately.
    pub async fn start<F, Fut>(&self, job: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return Err(SchedulerError::AlreadyRunning(self.name));
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = self.name;
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                debug!(task = name, "tick");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = job() => {}
                }
            }
            debug!(task = name, "loop exited");
        });

        *running = Some(Running { cancel, handle });
        info!(task = self.name, interval_secs = self.interval.as_secs(), "started");
        Ok(())
    }

    /// Cancel and join. Idempotent.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let Some(Running { cancel, mut handle }) = self.running.lock().await.take() else {
            return Ok(());
        };
        cancel.cancel();

        match tokio::time::timeout(JOIN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => {
                info!(task = self.name, "stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(SchedulerError::Join(self.name, e.to_string())),
            Err(_) => {
                warn!(task = self.name, "did not stop in time; aborting");
                handle.abort();
                Err(SchedulerError::Timeout(self.name, JOIN_TIMEOUT))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|r| !r.handle.is_finished()))
            .unwrap_or(false)
    }
}

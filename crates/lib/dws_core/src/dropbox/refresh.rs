//! Background Dropbox token refresher.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::DropboxError;
use super::manager::TokenManager;
use crate::scheduler::{PeriodicTask, SchedulerError};

/// Refresher tunables.
#[derive(Debug, Clone)]
pub struct RefreshSchedulerConfig {
    /// Shorter than the provider's 4 h access-token lifetime.
    pub interval: Duration,
}

impl Default for RefreshSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3 * 60 * 60),
        }
    }
}

/// Calls [`TokenManager::ensure_fresh`] on a fixed cadence. Failures are
/// logged and accounted by the manager; they never stop the loop.
pub struct RefreshScheduler {
    manager: Arc<TokenManager>,
    task: PeriodicTask,
}

impl RefreshScheduler {
    pub fn new(manager: Arc<TokenManager>, config: RefreshSchedulerConfig) -> Self {
        Self {
            manager,
            task: PeriodicTask::new("dropbox-refresh", config.interval),
        }
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        let manager = Arc::clone(&self.manager);
        self.task
            .start(move || {
                let manager = Arc::clone(&manager);
                async move { refresh_once(&manager).await }
            })
            .await?;
        self.manager.set_background_refresh(true);
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), SchedulerError> {
        self.manager.set_background_refresh(false);
        self.task.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

async fn refresh_once(manager: &TokenManager) {
    match manager.ensure_fresh().await {
        Ok(_) => debug!("dropbox token is fresh"),
        Err(DropboxError::NotConfigured) => debug!("dropbox not configured; nothing to refresh"),
        Err(DropboxError::NeedsReauth) => {
            warn!("dropbox needs re-authorization; background refresh skipped")
        }
        Err(e) => info!(error = %e, "background dropbox refresh failed"),
    }
}

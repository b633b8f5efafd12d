//! Periodic sweep of expired sessions and reset tickets.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::store::SessionStore;
use crate::clock::Clock;
use crate::reset::ResetPolicy;
use crate::reset::store::ResetStore;
use crate::scheduler::{PeriodicTask, SchedulerError};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Rows removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub tickets: u64,
}

pub struct Housekeeper {
    sessions: Arc<dyn SessionStore>,
    tickets: Arc<dyn ResetStore>,
    clock: Arc<dyn Clock>,
    /// Expired tickets younger than this are kept so the reset request caps
    /// still see them.
    ticket_retention: Duration,
    task: PeriodicTask,
}

impl Housekeeper {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        tickets: Arc<dyn ResetStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            sessions,
            tickets,
            clock,
            ticket_retention: ResetPolicy::default().window,
            task: PeriodicTask::new("housekeeping", interval),
        }
    }

    /// Keep reset tickets for at least `retention` after issue. Pass the
    /// reset policy's rate window.
    pub fn with_ticket_retention(mut self, retention: Duration) -> Self {
        self.ticket_retention = retention;
        self
    }

    /// Purge once. A failing store is logged and does not stop the other.
    pub async fn sweep(&self) -> SweepReport {
        sweep(
            self.sessions.as_ref(),
            self.tickets.as_ref(),
            self.clock.as_ref(),
            self.ticket_retention,
        )
        .await
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        let sessions = Arc::clone(&self.sessions);
        let tickets = Arc::clone(&self.tickets);
        let clock = Arc::clone(&self.clock);
        let retention = self.ticket_retention;
        self.task
            .start(move || {
                let sessions = Arc::clone(&sessions);
                let tickets = Arc::clone(&tickets);
                let clock = Arc::clone(&clock);
                async move {
                    sweep(sessions.as_ref(), tickets.as_ref(), clock.as_ref(), retention).await;
                }
            })
            .await
    }

    pub async fn stop(&self) -> Result<(), SchedulerError> {
        self.task.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }
}

async fn sweep(
    sessions: &dyn SessionStore,
    tickets: &dyn ResetStore,
    clock: &dyn Clock,
    ticket_retention: Duration,
) -> SweepReport {
    let now = clock.now();
    let issued_before = match chrono::Duration::from_std(ticket_retention) {
        Ok(retention) => now - retention,
        Err(_) => now,
    };
    let mut report = SweepReport::default();

    match sessions.purge_expired(now).await {
        Ok(n) => report.sessions = n,
        Err(e) => warn!(error = %e, "session purge failed"),
    }
    match tickets.purge_expired(now, issued_before).await {
        Ok(n) => report.tickets = n,
        Err(e) => warn!(error = %e, "reset ticket purge failed"),
    }

    if report.sessions + report.tickets > 0 {
        info!(sessions = report.sessions, tickets = report.tickets, "expired records purged");
    } else {
        debug!("nothing to purge");
    }
    report
}

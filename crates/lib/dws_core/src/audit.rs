//! Best-effort audit trail.
//!
//! Audit writes never fail the operation being audited: a store error is
//! logged and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::clock::Clock;
use crate::models::audit::AuditEvent;
use crate::store::{StoreError, timed};

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError>;
}

/// Stamps and appends audit events.
#[derive(Clone)]
pub struct Auditor {
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl Auditor {
    pub fn new(store: Arc<dyn AuditStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn record(&self, mut event: AuditEvent) {
        event.timestamp = self.clock.now();
        let action = event.action;
        if let Err(e) = self.store.append(event).await {
            warn!(action = %action, error = %e, "failed to write audit event");
        }
    }
}

/// `audit_logs` table access.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, event: AuditEvent) -> Result<(), StoreError> {
        timed(
            sqlx::query(
                "INSERT INTO audit_logs \
                   (id, subject_user_id, actor_user_id, action, ip_address, user_agent, \
                    details, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.id)
            .bind(event.subject_user_id)
            .bind(event.actor_user_id)
            .bind(event.action.as_str())
            .bind(&event.ip_address)
            .bind(&event.user_agent)
            .bind(sqlx::types::Json(&event.details))
            .bind(event.timestamp)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::memory::MemoryAuditStore;
    use crate::models::audit::AuditAction;

    struct FailingStore;

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn append(&self, _event: AuditEvent) -> Result<(), StoreError> {
            Err(StoreError::Timeout(crate::store::DB_TIMEOUT))
        }
    }

    #[tokio::test]
    async fn record_stamps_timestamp() {
        let clock = ManualClock::starting_now();
        let store = Arc::new(MemoryAuditStore::default());
        let auditor = Auditor::new(store.clone(), Arc::new(clock.clone()));

        auditor.record(AuditEvent::new(AuditAction::Logout)).await;

        let events = store.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, clock.now());
    }

    #[tokio::test]
    async fn store_failure_is_swallowed() {
        let auditor = Auditor::new(Arc::new(FailingStore), Arc::new(ManualClock::starting_now()));
        auditor.record(AuditEvent::new(AuditAction::Logout)).await;
    }
}

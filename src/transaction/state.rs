// ============================================================================
// Transaction State Management
// ============================================================================
//
// A transaction is owned by one user, expires unless touched, and ends in
// exactly one terminal state:
//
//   New ──write──> Dirty ──commit────> Committed
//    │               │
//    └───────────────┴──rollback/reap──> RolledBack
//
// Every write and both terminations serialize on the transaction's inner
// lock, so a staged write is never half-applied when a commit, rollback or
// reap runs.
//
// ============================================================================

use super::session::{ResourceSession, VersionService};
use crate::core::{IndexError, Result};
use crate::index::{CommitCoordinator, PromotionSummary};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Opaque, globally unique transaction token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new() -> Self {
        TransactionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        TransactionId(value.to_string())
    }
}

impl From<String> for TransactionId {
    fn from(value: String) -> Self {
        TransactionId(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Begun, nothing written yet
    New,

    /// At least one write went through the transaction
    Dirty,

    Committed,

    RolledBack,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::New => write!(f, "NEW"),
            TransactionState::Dirty => write!(f, "DIRTY"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

struct TransactionInner {
    state: TransactionState,
    session: Box<dyn ResourceSession>,
    versioned_paths: BTreeSet<String>,
}

/// A time-bounded, owner-scoped unit of staged mutation.
pub struct Transaction {
    id: TransactionId,
    owner: String,
    created_at: DateTime<Utc>,
    timeout_ms: i64,
    expires_at_ms: AtomicI64,
    inner: Mutex<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(session: Box<dyn ResourceSession>, owner: &str, timeout: TimeDelta) -> Self {
        let created_at = Utc::now();
        let timeout_ms = timeout.num_milliseconds();
        Self {
            id: TransactionId::new(),
            owner: owner.to_string(),
            created_at,
            timeout_ms,
            expires_at_ms: AtomicI64::new(created_at.timestamp_millis().saturating_add(timeout_ms)),
            inner: Mutex::new(TransactionInner {
                state: TransactionState::New,
                session,
                versioned_paths: BTreeSet::new(),
            }),
        }
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn timeout(&self) -> TimeDelta {
        TimeDelta::milliseconds(self.timeout_ms)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        let millis = self.expires_at_ms.load(Ordering::Acquire);
        DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_associated_with_user(&self, owner: &str) -> bool {
        self.owner == owner
    }

    pub fn has_expired(&self) -> bool {
        self.expires_at_ms.load(Ordering::Acquire) <= Utc::now().timestamp_millis()
    }

    /// Push the expiry one timeout past now.
    pub fn update_expiry(&self) {
        let next = Utc::now().timestamp_millis().saturating_add(self.timeout_ms);
        self.expires_at_ms.store(next, Ordering::Release);
    }

    /// Expire immediately; the next reaper pass rolls the transaction back.
    pub fn expire(&self) {
        self.expires_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    pub async fn state(&self) -> TransactionState {
        self.inner.lock().await.state
    }

    pub async fn versioned_paths(&self) -> Vec<String> {
        self.inner.lock().await.versioned_paths.iter().cloned().collect()
    }

    /// Queue a resource path for a version checkpoint at commit.
    pub async fn add_path_to_version(&self, path: &str) -> Result<()> {
        let mut guard = self.begin_write().await?;
        guard.add_path_to_version(path);
        Ok(())
    }

    /// Lock the transaction for a write.
    ///
    /// Fails with `TransactionMissing` once the transaction is terminal or
    /// expired. Marks it dirty and extends its expiry. Commit, rollback and
    /// reaping wait until the returned guard is dropped.
    pub async fn begin_write(&self) -> Result<TransactionWriteGuard<'_>> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() || self.has_expired() {
            return Err(self.missing());
        }
        inner.state = TransactionState::Dirty;
        self.update_expiry();
        Ok(TransactionWriteGuard { id: &self.id, inner })
    }

    pub(crate) async fn commit(
        &self,
        coordinator: &CommitCoordinator,
        versions: &dyn VersionService,
    ) -> Result<PromotionSummary> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
            return Err(self.missing());
        }

        let summary = match self.promote_and_save(&mut inner, coordinator).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(tx = %self.id, error = %err, "Commit failed, rolling back");
                if let Err(discard_err) = coordinator.discard(&self.id).await {
                    error!(tx = %self.id, error = %discard_err, "Failed to discard staged rows");
                }
                if let Err(refresh_err) = inner.session.refresh(true).await {
                    error!(tx = %self.id, error = %refresh_err, "Failed to revert session");
                }
                inner.session.logout().await;
                inner.state = TransactionState::RolledBack;
                return Err(err);
            }
        };

        let paths = std::mem::take(&mut inner.versioned_paths);
        let mut failed = Vec::new();
        for path in &paths {
            if let Err(err) = versions.queue_checkpoint(path).await {
                error!(tx = %self.id, path = %path, error = %err, "Failed to queue checkpoint");
                failed.push(path.as_str());
            }
        }

        inner.session.logout().await;
        inner.state = TransactionState::Committed;
        info!(
            tx = %self.id,
            merged = summary.merged,
            deleted = summary.deleted,
            checkpoints = paths.len(),
            "Committed transaction"
        );

        if failed.is_empty() {
            Ok(summary)
        } else {
            Err(IndexError::Versioning(format!(
                "transaction {} committed but checkpoints failed for: {}",
                self.id,
                failed.join(", ")
            )))
        }
    }

    /// Open the ambient database transaction, promote, save the session and
    /// commit. Dropping the database transaction on error rolls it back.
    async fn promote_and_save(
        &self,
        inner: &mut TransactionInner,
        coordinator: &CommitCoordinator,
    ) -> Result<PromotionSummary> {
        let mut db_tx = coordinator.database().begin().await?;
        let summary = coordinator.promote(&mut db_tx, &self.id).await?;
        inner.session.save().await?;
        db_tx.commit().await?;
        Ok(summary)
    }

    /// Every step is attempted; the first failure is returned.
    pub(crate) async fn rollback(&self, coordinator: &CommitCoordinator) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
            return Err(self.missing());
        }

        let discarded = coordinator.discard(&self.id).await;
        let refreshed = inner.session.refresh(true).await;
        inner.session.logout().await;
        inner.state = TransactionState::RolledBack;
        inner.versioned_paths.clear();
        info!(tx = %self.id, owner = %self.owner, "Rolled back transaction");

        discarded.and(refreshed)
    }

    fn missing(&self) -> IndexError {
        IndexError::TransactionMissing(self.id.to_string())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at())
            .finish_non_exhaustive()
    }
}

/// Exclusive write access to a live transaction.
pub struct TransactionWriteGuard<'a> {
    id: &'a TransactionId,
    inner: MutexGuard<'a, TransactionInner>,
}

impl<'a> TransactionWriteGuard<'a> {
    pub fn id(&self) -> &'a TransactionId {
        self.id
    }

    pub fn session(&mut self) -> &mut dyn ResourceSession {
        self.inner.session.as_mut()
    }

    pub fn add_path_to_version(&mut self, path: impl Into<String>) {
        self.inner.versioned_paths.insert(path.into());
    }
}

impl fmt::Debug for TransactionWriteGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionWriteGuard")
            .field("id", self.id)
            .field("state", &self.inner.state)
            .finish_non_exhaustive()
    }
}

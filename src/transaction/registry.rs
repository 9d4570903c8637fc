// ============================================================================
// Transaction Registry
// ============================================================================
//
// In-process map of live transactions. Commit, rollback and reaping all start
// by removing the entry under the write lock: whoever removes it first owns
// the termination, everybody else sees `TransactionMissing`.
//
// A claimed transaction stays in the terminating set until its commit or
// rollback returns, and orphan purges hold the write lock for their whole
// run, so a purge never sees the staging rows of a registered or
// terminating transaction as orphaned.
//
// Not shared across processes.
//
// ============================================================================

use super::session::{ResourceSession, VersionService};
use super::state::{Transaction, TransactionId};
use crate::core::{IndexError, Result};
use crate::index::{CommitCoordinator, PromotionSummary};
use chrono::TimeDelta;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Expired transactions removed and rolled back cleanly
    pub reaped: usize,
    /// Expired transactions removed whose rollback failed
    pub failed: usize,
    /// Another pass was already running
    pub skipped: bool,
}

pub struct TransactionRegistry {
    transactions: RwLock<HashMap<TransactionId, Arc<Transaction>>>,
    terminating: Mutex<HashSet<TransactionId>>,
    coordinator: Arc<CommitCoordinator>,
    versions: Arc<dyn VersionService>,
    default_timeout: TimeDelta,
    reaping: AtomicBool,
}

/// Clears the in-progress flag even if a pass unwinds.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A claimed transaction whose commit or rollback has not returned yet.
struct Claimed<'a> {
    tx: Arc<Transaction>,
    terminating: &'a Mutex<HashSet<TransactionId>>,
}

impl<'a> Claimed<'a> {
    fn new(tx: Arc<Transaction>, terminating: &'a Mutex<HashSet<TransactionId>>) -> Self {
        terminating
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tx.id().clone());
        Self { tx, terminating }
    }
}

impl Drop for Claimed<'_> {
    fn drop(&mut self) {
        self.terminating
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.tx.id());
    }
}

impl TransactionRegistry {
    pub fn new(
        coordinator: Arc<CommitCoordinator>,
        versions: Arc<dyn VersionService>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            terminating: Mutex::new(HashSet::new()),
            coordinator,
            versions,
            default_timeout: TimeDelta::from_std(default_timeout).unwrap_or(TimeDelta::MAX),
            reaping: AtomicBool::new(false),
        }
    }

    pub fn default_timeout(&self) -> TimeDelta {
        self.default_timeout
    }

    pub async fn begin(&self, session: Box<dyn ResourceSession>, owner: &str) -> Arc<Transaction> {
        self.begin_with_timeout(session, owner, self.default_timeout).await
    }

    /// Begin with a custom lifetime. A negative timeout yields a transaction
    /// that is already expired.
    pub async fn begin_with_timeout(
        &self,
        session: Box<dyn ResourceSession>,
        owner: &str,
        timeout: TimeDelta,
    ) -> Arc<Transaction> {
        let tx = Arc::new(Transaction::new(session, owner, timeout));
        self.transactions
            .write()
            .await
            .insert(tx.id().clone(), Arc::clone(&tx));
        info!(tx = %tx.id(), owner, expires_at = %tx.expires_at(), "Began transaction");
        tx
    }

    /// Fetch a live transaction of `owner` and extend its expiry.
    ///
    /// Unknown ids, foreign owners and expired transactions all fail with
    /// `TransactionMissing`.
    pub async fn get(&self, id: &TransactionId, owner: &str) -> Result<Arc<Transaction>> {
        let transactions = self.transactions.read().await;
        match transactions.get(id) {
            Some(tx) if tx.is_associated_with_user(owner) && !tx.has_expired() => {
                tx.update_expiry();
                Ok(Arc::clone(tx))
            }
            _ => Err(IndexError::TransactionMissing(id.to_string())),
        }
    }

    pub async fn exists(&self, id: &TransactionId) -> bool {
        self.transactions
            .read()
            .await
            .get(id)
            .is_some_and(|tx| !tx.has_expired())
    }

    pub async fn len(&self) -> usize {
        self.transactions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Number of claimed transactions whose commit or rollback is running.
    pub fn terminating(&self) -> usize {
        self.terminating
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Commit a live transaction. An expired one is left to the reaper.
    pub async fn commit(&self, id: &TransactionId) -> Result<PromotionSummary> {
        let claimed = self.claim(id, false).await?;
        claimed
            .tx
            .commit(&self.coordinator, self.versions.as_ref())
            .await
    }

    pub async fn rollback(&self, id: &TransactionId) -> Result<()> {
        let claimed = self.claim(id, true).await?;
        claimed.tx.rollback(&self.coordinator).await
    }

    /// Remove staging rows that belong to no registered or terminating
    /// transaction. Begins and claims wait until the purge is over.
    pub async fn purge_orphans(&self) -> Result<u64> {
        let transactions = self.transactions.write().await;
        let mut live: Vec<TransactionId> = transactions.keys().cloned().collect();
        live.extend(
            self.terminating
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned(),
        );

        let purged = self.coordinator.purge_orphans(&live).await?;
        drop(transactions);
        Ok(purged)
    }

    /// One reaper pass: remove every expired entry, then roll each back.
    ///
    /// Rollback failures are logged and counted; they never stop the pass.
    /// Returns immediately when a pass is already running.
    pub async fn reap_expired(&self) -> ReapReport {
        if self
            .reaping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Reaper pass already running, skipping");
            return ReapReport {
                skipped: true,
                ..ReapReport::default()
            };
        }
        let _pass = PassGuard(&self.reaping);

        let mut expired = Vec::new();
        self.transactions.write().await.retain(|_, tx| {
            if tx.has_expired() {
                expired.push(Claimed::new(Arc::clone(tx), &self.terminating));
                false
            } else {
                true
            }
        });

        let mut report = ReapReport::default();
        for claimed in expired {
            let tx = &claimed.tx;
            match tx.rollback(&self.coordinator).await {
                Ok(()) => report.reaped += 1,
                Err(err) => {
                    error!(
                        tx = %tx.id(),
                        owner = tx.owner(),
                        error = %err,
                        "Failed to roll back expired transaction"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.reaped + report.failed > 0 {
            info!(reaped = report.reaped, failed = report.failed, "Reaped expired transactions");
        }
        report
    }

    /// Roll back every registered transaction, e.g. at shutdown.
    pub async fn rollback_all(&self) -> usize {
        let drained: Vec<Claimed<'_>> = self
            .transactions
            .write()
            .await
            .drain()
            .map(|(_, tx)| Claimed::new(tx, &self.terminating))
            .collect();

        let count = drained.len();
        for claimed in drained {
            if let Err(err) = claimed.tx.rollback(&self.coordinator).await {
                error!(
                    tx = %claimed.tx.id(),
                    error = %err,
                    "Failed to roll back transaction at shutdown"
                );
            }
        }
        count
    }

    async fn claim(&self, id: &TransactionId, allow_expired: bool) -> Result<Claimed<'_>> {
        let mut transactions = self.transactions.write().await;
        let claimable = transactions
            .get(id)
            .is_some_and(|tx| allow_expired || !tx.has_expired());
        if !claimable {
            return Err(IndexError::TransactionMissing(id.to_string()));
        }
        let tx = transactions
            .remove(id)
            .ok_or_else(|| IndexError::TransactionMissing(id.to_string()))?;
        // Registered before the write lock drops, so purges always see it.
        Ok(Claimed::new(tx, &self.terminating))
    }
}

// ============================================================================
// txsearch Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod index;
pub mod transaction;

// Re-export main types for convenience
pub use connection::IndexDatabase;
pub use connection::config::RepositoryConfig;
pub use connection::dialect::{DbKind, SqlTemplates};
pub use core::{FedoraId, IndexError, IndexRecord, Operation, Result};
pub use index::{
    CommitCoordinator, Condition, Field, Operator, PaginationInfo, SearchHit, SearchIndex,
    SearchParameters, SearchResult, SortOrder,
};
pub use transaction::{
    DetachedSession, NoVersioning, ReapReport, ResourceSession, Transaction, TransactionId,
    TransactionReaper, TransactionRegistry, TransactionState, VersionService, spawn_reaper,
};

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

// ============================================================================
// Repository
// ============================================================================

/// Process-wide wiring of the search index and its transactions
///
/// Built once at startup and handed around by reference; every component it
/// creates is reachable through it.
///
/// # Examples
///
/// ```no_run
/// use txsearch::{
///     Condition, DetachedSession, FedoraId, IndexRecord, NoVersioning, Repository,
///     RepositoryConfig, SearchParameters,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> txsearch::Result<()> {
/// let repo = Repository::open(RepositoryConfig::in_memory(), Arc::new(NoVersioning)).await?;
///
/// let tx = repo.transactions().begin(Box::new(DetachedSession), "alice").await;
/// let record = IndexRecord::new(FedoraId::new("info:fedora/x")?).mime_type("text/plain");
/// repo.index().add_update(Some(&tx), &record).await?;
/// repo.transactions().commit(tx.id()).await?;
///
/// let params = SearchParameters::new().condition(Condition::parse("fedora_id=info:fedora/x")?);
/// let found = repo.index().search(&params).await?;
/// assert_eq!(found.items.len(), 1);
///
/// repo.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct Repository {
    config: RepositoryConfig,
    db: IndexDatabase,
    index: Arc<SearchIndex>,
    coordinator: Arc<CommitCoordinator>,
    registry: Arc<TransactionRegistry>,
    reaper: Mutex<Option<TransactionReaper>>,
}

impl Repository {
    /// Connect, prepare the schema and start the reaper.
    pub async fn open(config: RepositoryConfig, versions: Arc<dyn VersionService>) -> Result<Self> {
        let db = IndexDatabase::connect(&config).await?;
        db.apply_schema().await?;

        let index = Arc::new(SearchIndex::new(db.clone(), config.type_cache_capacity));
        let coordinator = Arc::new(CommitCoordinator::new(db.clone()));
        let registry = Arc::new(TransactionRegistry::new(
            Arc::clone(&coordinator),
            versions,
            config.transaction_timeout,
        ));

        if config.reconcile_on_startup {
            // Nothing is registered yet, so every staging row is orphaned.
            let purged = registry.purge_orphans().await?;
            if purged > 0 {
                info!(purged, "Purged staging rows left by a previous process");
            }
        }

        let reaper = spawn_reaper(Arc::clone(&registry), config.reap_interval);
        info!(
            dialect = %db.kind(),
            tx_timeout_ms = config.transaction_timeout.as_millis() as u64,
            reap_interval_ms = config.reap_interval.as_millis() as u64,
            "Repository ready"
        );

        Ok(Self {
            config,
            db,
            index,
            coordinator,
            registry,
            reaper: Mutex::new(Some(reaper)),
        })
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn dialect(&self) -> DbKind {
        self.db.kind()
    }

    pub fn database(&self) -> &IndexDatabase {
        &self.db
    }

    pub fn index(&self) -> &Arc<SearchIndex> {
        &self.index
    }

    pub fn coordinator(&self) -> &Arc<CommitCoordinator> {
        &self.coordinator
    }

    pub fn transactions(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// Remove staging rows that belong to no registered transaction.
    pub async fn reconcile(&self) -> Result<u64> {
        self.registry.purge_orphans().await
    }

    /// Stop the reaper, roll back open transactions and close the pool.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(reaper) = self.reaper.lock().await.take() {
            reaper.stop().await?;
        }
        let rolled_back = self.registry.rollback_all().await;
        self.db.close().await;
        info!(rolled_back, "Repository shut down");
        Ok(())
    }
}

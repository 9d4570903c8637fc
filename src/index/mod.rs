// ============================================================================
// Search Index
// ============================================================================
//
// Write surface of the index: mutations inside a user transaction are staged,
// mutations without one go straight to the durable tables. Reads only ever
// see durable rows.
//
// ============================================================================

pub mod catalog;
pub mod commit;
pub mod condition;
pub mod direct;
pub mod search;
pub mod staged;

pub use catalog::TypeCatalog;
pub use commit::{CommitCoordinator, PromotionSummary};
pub use condition::{Condition, ConditionValue, Field, Operator, parse_instant};
pub use direct::DirectIndexWriter;
pub use search::{
    PaginationInfo, SearchExecutor, SearchHit, SearchParameters, SearchResult, SortOrder,
};
pub use staged::StagedIndexWriter;

use crate::connection::IndexDatabase;
use crate::connection::schema::ALL_TABLES;
use crate::core::{FedoraId, IndexRecord, Result};
use crate::transaction::Transaction;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SearchIndex {
    db: IndexDatabase,
    staged: StagedIndexWriter,
    direct: DirectIndexWriter,
    searcher: SearchExecutor,
    types: Arc<TypeCatalog>,
}

impl SearchIndex {
    pub fn new(db: IndexDatabase, type_cache_capacity: usize) -> Self {
        let types = Arc::new(TypeCatalog::new(type_cache_capacity));
        Self {
            staged: StagedIndexWriter::new(db.clone()),
            direct: DirectIndexWriter::new(db.clone(), Arc::clone(&types)),
            searcher: SearchExecutor::new(db.clone()),
            types,
            db,
        }
    }

    pub fn database(&self) -> &IndexDatabase {
        &self.db
    }

    pub fn type_catalog(&self) -> &TypeCatalog {
        &self.types
    }

    /// Index or re-index a resource.
    ///
    /// With a transaction the record is staged and the transaction becomes
    /// dirty; without one it is written durably right away.
    pub async fn add_update(&self, tx: Option<&Transaction>, record: &IndexRecord) -> Result<()> {
        if !record.fedora_id.is_indexable() {
            debug!(fedora_id = %record.fedora_id, "Skipping non-indexable resource");
            return Ok(());
        }

        match tx {
            Some(tx) => {
                let guard = tx.begin_write().await?;
                self.staged.stage_add(guard.id(), record).await
            }
            None => self.direct.add_update(record).await,
        }
    }

    pub async fn remove(&self, tx: Option<&Transaction>, fedora_id: &FedoraId) -> Result<()> {
        if !fedora_id.is_indexable() {
            debug!(fedora_id = %fedora_id, "Skipping non-indexable resource");
            return Ok(());
        }

        match tx {
            Some(tx) => {
                let guard = tx.begin_write().await?;
                self.staged.stage_delete(guard.id(), fedora_id).await
            }
            None => self.direct.remove(fedora_id).await,
        }
    }

    pub async fn search(&self, params: &SearchParameters) -> Result<SearchResult> {
        self.searcher.search(params).await
    }

    /// Empty every index table, staging included.
    pub async fn reset(&self) -> Result<()> {
        let kind = self.db.kind();
        let mut conn = self.db.pool().acquire().await?;
        for table in ALL_TABLES {
            sqlx::query(&kind.truncate(table)).execute(&mut *conn).await?;
        }
        self.types.clear();
        info!(dialect = %kind, "Reset search index");
        Ok(())
    }
}

// ============================================================================
// Commit Coordinator
// ============================================================================
//
// Promotes the staged rows of one transaction into the durable tables, or
// discards them. Promotion never opens its own database transaction: the
// caller supplies the ambient one and decides whether it commits.
//
// Promotion order:
//   1. drop durable rows (and their associations) staged as `delete`
//   2. merge rows staged as `add`
//   3. catalog every staged RDF type
//   4. rebuild the associations of every touched durable row
//   5. purge the transaction's staging rows
//
// ============================================================================

use super::catalog::insert_type;
use crate::connection::dialect::DbKind;
use crate::connection::{DbTransaction, IndexDatabase, SqlParam, bind_params, execute};
use crate::core::Result;
use crate::transaction::TransactionId;
use sqlx::{AnyConnection, Row};
use std::collections::HashSet;
use tracing::debug;

const DELETE_ASSOCIATIONS_OF_STAGED_DELETES: &str = "DELETE FROM search_resource_rdf_type \
    WHERE resource_id IN (SELECT s.id FROM simple_search s \
    INNER JOIN simple_search_transactions t ON t.fedora_id = s.fedora_id \
    WHERE t.transaction_id = ? AND t.operation = 'delete')";

const DELETE_STAGED_DELETES: &str = "DELETE FROM simple_search \
    WHERE fedora_id IN (SELECT t.fedora_id FROM simple_search_transactions t \
    WHERE t.transaction_id = ? AND t.operation = 'delete')";

const SELECT_STAGED_TYPES: &str = "SELECT DISTINCT rdf_type_uri \
    FROM search_resource_rdf_type_transactions WHERE transaction_id = ?";

const DELETE_ASSOCIATIONS_OF_TOUCHED: &str = "DELETE FROM search_resource_rdf_type \
    WHERE resource_id IN (SELECT s.id FROM simple_search s \
    INNER JOIN simple_search_transactions t ON t.fedora_id = s.fedora_id \
    WHERE t.transaction_id = ?)";

const INSERT_STAGED_ASSOCIATIONS: &str = "INSERT INTO search_resource_rdf_type \
    (resource_id, rdf_type_id) \
    SELECT DISTINCT s.id, rt.id FROM search_resource_rdf_type_transactions srt \
    INNER JOIN simple_search s ON s.fedora_id = srt.fedora_id \
    INNER JOIN search_rdf_type rt ON rt.rdf_type_uri = srt.rdf_type_uri \
    WHERE srt.transaction_id = ?";

const PURGE_STAGED_ROWS: &str = "DELETE FROM simple_search_transactions WHERE transaction_id = ?";

const PURGE_STAGED_TYPES: &str =
    "DELETE FROM search_resource_rdf_type_transactions WHERE transaction_id = ?";

const SELECT_STAGED_TRANSACTIONS: &str = "SELECT transaction_id FROM simple_search_transactions \
    UNION SELECT transaction_id FROM search_resource_rdf_type_transactions";

/// Transaction ids per orphan DELETE.
const PURGE_BATCH_SIZE: usize = 100;

/// Row counts of one promotion, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromotionSummary {
    pub deleted: u64,
    pub merged: u64,
    pub types: usize,
    pub associations: u64,
}

pub struct CommitCoordinator {
    db: IndexDatabase,
}

impl CommitCoordinator {
    pub fn new(db: IndexDatabase) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &IndexDatabase {
        &self.db
    }

    /// Run the five promotion steps on the caller's database transaction.
    pub async fn promote(
        &self,
        db_tx: &mut DbTransaction,
        tx_id: &TransactionId,
    ) -> Result<PromotionSummary> {
        let kind = self.db.kind();
        let conn: &mut AnyConnection = db_tx;
        let mut summary = PromotionSummary::default();

        execute(
            conn,
            &kind.prepare(DELETE_ASSOCIATIONS_OF_STAGED_DELETES),
            tx_param(tx_id),
        )
        .await?;
        summary.deleted =
            execute(conn, &kind.prepare(DELETE_STAGED_DELETES), tx_param(tx_id)).await?;

        summary.merged = execute(conn, kind.templates().commit_merge, tx_param(tx_id)).await?;

        let select = kind.prepare(SELECT_STAGED_TYPES);
        let rows = bind_params(sqlx::query(&select), tx_param(tx_id))
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            let uri: String = row.try_get("rdf_type_uri")?;
            insert_type(conn, kind, &uri).await?;
        }
        summary.types = rows.len();

        execute(
            conn,
            &kind.prepare(DELETE_ASSOCIATIONS_OF_TOUCHED),
            tx_param(tx_id),
        )
        .await?;
        summary.associations = execute(
            conn,
            &kind.prepare(INSERT_STAGED_ASSOCIATIONS),
            tx_param(tx_id),
        )
        .await?;

        purge(conn, kind, tx_id).await?;

        debug!(
            tx = %tx_id,
            deleted = summary.deleted,
            merged = summary.merged,
            types = summary.types,
            associations = summary.associations,
            "Promoted staged index rows"
        );
        Ok(summary)
    }

    /// Drop the staged rows of `tx_id` in a database transaction of its own.
    /// A transaction that never staged anything is a no-op.
    pub async fn discard(&self, tx_id: &TransactionId) -> Result<()> {
        let mut db_tx = self.db.begin().await?;
        purge(&mut *db_tx, self.db.kind(), tx_id).await?;
        db_tx.commit().await?;
        debug!(tx = %tx_id, "Discarded staged index rows");
        Ok(())
    }

    /// Remove staging rows owned by no live transaction. Returns the number of
    /// staged resource rows removed.
    ///
    /// Orphaned transaction ids are read back first and deleted in batches,
    /// so the live set never becomes a bind list.
    pub async fn purge_orphans(&self, live: &[TransactionId]) -> Result<u64> {
        let kind = self.db.kind();
        let live: HashSet<&str> = live.iter().map(TransactionId::as_str).collect();

        let mut db_tx = self.db.begin().await?;
        let rows = sqlx::query(SELECT_STAGED_TRANSACTIONS)
            .fetch_all(&mut *db_tx)
            .await?;
        let mut orphans = Vec::new();
        for row in &rows {
            let tx_id: String = row.try_get("transaction_id")?;
            if !live.contains(tx_id.as_str()) {
                orphans.push(tx_id);
            }
        }

        let mut removed = 0;
        for batch in orphans.chunks(PURGE_BATCH_SIZE) {
            let placeholders: Vec<String> =
                (1..=batch.len()).map(|n| kind.placeholder(n)).collect();
            let filter = format!(" WHERE transaction_id IN ({})", placeholders.join(", "));
            let params = || -> Vec<SqlParam> {
                batch.iter().map(|id| SqlParam::text(id.as_str())).collect()
            };

            removed += execute(
                &mut *db_tx,
                &format!("DELETE FROM simple_search_transactions{}", filter),
                params(),
            )
            .await?;
            execute(
                &mut *db_tx,
                &format!("DELETE FROM search_resource_rdf_type_transactions{}", filter),
                params(),
            )
            .await?;
        }
        db_tx.commit().await?;

        debug!(
            removed,
            orphans = orphans.len(),
            live = live.len(),
            "Purged orphaned staging rows"
        );
        Ok(removed)
    }
}

fn tx_param(tx_id: &TransactionId) -> Vec<SqlParam> {
    vec![SqlParam::text(tx_id.as_str())]
}

async fn purge(
    conn: &mut AnyConnection,
    kind: DbKind,
    tx_id: &TransactionId,
) -> Result<()> {
    execute(conn, &kind.prepare(PURGE_STAGED_ROWS), tx_param(tx_id)).await?;
    execute(conn, &kind.prepare(PURGE_STAGED_TYPES), tx_param(tx_id)).await?;
    Ok(())
}

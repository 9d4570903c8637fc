use crate::connection::{IndexDatabase, SqlParam, execute};
use crate::core::{FedoraId, IndexRecord, Operation, Result, to_epoch_millis};
use crate::transaction::TransactionId;
use tracing::debug;

const DELETE_STAGED_TYPES: &str = "DELETE FROM search_resource_rdf_type_transactions \
    WHERE transaction_id = ? AND fedora_id = ?";

const INSERT_STAGED_TYPE: &str = "INSERT INTO search_resource_rdf_type_transactions \
    (fedora_id, rdf_type_uri, transaction_id) VALUES (?, ?, ?)";

/// Records mutations of a user transaction in the staging tables.
///
/// Nothing written here is visible to search until the transaction's
/// commit promotes it.
#[derive(Clone)]
pub struct StagedIndexWriter {
    db: IndexDatabase,
}

impl StagedIndexWriter {
    pub fn new(db: IndexDatabase) -> Self {
        Self { db }
    }

    pub async fn stage_add(&self, tx_id: &TransactionId, record: &IndexRecord) -> Result<()> {
        let kind = self.db.kind();
        let fedora_id = record.fedora_id.full_id();
        let mut db_tx = self.db.begin().await?;

        let row = vec![
            SqlParam::text(fedora_id),
            SqlParam::int(to_epoch_millis(&record.modified)),
            SqlParam::int(to_epoch_millis(&record.created)),
            SqlParam::from(record.content_size),
            SqlParam::from(record.mime_type.clone()),
            SqlParam::text(Operation::Add.as_str()),
            SqlParam::text(tx_id.as_str()),
        ];
        execute(&mut *db_tx, kind.templates().staged_upsert, row).await?;

        execute(
            &mut *db_tx,
            &kind.prepare(DELETE_STAGED_TYPES),
            vec![SqlParam::text(tx_id.as_str()), SqlParam::text(fedora_id)],
        )
        .await?;

        let insert_type = kind.prepare(INSERT_STAGED_TYPE);
        for uri in record.distinct_rdf_types() {
            execute(
                &mut *db_tx,
                &insert_type,
                vec![
                    SqlParam::text(fedora_id),
                    SqlParam::text(uri),
                    SqlParam::text(tx_id.as_str()),
                ],
            )
            .await?;
        }

        db_tx.commit().await?;
        debug!(tx = %tx_id, fedora_id, types = record.rdf_types.len(), "Staged add");
        Ok(())
    }

    /// Stage a delete. Only the identifier is recorded; the other columns
    /// stay NULL.
    pub async fn stage_delete(&self, tx_id: &TransactionId, fedora_id: &FedoraId) -> Result<()> {
        let kind = self.db.kind();
        let mut db_tx = self.db.begin().await?;

        let row = vec![
            SqlParam::text(fedora_id.full_id()),
            SqlParam::Int(None),
            SqlParam::Int(None),
            SqlParam::Int(None),
            SqlParam::Text(None),
            SqlParam::text(Operation::Delete.as_str()),
            SqlParam::text(tx_id.as_str()),
        ];
        execute(&mut *db_tx, kind.templates().staged_upsert, row).await?;

        execute(
            &mut *db_tx,
            &kind.prepare(DELETE_STAGED_TYPES),
            vec![
                SqlParam::text(tx_id.as_str()),
                SqlParam::text(fedora_id.full_id()),
            ],
        )
        .await?;

        db_tx.commit().await?;
        debug!(tx = %tx_id, fedora_id = %fedora_id, "Staged delete");
        Ok(())
    }
}

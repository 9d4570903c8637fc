use super::catalog::TypeCatalog;
use crate::connection::{IndexDatabase, SqlParam, bind_params, execute};
use crate::core::{FedoraId, IndexError, IndexRecord, Result, to_epoch_millis};
use sqlx::Row;
use std::sync::Arc;
use tracing::debug;

const SELECT_RESOURCE_ID: &str = "SELECT id FROM simple_search WHERE fedora_id = ?";

const DELETE_ASSOCIATIONS: &str = "DELETE FROM search_resource_rdf_type WHERE resource_id = ?";

const INSERT_ASSOCIATION: &str =
    "INSERT INTO search_resource_rdf_type (resource_id, rdf_type_id) VALUES (?, ?)";

const DELETE_ASSOCIATIONS_BY_FEDORA_ID: &str = "DELETE FROM search_resource_rdf_type \
    WHERE resource_id IN (SELECT id FROM simple_search WHERE fedora_id = ?)";

const DELETE_RESOURCE: &str = "DELETE FROM simple_search WHERE fedora_id = ?";

/// Writes short-lived mutations straight into the durable tables.
///
/// Each call is its own database transaction; there is no later commit.
#[derive(Clone)]
pub struct DirectIndexWriter {
    db: IndexDatabase,
    types: Arc<TypeCatalog>,
}

impl DirectIndexWriter {
    pub fn new(db: IndexDatabase, types: Arc<TypeCatalog>) -> Self {
        Self { db, types }
    }

    pub async fn add_update(&self, record: &IndexRecord) -> Result<()> {
        let kind = self.db.kind();
        let fedora_id = record.fedora_id.full_id();
        let mut db_tx = self.db.begin().await?;

        let row = vec![
            SqlParam::text(fedora_id),
            SqlParam::int(to_epoch_millis(&record.created)),
            SqlParam::int(to_epoch_millis(&record.modified)),
            SqlParam::from(record.content_size),
            SqlParam::from(record.mime_type.clone()),
        ];
        execute(&mut *db_tx, kind.templates().direct_upsert, row).await?;

        let select = kind.prepare(SELECT_RESOURCE_ID);
        let resource_id: i64 = bind_params(sqlx::query(&select), vec![SqlParam::text(fedora_id)])
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(|| IndexError::Index(format!("{} vanished after upsert", fedora_id)))?
            .try_get("id")?;

        execute(
            &mut *db_tx,
            &kind.prepare(DELETE_ASSOCIATIONS),
            vec![SqlParam::int(resource_id)],
        )
        .await?;

        let uris = record.distinct_rdf_types();
        let type_ids = if uris.is_empty() {
            Vec::new()
        } else {
            self.types.resolve(&mut *db_tx, kind, &uris).await?
        };

        let insert = kind.prepare(INSERT_ASSOCIATION);
        for (_, type_id) in &type_ids {
            execute(
                &mut *db_tx,
                &insert,
                vec![SqlParam::int(resource_id), SqlParam::int(*type_id)],
            )
            .await?;
        }

        db_tx.commit().await?;
        self.types.remember(&type_ids);
        debug!(fedora_id, resource_id, types = type_ids.len(), "Indexed resource");
        Ok(())
    }

    pub async fn remove(&self, fedora_id: &FedoraId) -> Result<()> {
        let kind = self.db.kind();
        let mut db_tx = self.db.begin().await?;

        execute(
            &mut *db_tx,
            &kind.prepare(DELETE_ASSOCIATIONS_BY_FEDORA_ID),
            vec![SqlParam::text(fedora_id.full_id())],
        )
        .await?;
        let removed = execute(
            &mut *db_tx,
            &kind.prepare(DELETE_RESOURCE),
            vec![SqlParam::text(fedora_id.full_id())],
        )
        .await?;

        db_tx.commit().await?;
        debug!(fedora_id = %fedora_id, removed, "Removed resource from index");
        Ok(())
    }
}

use crate::connection::dialect::DbKind;
use crate::connection::{SqlParam, bind_params, execute};
use crate::core::{IndexError, Result};
use lru::LruCache;
use sqlx::{AnyConnection, Row};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use tracing::{debug, warn};

/// RDF type catalog access plus an LRU cache of `rdf_type_uri -> id`.
///
/// Catalog rows are never deleted, so a cached id stays valid until `clear`.
pub struct TypeCatalog {
    cache: Mutex<LruCache<String, i64>>,
}

impl TypeCatalog {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Split `uris` into cached ids and uris still to look up.
    pub fn lookup<'a>(&self, uris: &[&'a str]) -> (Vec<(String, i64)>, Vec<&'a str>) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        let mut found = Vec::with_capacity(uris.len());
        let mut missing = Vec::new();
        for uri in uris {
            match cache.get(*uri) {
                Some(id) => found.push((uri.to_string(), *id)),
                None => missing.push(*uri),
            }
        }
        (found, missing)
    }

    /// Record ids observed by a committed database transaction.
    pub fn remember(&self, entries: &[(String, i64)]) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        for (uri, id) in entries {
            cache.put(uri.clone(), *id);
        }
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve catalog ids for `uris`, inserting the ones not yet cataloged.
    ///
    /// Does not touch the cache; callers `remember` the result once their
    /// database transaction has committed.
    pub async fn resolve(
        &self,
        conn: &mut AnyConnection,
        kind: DbKind,
        uris: &[&str],
    ) -> Result<Vec<(String, i64)>> {
        let (mut resolved, missing) = self.lookup(uris);
        if missing.is_empty() {
            return Ok(resolved);
        }

        let mut known = select_ids(conn, kind, &missing, false).await?;
        let absent: Vec<&str> = missing
            .iter()
            .copied()
            .filter(|uri| !known.contains_key(*uri))
            .collect();

        if !absent.is_empty() {
            for uri in &absent {
                insert_type(conn, kind, uri).await?;
            }
            // A concurrent writer may have committed some of these first; its
            // rows are only visible to a locking read on MySQL.
            known.extend(select_ids(conn, kind, &absent, true).await?);
        }

        for uri in missing {
            let id = known.get(uri).copied().ok_or_else(|| {
                IndexError::Index(format!("RDF type {} has no catalog id", uri))
            })?;
            resolved.push((uri.to_string(), id));
        }

        if resolved.len() != uris.len() {
            return Err(IndexError::Index(format!(
                "resolved {} of {} RDF types",
                resolved.len(),
                uris.len()
            )));
        }
        Ok(resolved)
    }
}

/// Insert one catalog entry unless present. Duplicate-key races are ignored.
pub async fn insert_type(conn: &mut AnyConnection, kind: DbKind, uri: &str) -> Result<()> {
    match execute(conn, kind.templates().type_insert, vec![SqlParam::text(uri)]).await {
        Ok(_) => Ok(()),
        Err(err) if err.is_unique_violation() => {
            warn!(rdf_type = uri, error = %err, "Ignoring duplicate RDF type insert");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

fn select_ids_sql(kind: DbKind, count: usize, locking: bool) -> String {
    let placeholders: Vec<String> = (1..=count).map(|n| kind.placeholder(n)).collect();
    format!(
        "SELECT id, rdf_type_uri FROM search_rdf_type WHERE rdf_type_uri IN ({}){}",
        placeholders.join(", "),
        if locking { kind.locking_read() } else { "" }
    )
}

async fn select_ids(
    conn: &mut AnyConnection,
    kind: DbKind,
    uris: &[&str],
    locking: bool,
) -> Result<HashMap<String, i64>> {
    let sql = select_ids_sql(kind, uris.len(), locking);
    let params = uris.iter().map(|uri| SqlParam::text(*uri)).collect();

    let rows = bind_params(sqlx::query(&sql), params).fetch_all(conn).await?;
    let mut ids = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id")?;
        let uri: String = row.try_get("rdf_type_uri")?;
        ids.insert(uri, id);
    }
    debug!(requested = uris.len(), found = ids.len(), "Selected RDF type ids");
    Ok(ids)
}

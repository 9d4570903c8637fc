pub mod config;
pub mod dialect;
pub mod schema;

use crate::core::Result;
use config::RepositoryConfig;
use dialect::{DbKind, SqlTemplates};
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection, AnyPool};
use tracing::{debug, info};

/// Database transaction every multi-statement index operation runs inside.
pub type DbTransaction = sqlx::Transaction<'static, Any>;

/// Bound statement parameter. Only integers and text cross the driver boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(Option<i64>),
    Text(Option<String>),
}

impl SqlParam {
    pub fn int(value: i64) -> Self {
        SqlParam::Int(Some(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        SqlParam::Text(Some(value.into()))
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        SqlParam::Int(Some(value))
    }
}

impl From<Option<i64>> for SqlParam {
    fn from(value: Option<i64>) -> Self {
        SqlParam::Int(value)
    }
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        SqlParam::Text(Some(value.to_string()))
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        SqlParam::Text(Some(value))
    }
}

impl From<Option<String>> for SqlParam {
    fn from(value: Option<String>) -> Self {
        SqlParam::Text(value)
    }
}

pub fn bind_params<'q>(
    mut query: Query<'q, Any, AnyArguments<'q>>,
    params: Vec<SqlParam>,
) -> Query<'q, Any, AnyArguments<'q>> {
    for param in params {
        query = match param {
            SqlParam::Int(value) => query.bind(value),
            SqlParam::Text(value) => query.bind(value),
        };
    }
    query
}

/// Runs one statement and returns the affected row count.
pub async fn execute(conn: &mut AnyConnection, sql: &str, params: Vec<SqlParam>) -> Result<u64> {
    let result = bind_params(sqlx::query(sql), params).execute(conn).await?;
    Ok(result.rows_affected())
}

/// Handle on the index datasource
///
/// Owns the connection pool and the dialect detected for it. Cloning is cheap
/// and shares the pool.
#[derive(Clone)]
pub struct IndexDatabase {
    pool: AnyPool,
    kind: DbKind,
}

impl IndexDatabase {
    /// Connect, then classify the engine unless the config forces a dialect.
    pub async fn connect(config: &RepositoryConfig) -> Result<Self> {
        config.validate()?;
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(&config.database_url)
            .await?;
        let kind = match config.dialect {
            Some(kind) => kind,
            None => Self::detect(&pool).await?,
        };

        info!(url = %config.redacted_url(), dialect = %kind, "Connected to index database");
        Ok(Self { pool, kind })
    }

    pub fn from_pool(pool: AnyPool, kind: DbKind) -> Self {
        Self { pool, kind }
    }

    /// Probe a pooled connection for the backend it talks to.
    pub async fn detect(pool: &AnyPool) -> Result<DbKind> {
        let conn = pool.acquire().await?;
        let backend = conn.backend_name().to_string();
        debug!(backend = %backend, "Probed index datasource");
        DbKind::from_backend_name(&backend)
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    pub fn templates(&self) -> &'static SqlTemplates {
        self.kind.templates()
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    /// Create all index tables; safe to run on every startup.
    pub async fn apply_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        for statement in schema::ddl(self.kind) {
            sqlx::query(statement).execute(&mut *conn).await?;
        }
        debug!(dialect = %self.kind, "Applied search index schema");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

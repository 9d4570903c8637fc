#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use txsearch::{
    Condition, FedoraId, IndexDatabase, IndexError, IndexRecord, NoVersioning, Repository,
    RepositoryConfig, ResourceSession, Result, SearchHit, SearchParameters, TransactionId,
    VersionService,
};

pub async fn open_repository() -> Repository {
    open_repository_with(RepositoryConfig::in_memory(), Arc::new(NoVersioning)).await
}

pub async fn open_repository_with(
    config: RepositoryConfig,
    versions: Arc<dyn VersionService>,
) -> Repository {
    Repository::open(config, versions).await.unwrap()
}

/// Repository whose reaper ticks fast enough for tests.
pub async fn open_reaping_repository() -> Repository {
    let config = RepositoryConfig::in_memory().reap_interval(Duration::from_millis(50));
    open_repository_with(config, Arc::new(NoVersioning)).await
}

pub fn fedora_id(id: &str) -> FedoraId {
    FedoraId::new(id).unwrap()
}

pub fn record(id: &str) -> IndexRecord {
    IndexRecord::new(fedora_id(id))
}

pub async fn find(repo: &Repository, id: &str) -> Vec<SearchHit> {
    let params = SearchParameters::new()
        .condition(Condition::parse(&format!("fedora_id={}", id)).unwrap())
        .fields(txsearch::Field::ALL);
    repo.index().search(&params).await.unwrap().items
}

/// Rows of `tx_id` in both staging tables.
pub async fn staged_rows(db: &IndexDatabase, tx_id: &TransactionId) -> i64 {
    let kind = db.kind();
    let mut total = 0;
    for table in [
        "simple_search_transactions",
        "search_resource_rdf_type_transactions",
    ] {
        let sql = format!(
            "SELECT COUNT(*) AS n FROM {} WHERE transaction_id = {}",
            table,
            kind.placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(tx_id.as_str().to_string())
            .fetch_one(db.pool())
            .await
            .unwrap();
        total += row.try_get::<i64, _>("n").unwrap();
    }
    total
}

pub async fn table_count(db: &IndexDatabase, table: &str) -> i64 {
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {}", table))
        .fetch_one(db.pool())
        .await
        .unwrap();
    row.try_get::<i64, _>("n").unwrap()
}

/// Counters shared between a test and the session it handed to a transaction.
#[derive(Default)]
pub struct SessionProbe {
    pub saves: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub logouts: AtomicUsize,
    pub fail_save: AtomicBool,
    pub fail_refresh: AtomicBool,
}

impl SessionProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

pub struct RecordingSession {
    probe: Arc<SessionProbe>,
}

impl RecordingSession {
    pub fn boxed(probe: &Arc<SessionProbe>) -> Box<dyn ResourceSession> {
        Box::new(Self {
            probe: Arc::clone(probe),
        })
    }
}

#[async_trait]
impl ResourceSession for RecordingSession {
    async fn save(&mut self) -> Result<()> {
        if self.probe.fail_save.load(Ordering::SeqCst) {
            return Err(IndexError::Session("save refused".into()));
        }
        self.probe.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&mut self, discard_changes: bool) -> Result<()> {
        assert!(discard_changes);
        if self.probe.fail_refresh.load(Ordering::SeqCst) {
            return Err(IndexError::Session("refresh refused".into()));
        }
        self.probe.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&mut self) {
        self.probe.logouts.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingVersions {
    pub paths: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingVersions {
    pub fn recorded(&self) -> Vec<String> {
        self.paths.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionService for RecordingVersions {
    async fn queue_checkpoint(&self, path: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(IndexError::Versioning(format!("cannot checkpoint {}", path)));
        }
        self.paths.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

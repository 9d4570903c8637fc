use super::dialect::DbKind;
use crate::core::{IndexError, Result};
use std::env;
use std::time::Duration;

/// Default lifetime of an idle transaction (3 minutes).
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(180_000);

/// Default period between two reaper passes.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_millis(1000);

pub const DEFAULT_TYPE_CACHE_CAPACITY: usize = 1024;

/// Repository configuration
///
/// Covers the index datasource and the transaction lifecycle.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Datasource URL (`sqlite:`, `postgres://`, `mysql://`)
    pub database_url: String,

    /// Forces a dialect instead of probing the datasource
    pub dialect: Option<DbKind>,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Minimum number of connections in pool
    pub min_connections: u32,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,

    /// Expiry pushed onto a transaction on every access
    pub transaction_timeout: Duration,

    /// Period of the expired-transaction sweep
    pub reap_interval: Duration,

    /// Capacity of the RDF type id cache
    pub type_cache_capacity: usize,

    /// Purge staging rows left behind by a previous process at startup
    pub reconcile_on_startup: bool,
}

impl RepositoryConfig {
    pub fn new(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            dialect: None,
            connect_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_connections: 1,
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            reap_interval: DEFAULT_REAP_INTERVAL,
            type_cache_capacity: DEFAULT_TYPE_CACHE_CAPACITY,
            reconcile_on_startup: true,
        }
    }

    /// Single persistent connection to a private in-memory SQLite database.
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
            .max_connections(1)
            .min_connections(1)
            .no_idle_timeout()
            .no_max_lifetime()
    }

    pub fn dialect(mut self, dialect: DbKind) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn no_idle_timeout(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    pub fn no_max_lifetime(mut self) -> Self {
        self.max_lifetime = None;
        self
    }

    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    pub fn reap_interval(mut self, interval: Duration) -> Self {
        self.reap_interval = interval;
        self
    }

    pub fn type_cache_capacity(mut self, capacity: usize) -> Self {
        self.type_cache_capacity = capacity;
        self
    }

    pub fn reconcile_on_startup(mut self, enabled: bool) -> Self {
        self.reconcile_on_startup = enabled;
        self
    }

    /// Build from `TXSEARCH_*` environment variables (a `.env` file is honored).
    ///
    /// Only `TXSEARCH_DATABASE_URL` is required.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("TXSEARCH_DATABASE_URL")
            .map_err(|_| IndexError::Config("TXSEARCH_DATABASE_URL must be set".into()))?;
        let mut config = Self::new(&database_url);

        if let Some(max) = env_parse::<u32>("TXSEARCH_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(min) = env_parse::<u32>("TXSEARCH_MIN_CONNECTIONS")? {
            config.min_connections = min;
        }
        if let Some(ms) = env_parse::<u64>("TXSEARCH_TX_TIMEOUT_MS")? {
            config.transaction_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("TXSEARCH_REAP_INTERVAL_MS")? {
            config.reap_interval = Duration::from_millis(ms);
        }
        if let Some(capacity) = env_parse::<usize>("TXSEARCH_TYPE_CACHE_CAPACITY")? {
            config.type_cache_capacity = capacity;
        }
        if let Some(enabled) = env_parse::<bool>("TXSEARCH_RECONCILE_ON_STARTUP")? {
            config.reconcile_on_startup = enabled;
        }
        if let Ok(dialect) = env::var("TXSEARCH_DIALECT") {
            config.dialect = Some(dialect.parse()?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Datasource URL with any password masked.
    pub fn redacted_url(&self) -> String {
        let url = &self.database_url;
        let (Some(scheme_end), Some(at)) = (url.find("://"), url.rfind('@')) else {
            return url.clone();
        };
        let credentials = &url[scheme_end + 3..at];
        match credentials.split_once(':') {
            Some((user, _)) => format!("{}{}:***{}", &url[..scheme_end + 3], user, &url[at..]),
            None => url.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(IndexError::Config("database_url cannot be empty".into()));
        }

        if self.max_connections == 0 {
            return Err(IndexError::Config("max_connections must be > 0".into()));
        }

        if self.min_connections > self.max_connections {
            return Err(IndexError::Config(
                "min_connections cannot exceed max_connections".into(),
            ));
        }

        if self.transaction_timeout.is_zero() {
            return Err(IndexError::Config("transaction_timeout must be > 0".into()));
        }

        if self.reap_interval.is_zero() {
            return Err(IndexError::Config("reap_interval must be > 0".into()));
        }

        if self.type_cache_capacity == 0 {
            return Err(IndexError::Config("type_cache_capacity must be > 0".into()));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| IndexError::Config(format!("{} has an invalid value: '{}'", name, raw))),
        Err(_) => Ok(None),
    }
}

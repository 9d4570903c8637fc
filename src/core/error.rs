use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    /// Unknown id, foreign owner, terminal or reaped transaction. Callers cannot
    /// tell these cases apart.
    #[error("Transaction with id {0} is not available")]
    TransactionMissing(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unsupported database: {0}")]
    UnsupportedDatabase(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Versioning error: {0}")]
    Versioning(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    pub fn is_transaction_missing(&self) -> bool {
        matches!(self, IndexError::TransactionMissing(_))
    }

    /// True for a duplicate-key failure reported by the database driver.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            IndexError::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<tokio::task::JoinError> for IndexError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Execution(err.to_string())
    }
}

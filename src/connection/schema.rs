use super::dialect::DbKind;

pub const SIMPLE_SEARCH_TABLE: &str = "simple_search";
pub const RDF_TYPE_TABLE: &str = "search_rdf_type";
pub const RESOURCE_RDF_TYPE_TABLE: &str = "search_resource_rdf_type";
pub const STAGED_SEARCH_TABLE: &str = "simple_search_transactions";
pub const STAGED_RDF_TYPE_TABLE: &str = "search_resource_rdf_type_transactions";

/// Durable tables first, staging tables last.
pub const ALL_TABLES: [&str; 5] = [
    SIMPLE_SEARCH_TABLE,
    RDF_TYPE_TABLE,
    RESOURCE_RDF_TYPE_TABLE,
    STAGED_SEARCH_TABLE,
    STAGED_RDF_TYPE_TABLE,
];

const SQLITE_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS simple_search (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        fedora_id VARCHAR(503) NOT NULL UNIQUE,
        created BIGINT NOT NULL,
        modified BIGINT NOT NULL,
        content_size BIGINT,
        mime_type VARCHAR(255)
    )",
    "CREATE TABLE IF NOT EXISTS search_rdf_type (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        rdf_type_uri VARCHAR(255) NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS search_resource_rdf_type (
        resource_id BIGINT NOT NULL,
        rdf_type_id BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS search_resource_rdf_type_resource_idx
        ON search_resource_rdf_type (resource_id)",
    "CREATE INDEX IF NOT EXISTS search_resource_rdf_type_type_idx
        ON search_resource_rdf_type (rdf_type_id)",
    "CREATE TABLE IF NOT EXISTS simple_search_transactions (
        fedora_id VARCHAR(503) NOT NULL,
        modified BIGINT,
        created BIGINT,
        content_size BIGINT,
        mime_type VARCHAR(255),
        operation VARCHAR(10) NOT NULL,
        transaction_id VARCHAR(255) NOT NULL,
        PRIMARY KEY (fedora_id, transaction_id)
    )",
    "CREATE INDEX IF NOT EXISTS simple_search_transactions_tx_idx
        ON simple_search_transactions (transaction_id)",
    "CREATE TABLE IF NOT EXISTS search_resource_rdf_type_transactions (
        fedora_id VARCHAR(503) NOT NULL,
        rdf_type_uri VARCHAR(255) NOT NULL,
        transaction_id VARCHAR(255) NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS search_resource_rdf_type_transactions_idx
        ON search_resource_rdf_type_transactions (transaction_id, fedora_id)",
];

const POSTGRES_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS simple_search (
        id BIGSERIAL PRIMARY KEY,
        fedora_id VARCHAR(503) NOT NULL UNIQUE,
        created BIGINT NOT NULL,
        modified BIGINT NOT NULL,
        content_size BIGINT,
        mime_type VARCHAR(255)
    )",
    "CREATE TABLE IF NOT EXISTS search_rdf_type (
        id BIGSERIAL PRIMARY KEY,
        rdf_type_uri VARCHAR(255) NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS search_resource_rdf_type (
        resource_id BIGINT NOT NULL,
        rdf_type_id BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS search_resource_rdf_type_resource_idx
        ON search_resource_rdf_type (resource_id)",
    "CREATE INDEX IF NOT EXISTS search_resource_rdf_type_type_idx
        ON search_resource_rdf_type (rdf_type_id)",
    "CREATE TABLE IF NOT EXISTS simple_search_transactions (
        fedora_id VARCHAR(503) NOT NULL,
        modified BIGINT,
        created BIGINT,
        content_size BIGINT,
        mime_type VARCHAR(255),
        operation VARCHAR(10) NOT NULL,
        transaction_id VARCHAR(255) NOT NULL,
        PRIMARY KEY (fedora_id, transaction_id)
    )",
    "CREATE INDEX IF NOT EXISTS simple_search_transactions_tx_idx
        ON simple_search_transactions (transaction_id)",
    "CREATE TABLE IF NOT EXISTS search_resource_rdf_type_transactions (
        fedora_id VARCHAR(503) NOT NULL,
        rdf_type_uri VARCHAR(255) NOT NULL,
        transaction_id VARCHAR(255) NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS search_resource_rdf_type_transactions_idx
        ON search_resource_rdf_type_transactions (transaction_id, fedora_id)",
];

// MySQL has no CREATE INDEX IF NOT EXISTS; indexes are declared inline.
const MYSQL_DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS simple_search (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        fedora_id VARCHAR(503) NOT NULL UNIQUE,
        created BIGINT NOT NULL,
        modified BIGINT NOT NULL,
        content_size BIGINT,
        mime_type VARCHAR(255)
    )",
    "CREATE TABLE IF NOT EXISTS search_rdf_type (
        id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
        rdf_type_uri VARCHAR(255) NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS search_resource_rdf_type (
        resource_id BIGINT NOT NULL,
        rdf_type_id BIGINT NOT NULL,
        INDEX search_resource_rdf_type_resource_idx (resource_id),
        INDEX search_resource_rdf_type_type_idx (rdf_type_id)
    )",
    "CREATE TABLE IF NOT EXISTS simple_search_transactions (
        fedora_id VARCHAR(503) NOT NULL,
        modified BIGINT,
        created BIGINT,
        content_size BIGINT,
        mime_type VARCHAR(255),
        operation VARCHAR(10) NOT NULL,
        transaction_id VARCHAR(255) NOT NULL,
        PRIMARY KEY (fedora_id, transaction_id),
        INDEX simple_search_transactions_tx_idx (transaction_id)
    )",
    "CREATE TABLE IF NOT EXISTS search_resource_rdf_type_transactions (
        fedora_id VARCHAR(503) NOT NULL,
        rdf_type_uri VARCHAR(255) NOT NULL,
        transaction_id VARCHAR(255) NOT NULL,
        INDEX search_resource_rdf_type_transactions_idx (transaction_id, fedora_id)
    )",
];

pub fn ddl(kind: DbKind) -> &'static [&'static str] {
    match kind {
        DbKind::Sqlite => SQLITE_DDL,
        DbKind::Postgres => POSTGRES_DDL,
        DbKind::MySql => MYSQL_DDL,
    }
}

// ============================================================================
// SQL Dialects
// ============================================================================
//
// One logical contract, several engines. Every engine contributes exactly four
// templates; statements that are portable as written live with their callers
// and go through `DbKind::prepare` for placeholder syntax.
//
// Bind order of the templates:
//   direct_upsert: fedora_id, created, modified, content_size, mime_type
//   staged_upsert: fedora_id, modified, created, content_size, mime_type,
//                  operation, transaction_id
//   commit_merge:  transaction_id
//   type_insert:   rdf_type_uri
//
// ============================================================================

use crate::core::{IndexError, Result};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Engine family behind the index datasource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbKind {
    Sqlite,
    Postgres,
    /// MySQL and MariaDB
    MySql,
}

/// The per-engine statements with identical logical contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTemplates {
    /// Insert a durable row, or overwrite its mutable columns.
    pub direct_upsert: &'static str,
    /// Insert a staged row keyed by (fedora_id, transaction_id), or overwrite it.
    pub staged_upsert: &'static str,
    /// Upsert every `add` staged row of one transaction into the durable table.
    pub commit_merge: &'static str,
    /// Insert an RDF type into the catalog unless already present.
    pub type_insert: &'static str,
}

const SQLITE_TEMPLATES: SqlTemplates = SqlTemplates {
    direct_upsert: "INSERT INTO simple_search (fedora_id, created, modified, content_size, mime_type) \
        VALUES (?, ?, ?, ?, ?) \
        ON CONFLICT (fedora_id) DO UPDATE SET modified = excluded.modified, \
        content_size = excluded.content_size, mime_type = excluded.mime_type",
    staged_upsert: "INSERT INTO simple_search_transactions \
        (fedora_id, modified, created, content_size, mime_type, operation, transaction_id) \
        VALUES (?, ?, ?, ?, ?, ?, ?) \
        ON CONFLICT (fedora_id, transaction_id) DO UPDATE SET modified = excluded.modified, \
        created = excluded.created, content_size = excluded.content_size, \
        mime_type = excluded.mime_type, operation = excluded.operation",
    commit_merge: "INSERT INTO simple_search (fedora_id, created, modified, content_size, mime_type) \
        SELECT t.fedora_id, t.created, t.modified, t.content_size, t.mime_type \
        FROM simple_search_transactions t WHERE t.transaction_id = ? AND t.operation = 'add' \
        ON CONFLICT (fedora_id) DO UPDATE SET modified = excluded.modified, \
        content_size = excluded.content_size, mime_type = excluded.mime_type",
    type_insert: "INSERT INTO search_rdf_type (rdf_type_uri) VALUES (?) \
        ON CONFLICT (rdf_type_uri) DO NOTHING",
};

const POSTGRES_TEMPLATES: SqlTemplates = SqlTemplates {
    direct_upsert: "INSERT INTO simple_search (fedora_id, created, modified, content_size, mime_type) \
        VALUES ($1, $2, $3, $4, $5) \
        ON CONFLICT (fedora_id) DO UPDATE SET modified = EXCLUDED.modified, \
        content_size = EXCLUDED.content_size, mime_type = EXCLUDED.mime_type",
    staged_upsert: "INSERT INTO simple_search_transactions \
        (fedora_id, modified, created, content_size, mime_type, operation, transaction_id) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT (fedora_id, transaction_id) DO UPDATE SET modified = EXCLUDED.modified, \
        created = EXCLUDED.created, content_size = EXCLUDED.content_size, \
        mime_type = EXCLUDED.mime_type, operation = EXCLUDED.operation",
    commit_merge: "INSERT INTO simple_search (fedora_id, created, modified, content_size, mime_type) \
        SELECT t.fedora_id, t.created, t.modified, t.content_size, t.mime_type \
        FROM simple_search_transactions t WHERE t.transaction_id = $1 AND t.operation = 'add' \
        ON CONFLICT (fedora_id) DO UPDATE SET modified = EXCLUDED.modified, \
        content_size = EXCLUDED.content_size, mime_type = EXCLUDED.mime_type",
    type_insert: "INSERT INTO search_rdf_type (rdf_type_uri) VALUES ($1) ON CONFLICT DO NOTHING",
};

const MYSQL_TEMPLATES: SqlTemplates = SqlTemplates {
    direct_upsert: "INSERT INTO simple_search (fedora_id, created, modified, content_size, mime_type) \
        VALUES (?, ?, ?, ?, ?) \
        ON DUPLICATE KEY UPDATE modified = VALUES(modified), \
        content_size = VALUES(content_size), mime_type = VALUES(mime_type)",
    staged_upsert: "INSERT INTO simple_search_transactions \
        (fedora_id, modified, created, content_size, mime_type, operation, transaction_id) \
        VALUES (?, ?, ?, ?, ?, ?, ?) \
        ON DUPLICATE KEY UPDATE modified = VALUES(modified), created = VALUES(created), \
        content_size = VALUES(content_size), mime_type = VALUES(mime_type), \
        operation = VALUES(operation)",
    commit_merge: "INSERT INTO simple_search (fedora_id, created, modified, content_size, mime_type) \
        SELECT t.fedora_id, t.created, t.modified, t.content_size, t.mime_type \
        FROM simple_search_transactions t WHERE t.transaction_id = ? AND t.operation = 'add' \
        ON DUPLICATE KEY UPDATE modified = t.modified, \
        content_size = t.content_size, mime_type = t.mime_type",
    type_insert: "INSERT IGNORE INTO search_rdf_type (rdf_type_uri) VALUES (?)",
};

impl DbKind {
    pub const ALL: [DbKind; 3] = [DbKind::Sqlite, DbKind::Postgres, DbKind::MySql];

    /// Classify the name a driver reports for its backend.
    pub fn from_backend_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(DbKind::Sqlite),
            "postgresql" | "postgres" => Ok(DbKind::Postgres),
            "mysql" | "mariadb" => Ok(DbKind::MySql),
            other => Err(IndexError::UnsupportedDatabase(other.to_string())),
        }
    }

    pub fn templates(&self) -> &'static SqlTemplates {
        match self {
            DbKind::Sqlite => &SQLITE_TEMPLATES,
            DbKind::Postgres => &POSTGRES_TEMPLATES,
            DbKind::MySql => &MYSQL_TEMPLATES,
        }
    }

    /// Positional parameter `n` (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            DbKind::Postgres => format!("${}", n),
            DbKind::Sqlite | DbKind::MySql => "?".to_string(),
        }
    }

    /// Rewrites `?` parameters of portable SQL into this engine's syntax.
    pub fn prepare<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        if *self != DbKind::Postgres || !sql.contains('?') {
            return Cow::Borrowed(sql);
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut n = 0;
        for ch in sql.chars() {
            if ch == '?' {
                n += 1;
                out.push_str(&self.placeholder(n));
            } else {
                out.push(ch);
            }
        }
        Cow::Owned(out)
    }

    /// Comma-joined RDF types of one resource (`rt` aliases `search_rdf_type`).
    pub fn type_aggregate(&self) -> &'static str {
        match self {
            DbKind::Sqlite => "GROUP_CONCAT(rt.rdf_type_uri, ',')",
            DbKind::Postgres => "STRING_AGG(rt.rdf_type_uri, ',' ORDER BY rt.rdf_type_uri)",
            DbKind::MySql => {
                "GROUP_CONCAT(DISTINCT rt.rdf_type_uri ORDER BY rt.rdf_type_uri ASC SEPARATOR ',')"
            }
        }
    }

    /// Suffix turning a SELECT into a read of the latest committed rows.
    ///
    /// InnoDB's REPEATABLE READ serves plain SELECTs from the transaction's
    /// first snapshot; a shared-lock read bypasses it. PostgreSQL (READ
    /// COMMITTED) and SQLite already see committed rows per statement.
    pub fn locking_read(&self) -> &'static str {
        match self {
            DbKind::MySql => " LOCK IN SHARE MODE",
            DbKind::Sqlite | DbKind::Postgres => "",
        }
    }

    /// Case-insensitive pattern match. SQLite LIKE and MySQL's default
    /// collations already ignore case.
    pub fn like_operator(&self) -> &'static str {
        match self {
            DbKind::Postgres => "ILIKE",
            DbKind::Sqlite | DbKind::MySql => "LIKE",
        }
    }

    pub fn truncate(&self, table: &str) -> String {
        match self {
            DbKind::Sqlite => format!("DELETE FROM {}", table),
            DbKind::Postgres | DbKind::MySql => format!("TRUNCATE TABLE {}", table),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DbKind::Sqlite => "sqlite",
            DbKind::Postgres => "postgresql",
            DbKind::MySql => "mysql",
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DbKind {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_backend_name(s.trim())
    }
}

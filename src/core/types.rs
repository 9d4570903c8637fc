use super::{IndexError, Result};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const ACL_SUFFIX: &str = "/fcr:acl";
const VERSIONS_SEGMENT: &str = "/fcr:versions/";

/// Full identifier of a repository resource, e.g. `info:fedora/parent/child`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FedoraId(String);

impl FedoraId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(IndexError::Index("Fedora id cannot be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn full_id(&self) -> &str {
        &self.0
    }

    pub fn is_acl(&self) -> bool {
        self.0.ends_with(ACL_SUFFIX)
    }

    pub fn is_memento(&self) -> bool {
        self.0.contains(VERSIONS_SEGMENT)
    }

    /// ACLs and mementos never appear in the search index.
    pub fn is_indexable(&self) -> bool {
        !self.is_acl() && !self.is_memento()
    }
}

impl fmt::Display for FedoraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FedoraId {
    type Error = IndexError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<FedoraId> for String {
    fn from(id: FedoraId) -> Self {
        id.0
    }
}

/// Snapshot of the resource headers the index projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub fedora_id: FedoraId,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub content_size: Option<i64>,
    pub mime_type: Option<String>,
    pub rdf_types: Vec<String>,
}

impl IndexRecord {
    pub fn new(fedora_id: FedoraId) -> Self {
        let now = Utc::now();
        Self {
            fedora_id,
            created: now,
            modified: now,
            content_size: None,
            mime_type: None,
            rdf_types: Vec::new(),
        }
    }

    pub fn created(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    pub fn modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    pub fn content_size(mut self, size: i64) -> Self {
        self.content_size = Some(size);
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn rdf_type(mut self, uri: impl Into<String>) -> Self {
        self.rdf_types.push(uri.into());
        self
    }

    /// RDF types without duplicates, in first-seen order.
    pub fn distinct_rdf_types(&self) -> Vec<&str> {
        let mut seen = std::collections::HashSet::new();
        self.rdf_types
            .iter()
            .map(String::as_str)
            .filter(|uri| seen.insert(*uri))
            .collect()
    }
}

/// Operation recorded for a staged row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timestamps are stored as epoch milliseconds in every engine.
pub fn to_epoch_millis(instant: &DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

pub fn from_epoch_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| IndexError::Index(format!("Timestamp out of range: {}", millis)))
}

/// Renders an instant the way search results expose it.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    if instant.timestamp_subsec_millis() == 0 {
        instant.to_rfc3339_opts(SecondsFormat::Secs, true)
    } else {
        instant.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

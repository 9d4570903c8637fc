use crate::core::{IndexError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static CONDITION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]+)\s*(<=|>=|=|<|>)\s*(.*?)\s*$").expect("valid condition pattern")
});

const NAIVE_DATE_TIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Searchable column. Also the allow-list of column names that reach SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    FedoraId,
    Created,
    Modified,
    ContentSize,
    MimeType,
    RdfType,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::FedoraId,
        Field::Created,
        Field::Modified,
        Field::ContentSize,
        Field::MimeType,
        Field::RdfType,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Field::FedoraId => "fedora_id",
            Field::Created => "created",
            Field::Modified => "modified",
            Field::ContentSize => "content_size",
            Field::MimeType => "mime_type",
            Field::RdfType => "rdf_type",
        }
    }

    /// Only equality (optionally with `*` wildcards) applies to these.
    pub fn is_textual(&self) -> bool {
        matches!(self, Field::FedoraId | Field::MimeType | Field::RdfType)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Field {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Field::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| IndexError::InvalidQuery(format!("unknown field '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
            Operator::Gt => ">",
            Operator::Gte => ">=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Operator {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" => Ok(Operator::Eq),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            other => Err(IndexError::InvalidQuery(format!("unknown operator '{}'", other))),
        }
    }
}

/// Typed right-hand side of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionValue {
    /// `*` on its own: no restriction.
    Any,
    Exact(String),
    /// `*` already translated to SQL `%`.
    Like(String),
    Instant(DateTime<Utc>),
    Size(i64),
}

/// One `field <op> value` filter.
///
/// Wildcard values match case-insensitively on every engine. Exact values
/// follow the column collation: case-sensitive on SQLite and PostgreSQL,
/// case-insensitive under MySQL's default collations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: Field,
    pub operator: Operator,
    pub value: ConditionValue,
}

impl Condition {
    pub fn new(field: Field, operator: Operator, object: &str) -> Result<Self> {
        let object = object.trim();
        if object.is_empty() {
            return Err(IndexError::InvalidQuery(format!("{} has no value", field)));
        }

        let value = match field {
            Field::FedoraId | Field::MimeType | Field::RdfType => {
                if operator != Operator::Eq {
                    return Err(IndexError::InvalidQuery(format!(
                        "{} only supports '=', got '{}'",
                        field, operator
                    )));
                }
                if object == "*" {
                    ConditionValue::Any
                } else if object.contains('*') {
                    ConditionValue::Like(object.replace('*', "%"))
                } else {
                    ConditionValue::Exact(object.to_string())
                }
            }
            Field::Created | Field::Modified => ConditionValue::Instant(parse_instant(object)?),
            Field::ContentSize => ConditionValue::Size(object.parse::<i64>().map_err(|_| {
                IndexError::InvalidQuery(format!("content_size must be an integer: '{}'", object))
            })?),
        };

        Ok(Self {
            field,
            operator,
            value,
        })
    }

    /// Parse `fedora_id=info:fedora/*`, `content_size>=1024`, ...
    pub fn parse(expression: &str) -> Result<Self> {
        let captures = CONDITION_PATTERN.captures(expression).ok_or_else(|| {
            IndexError::InvalidQuery(format!("malformed condition '{}'", expression))
        })?;
        let field: Field = captures[1].parse()?;
        let operator: Operator = captures[2].parse()?;
        Self::new(field, operator, &captures[3])
    }

    pub fn eq(field: Field, object: &str) -> Result<Self> {
        Self::new(field, Operator::Eq, object)
    }
}

impl FromStr for Condition {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Accepts RFC 3339 instants, naive date-times (UTC) and plain dates.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(IndexError::InvalidQuery(format!("unrecognized date '{}'", value)))
}

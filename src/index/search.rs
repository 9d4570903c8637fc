use super::condition::{Condition, ConditionValue, Field};
use crate::connection::dialect::DbKind;
use crate::connection::{IndexDatabase, SqlParam, bind_params};
use crate::core::{IndexError, Result, format_instant, from_epoch_millis, to_epoch_millis};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::any::AnyRow;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_MAX_RESULTS: i64 = 100;

pub const DEFAULT_FIELDS: [Field; 5] = [
    Field::FedoraId,
    Field::Created,
    Field::Modified,
    Field::ContentSize,
    Field::MimeType,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        })
    }
}

impl FromStr for SortOrder {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(IndexError::InvalidQuery(format!("unknown sort order '{}'", other))),
        }
    }
}

/// What to return and how to filter, order and page it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParameters {
    pub fields: Vec<Field>,
    pub conditions: Vec<Condition>,
    pub max_results: i64,
    pub offset: i64,
    pub order_by: Field,
    pub order: SortOrder,
    pub include_total_count: bool,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            fields: DEFAULT_FIELDS.to_vec(),
            conditions: Vec::new(),
            max_results: DEFAULT_MAX_RESULTS,
            offset: 0,
            order_by: Field::FedoraId,
            order: SortOrder::Asc,
            include_total_count: false,
        }
    }
}

impl SearchParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields = fields.into_iter().collect();
        self
    }

    pub fn max_results(mut self, max_results: i64) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn order_by(mut self, field: Field, order: SortOrder) -> Self {
        self.order_by = field;
        self.order = order;
        self
    }

    pub fn include_total_count(mut self, include: bool) -> Self {
        self.include_total_count = include;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_results <= 0 {
            return Err(IndexError::InvalidQuery("max_results must be > 0".into()));
        }
        if self.offset < 0 {
            return Err(IndexError::InvalidQuery("offset must be >= 0".into()));
        }
        if self.order_by == Field::RdfType {
            return Err(IndexError::InvalidQuery("cannot order by rdf_type".into()));
        }
        Ok(())
    }

    fn selected_fields(&self) -> Vec<Field> {
        let mut selected = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if !selected.contains(field) {
                selected.push(*field);
            }
        }
        if selected.is_empty() {
            selected.extend(DEFAULT_FIELDS);
        }
        selected
    }
}

/// One matching resource. Fields not requested stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fedora_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdf_type: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub max_results: i64,
    pub offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_results: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub items: Vec<SearchHit>,
    pub pagination: PaginationInfo,
}

/// SQL text plus its bound parameters, numbered for the target engine.
struct SqlBuilder {
    kind: DbKind,
    sql: String,
    params: Vec<SqlParam>,
}

impl SqlBuilder {
    fn new(kind: DbKind) -> Self {
        Self {
            kind,
            sql: String::with_capacity(512),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    fn push_bind(&mut self, param: SqlParam) -> &mut Self {
        self.params.push(param);
        let placeholder = self.kind.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }
}

fn column(field: Field) -> &'static str {
    match field {
        Field::FedoraId => "s.fedora_id",
        Field::Created => "s.created",
        Field::Modified => "s.modified",
        Field::ContentSize => "s.content_size",
        Field::MimeType => "s.mime_type",
        Field::RdfType => "r.rdf_type",
    }
}

fn push_filters(builder: &mut SqlBuilder, conditions: &[Condition]) {
    let mut first = true;
    for condition in conditions {
        if condition.value == ConditionValue::Any {
            continue;
        }
        builder.push(if first { " WHERE " } else { " AND " });
        first = false;
        push_condition(builder, condition);
    }
}

fn push_condition(builder: &mut SqlBuilder, condition: &Condition) {
    let op = condition.operator.as_sql();
    match (&condition.value, condition.field) {
        (ConditionValue::Exact(value), Field::RdfType) => {
            builder.push(
                "s.id IN (SELECT rrt.resource_id FROM search_resource_rdf_type rrt \
                 INNER JOIN search_rdf_type rt ON rt.id = rrt.rdf_type_id \
                 WHERE rt.rdf_type_uri = ",
            );
            builder.push_bind(SqlParam::text(value.as_str())).push(")");
        }
        (ConditionValue::Like(pattern), Field::RdfType) => {
            let like = builder.kind.like_operator();
            builder.push(
                "s.id IN (SELECT rrt.resource_id FROM search_resource_rdf_type rrt \
                 INNER JOIN search_rdf_type rt ON rt.id = rrt.rdf_type_id \
                 WHERE rt.rdf_type_uri ",
            );
            builder.push(like).push(" ");
            builder.push_bind(SqlParam::text(pattern.as_str())).push(")");
        }
        (ConditionValue::Exact(value), field) => {
            builder.push(column(field)).push(" = ");
            builder.push_bind(SqlParam::text(value.as_str()));
        }
        (ConditionValue::Like(pattern), field) => {
            let like = builder.kind.like_operator();
            builder.push(column(field)).push(" ").push(like).push(" ");
            builder.push_bind(SqlParam::text(pattern.as_str()));
        }
        (ConditionValue::Instant(instant), field) => {
            builder.push(column(field)).push(" ").push(op).push(" ");
            builder.push_bind(SqlParam::int(to_epoch_millis(instant)));
        }
        (ConditionValue::Size(size), field) => {
            builder.push(column(field)).push(" ").push(op).push(" ");
            builder.push_bind(SqlParam::int(*size));
        }
        (ConditionValue::Any, _) => {}
    }
}

fn build_select(kind: DbKind, params: &SearchParameters, fields: &[Field]) -> SqlBuilder {
    let mut builder = SqlBuilder::new(kind);
    let columns: Vec<String> = fields
        .iter()
        .map(|field| format!("{} AS {}", column(*field), field.name()))
        .collect();
    builder.push("SELECT ").push(&columns.join(", "));
    builder.push(" FROM simple_search s");

    if fields.contains(&Field::RdfType) {
        let join = format!(
            " LEFT JOIN (SELECT rrt.resource_id, {} AS rdf_type \
             FROM search_resource_rdf_type rrt \
             INNER JOIN search_rdf_type rt ON rt.id = rrt.rdf_type_id \
             GROUP BY rrt.resource_id) r ON r.resource_id = s.id",
            kind.type_aggregate()
        );
        builder.push(&join);
    }

    push_filters(&mut builder, &params.conditions);

    builder
        .push(" ORDER BY ")
        .push(column(params.order_by))
        .push(" ")
        .push(params.order.as_sql());
    if params.order_by != Field::FedoraId {
        builder.push(", s.fedora_id ASC");
    }

    builder.push(" LIMIT ");
    builder.push_bind(SqlParam::int(params.max_results));
    builder.push(" OFFSET ");
    builder.push_bind(SqlParam::int(params.offset));
    builder
}

fn build_count(kind: DbKind, params: &SearchParameters) -> SqlBuilder {
    let mut builder = SqlBuilder::new(kind);
    builder.push("SELECT COUNT(*) AS total FROM simple_search s");
    push_filters(&mut builder, &params.conditions);
    builder
}

fn decode_hit(row: &AnyRow, fields: &[Field]) -> Result<SearchHit> {
    let mut hit = SearchHit::default();
    for field in fields {
        let name = field.name();
        match field {
            Field::FedoraId => hit.fedora_id = row.try_get(name)?,
            Field::MimeType => hit.mime_type = row.try_get(name)?,
            Field::ContentSize => hit.content_size = row.try_get(name)?,
            Field::Created | Field::Modified => {
                let millis: Option<i64> = row.try_get(name)?;
                let rendered = millis
                    .map(|ms| from_epoch_millis(ms).map(|t| format_instant(&t)))
                    .transpose()?;
                if *field == Field::Created {
                    hit.created = rendered;
                } else {
                    hit.modified = rendered;
                }
            }
            Field::RdfType => {
                let joined: Option<String> = row.try_get(name)?;
                let mut types: Vec<String> = joined
                    .unwrap_or_default()
                    .split(',')
                    .filter(|uri| !uri.is_empty())
                    .map(str::to_string)
                    .collect();
                types.sort();
                types.dedup();
                hit.rdf_type = Some(types);
            }
        }
    }
    Ok(hit)
}

/// Read-only query surface over the durable tables.
#[derive(Clone)]
pub struct SearchExecutor {
    db: IndexDatabase,
}

impl SearchExecutor {
    pub fn new(db: IndexDatabase) -> Self {
        Self { db }
    }

    pub async fn search(&self, params: &SearchParameters) -> Result<SearchResult> {
        params.validate()?;
        let kind = self.db.kind();
        let fields = params.selected_fields();

        let select = build_select(kind, params, &fields);
        debug!(sql = %select.sql, params = select.params.len(), "Executing search");
        let rows = bind_params(sqlx::query(&select.sql), select.params)
            .fetch_all(self.db.pool())
            .await?;
        let items = rows
            .iter()
            .map(|row| decode_hit(row, &fields))
            .collect::<Result<Vec<_>>>()?;

        let total_results = if params.include_total_count {
            let count = build_count(kind, params);
            let row = bind_params(sqlx::query(&count.sql), count.params)
                .fetch_one(self.db.pool())
                .await?;
            Some(row.try_get::<i64, _>("total")?)
        } else {
            None
        };

        Ok(SearchResult {
            items,
            pagination: PaginationInfo {
                max_results: params.max_results,
                offset: params.offset,
                total_results,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_binds_every_user_value() {
        let params = SearchParameters::new()
            .condition(Condition::parse("fedora_id=info:fedora/a*").unwrap())
            .condition(Condition::parse("content_size>10").unwrap());
        let builder = build_select(DbKind::Postgres, &params, &DEFAULT_FIELDS);

        assert!(builder.sql.contains("s.fedora_id ILIKE $1"));
        assert!(builder.sql.contains("s.content_size > $2"));
        assert!(builder.sql.ends_with("LIMIT $3 OFFSET $4"));
        assert!(!builder.sql.contains("info:fedora"));
        assert_eq!(builder.params.len(), 4);
    }

    #[test]
    fn test_type_join_only_when_requested() {
        let params = SearchParameters::new();
        let plain = build_select(DbKind::Sqlite, &params, &DEFAULT_FIELDS);
        assert!(!plain.sql.contains("search_rdf_type"));

        let with_types = build_select(DbKind::MySql, &params, &[Field::FedoraId, Field::RdfType]);
        assert!(with_types.sql.contains("GROUP_CONCAT(DISTINCT"));
        assert!(with_types.sql.contains("r.rdf_type AS rdf_type"));
    }

    #[test]
    fn test_wildcard_only_adds_no_filter() {
        let params = SearchParameters::new().condition(Condition::parse("rdf_type=*").unwrap());
        let count = build_count(DbKind::Sqlite, &params);
        assert_eq!(count.sql, "SELECT COUNT(*) AS total FROM simple_search s");
        assert!(count.params.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_paging() {
        assert!(SearchParameters::new().max_results(0).validate().is_err());
        assert!(SearchParameters::new().offset(-1).validate().is_err());
        assert!(
            SearchParameters::new()
                .order_by(Field::RdfType, SortOrder::Asc)
                .validate()
                .is_err()
        );
        assert!(SearchParameters::new().validate().is_ok());
    }

    #[test]
    fn test_wildcards_match_case_insensitively_on_every_engine() {
        let params = SearchParameters::new()
            .condition(Condition::parse("mime_type=Text/*").unwrap())
            .condition(Condition::parse("rdf_type=*book").unwrap());

        let postgres = build_count(DbKind::Postgres, &params);
        assert!(postgres.sql.contains("s.mime_type ILIKE $1"));
        assert!(postgres.sql.contains("rt.rdf_type_uri ILIKE $2"));

        let sqlite = build_count(DbKind::Sqlite, &params);
        assert!(sqlite.sql.contains("s.mime_type LIKE ?"));
        assert!(sqlite.sql.contains("rt.rdf_type_uri LIKE ?"));
    }

    #[test]
    fn test_secondary_order_keeps_pages_stable() {
        let params = SearchParameters::new().order_by(Field::Modified, SortOrder::Desc);
        let builder = build_select(DbKind::Sqlite, &params, &DEFAULT_FIELDS);
        assert!(builder.sql.contains("ORDER BY s.modified DESC, s.fedora_id ASC"));
    }
}

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Limit must be non-negative")]
    InvalidLimit,

    #[error("Offset must be non-negative")]
    InvalidOffset,
}

/// Soft-delete scope threaded through every query. Valid and Deleted
/// partition the entity set exactly; Unscoped sees both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Valid,
    Deleted,
    Unscoped,
}

impl Visibility {
    fn predicate(&self) -> Option<&'static str> {
        match self {
            Visibility::Valid => Some("\"is_deleted\" = FALSE"),
            Visibility::Deleted => Some("\"is_deleted\" = TRUE"),
            Visibility::Unscoped => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A `created`-range bound. Date-only bounds deserialize from plain dates;
/// an upper bound without a time component is inclusive through end-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DateBound {
    Timestamp(DateTime<Utc>),
    Day(NaiveDate),
}

impl DateBound {
    pub fn lower(&self) -> DateTime<Utc> {
        match self {
            DateBound::Timestamp(t) => *t,
            DateBound::Day(d) => d.and_time(NaiveTime::MIN).and_utc(),
        }
    }

    /// Date-only upper bounds shift forward one day so records created any
    /// time on the named day fall inside the range.
    pub fn upper(&self) -> DateTime<Utc> {
        match self {
            DateBound::Timestamp(t) => *t,
            DateBound::Day(d) => d.succ_opt().unwrap_or(*d).and_time(NaiveTime::MIN).and_utc(),
        }
    }
}

/// Typed SQL parameter. Exact-match values arrive as JSON and are mapped to
/// the closest Postgres type before binding.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl SqlParam {
    pub fn from_value(value: &Value) -> SqlParam {
        match value {
            Value::Bool(b) => SqlParam::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlParam::Int(i)
                } else if let Some(f) = n.as_f64() {
                    SqlParam::Float(f)
                } else {
                    SqlParam::Str(n.to_string())
                }
            }
            Value::String(s) => SqlParam::Str(s.clone()),
            Value::Null => SqlParam::Json(Value::Null),
            other => SqlParam::Json(other.clone()),
        }
    }

    /// Column-aware mapping: uuid-shaped strings bind as `uuid` only against
    /// uuid columns (`id` and `*_id`). On text columns they stay text, so a
    /// value that merely looks like a uuid still matches varchar.
    pub fn for_column(field: &str, value: &Value) -> SqlParam {
        if let Value::String(s) = value {
            if is_uuid_column(field) {
                if let Ok(u) = Uuid::parse_str(s) {
                    return SqlParam::Uuid(u);
                }
            }
            return SqlParam::Str(s.clone());
        }
        Self::from_value(value)
    }
}

fn is_uuid_column(field: &str) -> bool {
    field == "id" || field.ends_with("_id")
}

#[derive(Debug, Clone)]
pub struct SqlPlan {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

#[derive(Debug, Clone)]
struct SearchSpec {
    fields: Vec<String>,
    needle: String,
}

/// Composable single-table query: visibility scope + AND'd exact matches +
/// OR'd case-insensitive substring search + optional `created` range,
/// ordered by `created` descending unless overridden.
#[derive(Debug, Clone)]
pub struct EntityQuery {
    table: &'static str,
    visibility: Visibility,
    eq: Vec<(String, Value)>,
    search: Option<SearchSpec>,
    created_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    order: Vec<(String, SortDirection)>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl EntityQuery {
    pub fn new(table: &'static str, visibility: Visibility) -> Self {
        Self {
            table,
            visibility,
            eq: vec![],
            search: None,
            created_range: None,
            order: vec![("created".to_string(), SortDirection::Desc)],
            limit: None,
            offset: None,
        }
    }

    /// Add an exact-match condition. A caller-supplied `is_deleted` never
    /// escapes the visibility scope: under Valid or Deleted it is dropped.
    pub fn eq(&mut self, field: &str, value: Value) -> Result<&mut Self, QueryError> {
        validate_identifier(field)?;
        if field == "is_deleted" && self.visibility != Visibility::Unscoped {
            return Ok(self);
        }
        self.eq.push((field.to_string(), value));
        Ok(self)
    }

    pub fn search(&mut self, fields: &[&str], needle: &str) -> Result<&mut Self, QueryError> {
        for field in fields {
            validate_identifier(field)?;
        }
        if !fields.is_empty() && !needle.is_empty() {
            self.search = Some(SearchSpec {
                fields: fields.iter().map(|s| s.to_string()).collect(),
                needle: needle.to_string(),
            });
        }
        Ok(self)
    }

    pub fn created_between(&mut self, from: DateBound, to: DateBound) -> &mut Self {
        self.created_range = Some((from.lower(), to.upper()));
        self
    }

    pub fn order_by(&mut self, field: &str, direction: SortDirection) -> Result<&mut Self, QueryError> {
        validate_identifier(field)?;
        self.order = vec![(field.to_string(), direction)];
        Ok(self)
    }

    pub fn limit(&mut self, limit: i64) -> Result<&mut Self, QueryError> {
        if limit < 0 {
            return Err(QueryError::InvalidLimit);
        }
        self.limit = Some(limit);
        Ok(self)
    }

    pub fn offset(&mut self, offset: i64) -> Result<&mut Self, QueryError> {
        if offset < 0 {
            return Err(QueryError::InvalidOffset);
        }
        self.offset = Some(offset);
        Ok(self)
    }

    pub fn to_sql(&self) -> SqlPlan {
        let (where_clause, params) = self.build_where();

        let mut sql = format!("SELECT * FROM \"{}\" WHERE {}", self.table, where_clause);
        if !self.order.is_empty() {
            let parts: Vec<String> = self
                .order
                .iter()
                .map(|(col, dir)| format!("\"{}\" {}", col, dir.to_sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", parts.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        SqlPlan { sql, params }
    }

    /// Count of the same filtered query, without ordering or pagination.
    pub fn to_count_sql(&self) -> SqlPlan {
        let (where_clause, params) = self.build_where();
        SqlPlan {
            sql: format!(
                "SELECT COUNT(*) as count FROM \"{}\" WHERE {}",
                self.table, where_clause
            ),
            params,
        }
    }

    fn build_where(&self) -> (String, Vec<SqlParam>) {
        let mut params: Vec<SqlParam> = vec![];
        let mut conditions: Vec<String> = vec![];

        if let Some(predicate) = self.visibility.predicate() {
            conditions.push(predicate.to_string());
        }

        for (field, value) in &self.eq {
            if value.is_null() {
                conditions.push(format!("\"{}\" IS NULL", field));
            } else {
                params.push(SqlParam::for_column(field, value));
                conditions.push(format!("\"{}\" = ${}", field, params.len()));
            }
        }

        if let Some(search) = &self.search {
            let needle = format!("%{}%", escape_like(&search.needle));
            let mut ors: Vec<String> = vec![];
            for field in &search.fields {
                params.push(SqlParam::Str(needle.clone()));
                ors.push(format!("\"{}\" ILIKE ${}", field, params.len()));
            }
            conditions.push(format!("({})", ors.join(" OR ")));
        }

        if let Some((from, to)) = self.created_range {
            params.push(SqlParam::Timestamp(from));
            let lo = params.len();
            params.push(SqlParam::Timestamp(to));
            let hi = params.len();
            conditions.push(format!("\"created\" BETWEEN ${} AND ${}", lo, hi));
        }

        let where_clause = if conditions.is_empty() {
            "1=1".to_string()
        } else {
            conditions.join(" AND ")
        };
        (where_clause, params)
    }
}

pub fn validate_identifier(name: &str) -> Result<(), QueryError> {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(QueryError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_view_injects_soft_delete_predicate() {
        let plan = EntityQuery::new("user", Visibility::Valid).to_sql();
        assert_eq!(
            plan.sql,
            "SELECT * FROM \"user\" WHERE \"is_deleted\" = FALSE ORDER BY \"created\" DESC"
        );
        assert!(plan.params.is_empty());
    }

    #[test]
    fn deleted_view_forces_opposite_predicate() {
        let plan = EntityQuery::new("user", Visibility::Deleted).to_sql();
        assert!(plan.sql.contains("\"is_deleted\" = TRUE"));
    }

    #[test]
    fn views_partition_by_flag() {
        // Same filters, opposite scopes: predicates are mutually exclusive
        let valid = EntityQuery::new("user", Visibility::Valid).to_sql().sql;
        let deleted = EntityQuery::new("user", Visibility::Deleted).to_sql().sql;
        assert!(valid.contains("= FALSE") && !valid.contains("= TRUE"));
        assert!(deleted.contains("= TRUE") && !deleted.contains("= FALSE"));
    }

    #[test]
    fn caller_cannot_override_visibility() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.eq("is_deleted", json!(true)).unwrap();
        let plan = q.to_sql();
        assert!(plan.sql.contains("\"is_deleted\" = FALSE"));
        assert!(!plan.sql.contains("$1"));
    }

    #[test]
    fn unscoped_passes_is_deleted_through() {
        let mut q = EntityQuery::new("user", Visibility::Unscoped);
        q.eq("is_deleted", json!(true)).unwrap();
        let plan = q.to_sql();
        assert!(plan.sql.contains("\"is_deleted\" = $1"));
        assert_eq!(plan.params, vec![SqlParam::Bool(true)]);
    }

    #[test]
    fn exact_matches_and_combined() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.eq("email", json!("a@b.com")).unwrap();
        q.eq("is_active", json!(true)).unwrap();
        let plan = q.to_sql();
        assert!(plan
            .sql
            .contains("\"is_deleted\" = FALSE AND \"email\" = $1 AND \"is_active\" = $2"));
        assert_eq!(plan.params.len(), 2);
    }

    #[test]
    fn search_is_or_combined_ilike() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.eq("is_active", json!(true)).unwrap();
        q.search(&["username", "email"], "ali").unwrap();
        let plan = q.to_sql();
        assert!(plan
            .sql
            .contains("(\"username\" ILIKE $2 OR \"email\" ILIKE $3)"));
        assert_eq!(plan.params[1], SqlParam::Str("%ali%".to_string()));
        assert_eq!(plan.params[2], SqlParam::Str("%ali%".to_string()));
    }

    #[test]
    fn search_needle_escapes_like_metacharacters() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.search(&["username"], "50%_off").unwrap();
        let plan = q.to_sql();
        assert_eq!(plan.params[0], SqlParam::Str("%50\\%\\_off%".to_string()));
    }

    #[test]
    fn date_only_upper_bound_extends_through_end_of_day() {
        let from = DateBound::Day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let to = DateBound::Day(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        let mut q = EntityQuery::new("ticket", Visibility::Valid);
        q.created_between(from, to);
        let plan = q.to_sql();
        assert!(plan.sql.contains("\"created\" BETWEEN $1 AND $2"));

        let created = "2024-01-02T23:59:00Z".parse::<DateTime<Utc>>().unwrap();
        match (&plan.params[0], &plan.params[1]) {
            (SqlParam::Timestamp(lo), SqlParam::Timestamp(hi)) => {
                assert!(*lo <= created && created <= *hi);
            }
            other => panic!("expected timestamp params, got {:?}", other),
        }
    }

    #[test]
    fn timestamp_upper_bound_is_used_verbatim() {
        let to_ts = "2024-01-02T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let bound = DateBound::Timestamp(to_ts);
        assert_eq!(bound.upper(), to_ts);
    }

    #[test]
    fn null_value_becomes_is_null() {
        let mut q = EntityQuery::new("user", Visibility::Unscoped);
        q.eq("deleted_reason", Value::Null).unwrap();
        let plan = q.to_sql();
        assert!(plan.sql.contains("\"deleted_reason\" IS NULL"));
        assert!(plan.params.is_empty());
    }

    #[test]
    fn pagination_applies_limit_and_offset() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.limit(10).unwrap();
        q.offset(20).unwrap();
        let plan = q.to_sql();
        assert!(plan.sql.ends_with("ORDER BY \"created\" DESC LIMIT 10 OFFSET 20"));
    }

    #[test]
    fn count_sql_ignores_order_and_pagination() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.eq("is_active", json!(true)).unwrap();
        q.limit(10).unwrap();
        q.offset(20).unwrap();
        let plan = q.to_count_sql();
        assert_eq!(
            plan.sql,
            "SELECT COUNT(*) as count FROM \"user\" WHERE \"is_deleted\" = FALSE AND \"is_active\" = $1"
        );
    }

    #[test]
    fn rejects_hostile_identifiers() {
        let mut q = EntityQuery::new("user", Visibility::Valid);
        assert!(q.eq("email\" OR 1=1 --", json!("x")).is_err());
        assert!(q.order_by("1; DROP TABLE", SortDirection::Asc).is_err());
    }

    #[test]
    fn uuid_shaped_strings_bind_as_uuid_on_id_columns() {
        let id = Uuid::new_v4();
        let mut q = EntityQuery::new("ticket", Visibility::Valid);
        q.eq("event_id", json!(id.to_string())).unwrap();
        let plan = q.to_sql();
        assert_eq!(plan.params[0], SqlParam::Uuid(id));
    }

    #[test]
    fn uuid_shaped_strings_stay_text_on_text_columns() {
        // A username that happens to look like a uuid must still compare
        // against varchar, not be coerced to a uuid parameter.
        let value = Uuid::new_v4().to_string();
        let mut q = EntityQuery::new("user", Visibility::Valid);
        q.eq("username", json!(value.clone())).unwrap();
        let plan = q.to_sql();
        assert_eq!(plan.params[0], SqlParam::Str(value));
    }
}

use serde_json::{Map, Value};
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Postgres, Row, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::database::entity::{Entity, Patch, RelationDef, SYSTEM_COLUMNS};
use crate::database::query::{DateBound, EntityQuery, QueryError, SqlParam, SqlPlan, Visibility};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Object matching query not found")]
    NotFound,

    /// A unique lookup matched several rows: a modeling or filter bug, not a
    /// normal miss.
    #[error("Multiple objects returned for '{0}'")]
    MultipleFound(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("System field '{0}' cannot be set")]
    SystemField(String),

    #[error("Invalid value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Per-entity data accessor. Holds an explicit pool handle (scoped at the
/// request boundary, never a process-wide session) and a visibility scope
/// injected into every query it builds.
pub struct Repository<T> {
    pool: PgPool,
    visibility: Visibility,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Entity> Repository<T> {
    pub fn new(pool: PgPool, visibility: Visibility) -> Self {
        Self {
            pool,
            visibility,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Valid view: only rows with `is_deleted = false`.
    pub fn valid(pool: PgPool) -> Self {
        Self::new(pool, Visibility::Valid)
    }

    /// Deleted view: only soft-deleted rows.
    pub fn deleted(pool: PgPool) -> Self {
        Self::new(pool, Visibility::Deleted)
    }

    pub fn unscoped(pool: PgPool) -> Self {
        Self::new(pool, Visibility::Unscoped)
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Build a composable query from exact-match fields, an optional
    /// substring search, and an optional `created` date range.
    pub fn filter_query(
        &self,
        exact: &Map<String, Value>,
        search: Option<(&[&str], &str)>,
        date_range: Option<(DateBound, DateBound)>,
    ) -> Result<EntityQuery, RepoError> {
        let mut query = EntityQuery::new(T::TABLE, self.visibility);

        for (field, value) in exact {
            check_field::<T>(field)?;
            query.eq(field, value.clone())?;
        }

        if let Some((fields, needle)) = search {
            for field in fields {
                check_field::<T>(field)?;
            }
            query.search(fields, needle)?;
        }

        if let Some((from, to)) = date_range {
            query.created_between(from, to);
        }

        Ok(query)
    }

    pub async fn select(&self, query: &EntityQuery) -> Result<Vec<T>, RepoError> {
        let plan = query.to_sql();
        let rows = bind_query_as(sqlx::query_as::<_, T>(&plan.sql), &plan.params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Unpaginated count of the same filtered query.
    pub async fn count(&self, query: &EntityQuery) -> Result<i64, RepoError> {
        let plan = query.to_count_sql();
        let row = bind_query(sqlx::query(&plan.sql), &plan.params)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("count")?)
    }

    /// Exact-match listing, ordered by `created` descending.
    pub async fn filter(&self, exact: &Map<String, Value>) -> Result<Vec<T>, RepoError> {
        let query = self.filter_query(exact, None, None)?;
        self.select(&query).await
    }

    pub async fn filter_exists(&self, exact: &Map<String, Value>) -> Result<bool, RepoError> {
        let query = self.filter_query(exact, None, None)?;
        Ok(self.count(&query).await? > 0)
    }

    pub async fn all(&self) -> Result<Vec<T>, RepoError> {
        self.filter(&Map::new()).await
    }

    /// Exactly one match: zero rows is NotFound, more than one is an
    /// integrity error, never a normal 404.
    pub async fn get(&self, exact: &Map<String, Value>) -> Result<T, RepoError> {
        let mut query = self.filter_query(exact, None, None)?;
        query.limit(2)?;
        let rows = self.select(&query).await?;

        let mut it = rows.into_iter();
        match (it.next(), it.next()) {
            (Some(row), None) => Ok(row),
            (None, _) => Err(RepoError::NotFound),
            (Some(_), Some(_)) => Err(RepoError::MultipleFound(T::TABLE.to_string())),
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<T, RepoError> {
        let mut exact = Map::new();
        exact.insert("id".to_string(), Value::String(id.to_string()));
        self.get(&exact).await
    }

    /// Get, or create from kwargs merged with defaults (defaults win, as the
    /// callers that seed fixtures rely on).
    pub async fn get_or_create(
        &self,
        defaults: Map<String, Value>,
        exact: Map<String, Value>,
    ) -> Result<(T, bool), RepoError> {
        match self.get(&exact).await {
            Ok(row) => Ok((row, false)),
            Err(RepoError::NotFound) => {
                let mut data = exact;
                for (key, value) in defaults {
                    data.insert(key, value);
                }
                let patch = Patch::parse::<T>(Value::Object(data))?;
                Ok((self.create(patch).await?, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a new entity. System columns are assigned server-side; the
    /// returned row is the persisted state (RETURNING *).
    pub async fn create(&self, patch: Patch) -> Result<T, RepoError> {
        let id = Uuid::new_v4();
        let plan = insert_plan::<T>(id, &patch);

        let mut tx = self.pool.begin().await?;
        let row = bind_query_as(sqlx::query_as::<_, T>(&plan.sql), &plan.params)
            .fetch_one(&mut *tx)
            .await?;
        apply_relations(&mut tx, id, patch.relations()).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Apply scalar assignments and full relation replacements in one
    /// transaction; any failure rolls the whole write back. Returns the row
    /// as persisted, not the pre-mutation reference.
    pub async fn update(&self, id: Uuid, patch: Patch) -> Result<T, RepoError> {
        let plan = update_plan::<T>(self.visibility, id, &patch);

        let mut tx = self.pool.begin().await?;
        let row = bind_query_as(sqlx::query_as::<_, T>(&plan.sql), &plan.params)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(RepoError::NotFound)?;
        apply_relations(&mut tx, id, patch.relations()).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Soft delete: flips `is_deleted`, never removes the row.
    pub async fn delete(&self, id: Uuid) -> Result<T, RepoError> {
        let plan = delete_plan::<T>(self.visibility, id);
        let row = bind_query_as(sqlx::query_as::<_, T>(&plan.sql), &plan.params)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)?;
        Ok(row)
    }
}

fn check_field<T: Entity>(field: &str) -> Result<(), RepoError> {
    if T::COLUMNS.contains(&field) || SYSTEM_COLUMNS.contains(&field) {
        Ok(())
    } else {
        Err(RepoError::UnknownField(field.to_string()))
    }
}

fn insert_plan<T: Entity>(id: Uuid, patch: &Patch) -> SqlPlan {
    let mut columns = String::from("\"id\", \"created\", \"updated\", \"is_deleted\"");
    let mut values = String::from("$1, now(), now(), FALSE");
    let mut params = vec![SqlParam::Uuid(id)];

    for (field, value) in patch.fields() {
        params.push(SqlParam::for_column(field, value));
        columns.push_str(&format!(", \"{}\"", field));
        values.push_str(&format!(", ${}", params.len()));
    }

    SqlPlan {
        sql: format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) RETURNING *",
            T::TABLE,
            columns,
            values
        ),
        params,
    }
}

fn update_plan<T: Entity>(visibility: Visibility, id: Uuid, patch: &Patch) -> SqlPlan {
    let mut assignments = String::from("\"updated\" = now()");
    let mut params = vec![SqlParam::Uuid(id)];

    for (field, value) in patch.fields() {
        params.push(SqlParam::for_column(field, value));
        assignments.push_str(&format!(", \"{}\" = ${}", field, params.len()));
    }

    let mut sql = format!(
        "UPDATE \"{}\" SET {} WHERE \"id\" = $1",
        T::TABLE,
        assignments
    );
    match visibility {
        Visibility::Valid => sql.push_str(" AND \"is_deleted\" = FALSE"),
        Visibility::Deleted => sql.push_str(" AND \"is_deleted\" = TRUE"),
        Visibility::Unscoped => {}
    }
    sql.push_str(" RETURNING *");

    SqlPlan { sql, params }
}

fn delete_plan<T: Entity>(visibility: Visibility, id: Uuid) -> SqlPlan {
    let mut sql = format!(
        "UPDATE \"{}\" SET \"is_deleted\" = TRUE, \"updated\" = now() WHERE \"id\" = $1",
        T::TABLE
    );
    match visibility {
        Visibility::Valid => sql.push_str(" AND \"is_deleted\" = FALSE"),
        Visibility::Deleted => sql.push_str(" AND \"is_deleted\" = TRUE"),
        Visibility::Unscoped => {}
    }
    sql.push_str(" RETURNING *");

    SqlPlan {
        sql,
        params: vec![SqlParam::Uuid(id)],
    }
}

fn relation_sql(relation: &RelationDef) -> (String, String) {
    (
        format!(
            "DELETE FROM \"{}\" WHERE \"{}\" = $1",
            relation.join_table, relation.local_key
        ),
        format!(
            "INSERT INTO \"{}\" (\"{}\", \"{}\") VALUES ($1, $2)",
            relation.join_table, relation.local_key, relation.foreign_key
        ),
    )
}

/// Full replacement: clear the join table for this row, then insert exactly
/// the requested members. Previous members not re-listed are gone.
async fn apply_relations(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    relations: &[(&'static RelationDef, Vec<Uuid>)],
) -> Result<(), RepoError> {
    for (relation, ids) in relations {
        let (clear_sql, insert_sql) = relation_sql(relation);
        sqlx::query(&clear_sql).bind(id).execute(&mut **tx).await?;
        for related_id in ids {
            sqlx::query(&insert_sql)
                .bind(id)
                .bind(*related_id)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

fn bind_query<'q>(
    mut q: sqlx::query::Query<'q, Postgres, PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    for p in params {
        q = match p {
            SqlParam::Bool(b) => q.bind(*b),
            SqlParam::Int(i) => q.bind(*i),
            SqlParam::Float(f) => q.bind(*f),
            SqlParam::Str(s) => q.bind(s.clone()),
            SqlParam::Uuid(u) => q.bind(*u),
            SqlParam::Timestamp(t) => q.bind(*t),
            SqlParam::Json(v) => q.bind(v.clone()),
        };
    }
    q
}

fn bind_query_as<'q, O>(
    mut q: sqlx::query::QueryAs<'q, Postgres, O, PgArguments>,
    params: &[SqlParam],
) -> sqlx::query::QueryAs<'q, Postgres, O, PgArguments>
where
    O: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow>,
{
    for p in params {
        q = match p {
            SqlParam::Bool(b) => q.bind(*b),
            SqlParam::Int(i) => q.bind(*i),
            SqlParam::Float(f) => q.bind(*f),
            SqlParam::Str(s) => q.bind(s.clone()),
            SqlParam::Uuid(u) => q.bind(*u),
            SqlParam::Timestamp(t) => q.bind(*t),
            SqlParam::Json(v) => q.bind(v.clone()),
        };
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::Event;
    use crate::models::user::User;
    use serde_json::json;

    #[test]
    fn insert_assigns_system_columns_server_side() {
        let patch = Patch::parse::<User>(json!({ "email": "a@b.com", "username": "a" })).unwrap();
        let plan = insert_plan::<User>(Uuid::new_v4(), &patch);
        assert!(plan.sql.starts_with("INSERT INTO \"user\""));
        assert!(plan.sql.contains("\"id\", \"created\", \"updated\", \"is_deleted\""));
        assert!(plan.sql.contains("VALUES ($1, now(), now(), FALSE"));
        assert!(plan.sql.ends_with("RETURNING *"));
        // id plus the two payload fields
        assert_eq!(plan.params.len(), 3);
    }

    #[test]
    fn update_touches_updated_and_respects_visibility() {
        let patch = Patch::parse::<User>(json!({ "first_name": "Ada" })).unwrap();
        let plan = update_plan::<User>(Visibility::Valid, Uuid::new_v4(), &patch);
        assert_eq!(
            plan.sql,
            "UPDATE \"user\" SET \"updated\" = now(), \"first_name\" = $2 \
             WHERE \"id\" = $1 AND \"is_deleted\" = FALSE RETURNING *"
        );
    }

    #[test]
    fn delete_is_soft() {
        let plan = delete_plan::<User>(Visibility::Valid, Uuid::new_v4());
        assert!(plan.sql.starts_with("UPDATE \"user\" SET \"is_deleted\" = TRUE"));
        assert!(!plan.sql.contains("DELETE FROM"));
    }

    #[test]
    fn delete_respects_visibility_scope() {
        let valid = delete_plan::<User>(Visibility::Valid, Uuid::new_v4());
        assert!(valid.sql.contains("AND \"is_deleted\" = FALSE"));

        // The Deleted view must not reach live rows
        let deleted = delete_plan::<User>(Visibility::Deleted, Uuid::new_v4());
        assert!(deleted.sql.contains("AND \"is_deleted\" = TRUE"));

        let unscoped = delete_plan::<User>(Visibility::Unscoped, Uuid::new_v4());
        assert!(!unscoped.sql.contains("AND \"is_deleted\""));
    }

    #[test]
    fn relation_replacement_clears_before_inserting() {
        let relation = &Event::RELATIONS[0];
        let (clear_sql, insert_sql) = relation_sql(relation);
        assert_eq!(clear_sql, "DELETE FROM \"event_tag\" WHERE \"event_id\" = $1");
        assert_eq!(
            insert_sql,
            "INSERT INTO \"event_tag\" (\"event_id\", \"tag_id\") VALUES ($1, $2)"
        );
    }

    #[test]
    fn unknown_filter_field_is_rejected() {
        assert!(check_field::<User>("email").is_ok());
        assert!(check_field::<User>("created").is_ok());
        assert!(matches!(
            check_field::<User>("no_such_column"),
            Err(RepoError::UnknownField(_))
        ));
    }
}

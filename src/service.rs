use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::api::envelope::{ApiResponse, ApiResult};
use crate::database::entity::{Entity, Patch};
use crate::database::repository::Repository;
use crate::error::ApiError;
use crate::pagination::{Page, PageFilter, Paginator};

/// Generic CRUD orchestration over the valid (non-deleted) view of an entity.
/// Handlers stay thin: they parse input, call one method here, and return the
/// enveloped result. `Out` is the response shape, converted from the stored
/// row so internal columns (password hashes and the like) never leak.
pub struct CrudService<T> {
    repo: Repository<T>,
}

impl<T: Entity> CrudService<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repo: Repository::valid(pool),
        }
    }

    pub fn repo(&self) -> &Repository<T> {
        &self.repo
    }

    pub async fn create<Out>(&self, payload: Value) -> ApiResult<Out>
    where
        Out: From<T> + Serialize,
    {
        let patch = Patch::parse::<T>(payload)?;
        let row = self.repo.create(patch).await?;
        Ok(ApiResponse::created(Out::from(row)))
    }

    pub async fn get<Out>(&self, id: Uuid) -> ApiResult<Out>
    where
        Out: From<T> + Serialize,
    {
        let row = self.repo.get_by_id(id).await?;
        Ok(ApiResponse::success(
            Out::from(row),
            "Data retrieved successfully",
        ))
    }

    /// Paginated listing. Exact-match fields, substring search over the
    /// entity's searchable columns, and the created-date range all narrow the
    /// same query; the total reflects the narrowed set.
    pub async fn list<Out>(&self, filter: PageFilter) -> ApiResult<Page<Out>>
    where
        Out: From<T> + Serialize,
    {
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| (T::SEARCHABLE, s));
        let query = self
            .repo
            .filter_query(&filter.fields, search, filter.date_range())?;
        let page =
            Paginator::get_page(&self.repo, query, filter.page_index(), filter.page_size()).await?;
        Ok(ApiResponse::success(
            page.map(Out::from),
            "Data retrieved successfully",
        ))
    }

    pub async fn unpaginated_list<Out>(&self, filter: &PageFilter) -> ApiResult<Vec<Out>>
    where
        Out: From<T> + Serialize,
    {
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| (T::SEARCHABLE, s));
        let query = self
            .repo
            .filter_query(&filter.fields, search, filter.date_range())?;
        let rows = self.repo.select(&query).await?;
        Ok(ApiResponse::success(
            rows.into_iter().map(Out::from).collect(),
            "Data retrieved successfully",
        ))
    }

    pub async fn update<Out>(&self, id: Uuid, payload: Value) -> ApiResult<Out>
    where
        Out: From<T> + Serialize,
    {
        let patch = Patch::parse::<T>(payload)?;
        if patch.is_empty() {
            return Err(ApiError::validation("No fields to update"));
        }
        let row = self.repo.update(id, patch).await?;
        Ok(ApiResponse::success(
            Out::from(row),
            "Data updated successfully",
        ))
    }

    pub async fn delete(&self, id: Uuid) -> ApiResult<Value> {
        self.repo.delete(id).await?;
        Ok(ApiResponse::message_only("Data deleted successfully"))
    }
}

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::envelope::ApiResult;
use crate::database::query::DateBound;
use crate::middleware::CurrentUser;
use crate::models::event::{Event, EventOut};
use crate::pagination::{Page, PageFilter};
use crate::service::CrudService;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventListQuery {
    pub page_index: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub date_from: Option<DateBound>,
    pub date_to: Option<DateBound>,
    pub name: Option<String>,
    pub venue: Option<String>,
}

impl EventListQuery {
    fn into_filter(self) -> PageFilter {
        PageFilter {
            page_index: self.page_index,
            page_size: self.page_size,
            search: self.search,
            date_from: self.date_from,
            date_to: self.date_to,
            ..Default::default()
        }
        .with_field("name", self.name.map_or(Value::Null, Value::String))
        .with_field("venue", self.venue.map_or(Value::Null, Value::String))
    }
}

/// POST /api/events - create an event. A `related_objects.tags` list in the
/// payload attaches tags atomically with the insert.
pub async fn create(
    State(state): State<AppState>,
    _current: CurrentUser,
    Json(payload): Json<Value>,
) -> ApiResult<EventOut> {
    CrudService::<Event>::new(state.pool)
        .create::<EventOut>(payload)
        .await
}

/// GET /api/events - paginated listing of non-deleted events.
pub async fn list(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<EventListQuery>,
) -> ApiResult<Page<EventOut>> {
    CrudService::<Event>::new(state.pool)
        .list::<EventOut>(query.into_filter())
        .await
}

/// GET /api/events/all - the full filtered set, no pagination.
pub async fn list_all(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<EventListQuery>,
) -> ApiResult<Vec<EventOut>> {
    CrudService::<Event>::new(state.pool)
        .unpaginated_list::<EventOut>(&query.into_filter())
        .await
}

/// GET /api/events/:id
pub async fn get(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<EventOut> {
    CrudService::<Event>::new(state.pool)
        .get::<EventOut>(id)
        .await
}

/// PATCH /api/events/:id - partial update; `related_objects.tags` replaces
/// the tag set wholesale.
pub async fn update(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> ApiResult<EventOut> {
    CrudService::<Event>::new(state.pool)
        .update::<EventOut>(id, payload)
        .await
}

/// DELETE /api/events/:id - soft delete.
pub async fn delete(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    CrudService::<Event>::new(state.pool).delete(id).await
}

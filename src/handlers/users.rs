use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::envelope::{ApiResponse, ApiResult};
use crate::database::query::DateBound;
use crate::error::ApiError;
use crate::middleware::CurrentUser;
use crate::models::user::{User, UserOut};
use crate::pagination::{Page, PageFilter};
use crate::service::CrudService;
use crate::state::AppState;

/// Listing parameters: pagination plus user-specific exact filters. Declared
/// explicitly so unknown query keys are ignored rather than hitting the
/// column check.
#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub page_index: Option<i64>,
    pub page_size: Option<i64>,
    pub search: Option<String>,
    pub date_from: Option<DateBound>,
    pub date_to: Option<DateBound>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

impl UserListQuery {
    fn into_filter(self) -> PageFilter {
        PageFilter {
            page_index: self.page_index,
            page_size: self.page_size,
            search: self.search,
            date_from: self.date_from,
            date_to: self.date_to,
            ..Default::default()
        }
        .with_field("username", self.username.map_or(Value::Null, Value::String))
        .with_field("email", self.email.map_or(Value::Null, Value::String))
        .with_field("is_active", self.is_active.map_or(Value::Null, Value::Bool))
        .with_field(
            "is_verified",
            self.is_verified.map_or(Value::Null, Value::Bool),
        )
    }
}

/// GET /api/users - paginated listing of non-deleted users.
pub async fn list(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Page<UserOut>> {
    CrudService::<User>::new(state.pool)
        .list::<UserOut>(query.into_filter())
        .await
}

/// GET /api/users/me - the authenticated user.
pub async fn me(CurrentUser(user): CurrentUser) -> ApiResult<UserOut> {
    Ok(ApiResponse::success(
        UserOut::from(user),
        "Data retrieved successfully",
    ))
}

/// GET /api/users/:id
pub async fn get(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<UserOut> {
    CrudService::<User>::new(state.pool).get::<UserOut>(id).await
}

/// PATCH /api/users/:id - partial update. Password changes go through
/// registration-grade validation and are stored hashed; they never pass
/// through the generic patch path as plain text.
pub async fn update(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<Value>,
) -> ApiResult<UserOut> {
    if let Some(object) = payload.as_object_mut() {
        if let Some(password) = object.remove("password") {
            let password = password
                .as_str()
                .ok_or_else(|| ApiError::validation("Password must be a string"))?;
            crate::validate::validate_password(password)?;
            object.insert(
                "password".to_string(),
                json!(crate::auth::password::hash_password(password)?),
            );
        }
        if let Some(phone) = object.get("phone_number").and_then(Value::as_str) {
            crate::validate::validate_phone_number(phone)?;
        }
    }
    CrudService::<User>::new(state.pool)
        .update::<UserOut>(id, payload)
        .await
}

/// DELETE /api/users/:id - soft delete.
pub async fn delete(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Value> {
    CrudService::<User>::new(state.pool).delete(id).await
}

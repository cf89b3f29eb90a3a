use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::api::envelope::{ApiResponse, ApiResult};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{encode_token, Claims};
use crate::database::repository::{RepoError, Repository};
use crate::error::ApiError;
use crate::models::user::{User, UserOut};
use crate::service::CrudService;
use crate::state::AppState;
use crate::validate::{validate_email, validate_password, validate_phone_number};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub phone_number: Option<String>,
}

/// POST /auth/login - exchange credentials for a bearer token.
///
/// Wrong email and wrong password produce the same rejection, and the
/// password is always checked even when the account lookup misses, so timing
/// does not reveal which accounts exist.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Value> {
    let mut exact = Map::new();
    exact.insert("email".to_string(), Value::String(payload.email.clone()));
    exact.insert("is_active".to_string(), Value::Bool(true));

    let repo = Repository::<User>::valid(state.pool.clone());
    let user = match repo.get(&exact).await {
        Ok(user) => Some(user),
        Err(RepoError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };

    let stored_hash = user.as_ref().map(|u| u.password.as_str()).unwrap_or("");
    let verified = verify_password(&payload.password, stored_hash);

    let user = match (user, verified) {
        (Some(user), true) => user,
        _ => return Err(ApiError::validation("Incorrect email or password")),
    };

    let token = encode_token(&Claims::for_user(&user))?;
    tracing::info!(user_id = %user.id, "user logged in");

    Ok(ApiResponse::success(
        json!({
            "token": token,
            "token_type": "Bearer",
            "user": UserOut::from(user),
        }),
        "Login successful",
    ))
}

/// POST /auth/register - create an account and return it without the
/// password hash.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<UserOut> {
    validate_email(&payload.email)?;
    validate_password(&payload.password)?;
    if let Some(phone) = payload.phone_number.as_deref() {
        validate_phone_number(phone)?;
    }

    let mut exact = Map::new();
    exact.insert("email".to_string(), Value::String(payload.email.clone()));
    let repo = Repository::<User>::unscoped(state.pool.clone());
    if repo.filter_exists(&exact).await? {
        return Err(ApiError::validation("Email is already registered"));
    }

    let data = json!({
        "username": payload.username,
        "first_name": payload.first_name,
        "last_name": payload.last_name,
        "email": payload.email,
        "password": hash_password(&payload.password)?,
        "phone_number": payload.phone_number,
        "is_active": true,
        "is_verified": false,
    });

    let service = CrudService::<User>::new(state.pool);
    service.create::<UserOut>(data).await
}

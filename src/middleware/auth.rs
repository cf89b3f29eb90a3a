use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::auth::decode_token;
use crate::database::repository::{RepoError, Repository};
use crate::error::ApiError;
use crate::models::user::User;
use crate::state::AppState;

/// The authenticated user for this request, resolved from the bearer token
/// against the valid-user view. Present as a request extension once the auth
/// middleware has run.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

/// Bearer-token gate for protected routes. All failure modes (missing or
/// malformed header, bad signature, expiry, unknown or inactive subject)
/// collapse into the same 401 so callers cannot probe which accounts exist.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_user(&state, request.headers()).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

async fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_bearer(headers).ok_or(ApiError::Unauthorized)?;
    let claims = decode_token(token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;

    let mut exact = Map::new();
    exact.insert("id".to_string(), Value::String(user_id.to_string()));
    exact.insert("is_active".to_string(), Value::Bool(true));

    match Repository::<User>::valid(state.pool.clone()).get(&exact).await {
        Ok(user) => Ok(user),
        Err(RepoError::NotFound) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }
        // Route not behind the middleware: resolve directly.
        let user = resolve_user(state, &parts.headers).await?;
        Ok(CurrentUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_extraction_requires_scheme() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(extract_bearer(&headers).is_none());

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_bearer(&headers), Some("abc.def.ghi"));
    }
}

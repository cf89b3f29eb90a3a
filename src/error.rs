// HTTP API error types and the single kind -> status/message translation table
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// External message for every authentication failure. Token-invalid and
/// user-not-found must be indistinguishable to the caller.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token";

/// Message returned for any unclassified internal fault. The real error is
/// logged server-side and never reaches the client.
pub const INTERNAL_ERROR_MESSAGE: &str = "Something went wrong, please try again later";

#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    Validation { message: String, errors: Option<Value> },
    InvalidPageSize(i64),

    // 401 Unauthorized - always the constant message
    Unauthorized,

    // 404 Not Found
    NotFound(String),

    // 500 Internal Server Error - generic message, detail stays server-side
    Internal,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidPageSize(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::InvalidPageSize(size) => format!("Invalid page size: {}", size),
            ApiError::Unauthorized => INVALID_TOKEN_MESSAGE.to_string(),
            ApiError::NotFound(msg) => msg.clone(),
            ApiError::Internal => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    /// Error envelope: {success: false, message, errors?}. The errors key is
    /// omitted entirely when there is no detail to attach.
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "message": self.message(),
        });
        if let ApiError::Validation { errors: Some(errors), .. } = self {
            body["errors"] = errors.clone();
        }
        body
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation { message: message.into(), errors: None }
    }

    pub fn validation_with_errors(message: impl Into<String>, errors: Value) -> Self {
        ApiError::Validation { message: message.into(), errors: Some(errors) }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }
}

impl From<crate::database::repository::RepoError> for ApiError {
    fn from(err: crate::database::repository::RepoError) -> Self {
        use crate::database::repository::RepoError;
        match err {
            RepoError::NotFound => ApiError::not_found("Item not found"),
            RepoError::MultipleFound(table) => {
                // A unique lookup matching several rows is an integrity bug,
                // not a caller mistake.
                tracing::error!("multiple rows matched a unique lookup on '{}'", table);
                ApiError::Internal
            }
            RepoError::UnknownField(field) => {
                ApiError::validation(format!("Unknown field: {}", field))
            }
            RepoError::UnknownRelation(relation) => {
                ApiError::validation(format!("Unknown relation: {}", relation))
            }
            RepoError::SystemField(field) => ApiError::validation(format!(
                "System field '{}' cannot be set",
                field
            )),
            RepoError::InvalidValue { field, detail } => ApiError::validation_with_errors(
                "Invalid field value",
                json!({ field: detail }),
            ),
            RepoError::Query(e) => ApiError::validation(e.to_string()),
            RepoError::Sqlx(e) => {
                tracing::error!("database error: {}", e);
                ApiError::Internal
            }
        }
    }
}

impl From<crate::auth::token::TokenError> for ApiError {
    fn from(_err: crate::auth::token::TokenError) -> Self {
        ApiError::Unauthorized
    }
}

impl From<crate::pagination::PageError> for ApiError {
    fn from(err: crate::pagination::PageError) -> Self {
        match err {
            crate::pagination::PageError::InvalidPageSize(size) => ApiError::InvalidPageSize(size),
            crate::pagination::PageError::InvalidPageIndex(index) => {
                ApiError::validation(format!("Invalid page index: {}", index))
            }
            crate::pagination::PageError::Repo(e) => e.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_uses_constant_message() {
        let body = ApiError::Unauthorized.to_json();
        assert_eq!(body["message"], INVALID_TOKEN_MESSAGE);
        assert_eq!(body["success"], false);
        assert!(body.get("errors").is_none());
    }

    #[test]
    fn internal_never_leaks_detail() {
        let err: ApiError =
            crate::database::repository::RepoError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn validation_carries_errors_key() {
        let err = ApiError::validation_with_errors("Invalid input", json!({"email": "bad format"}));
        let body = err.to_json();
        assert_eq!(body["errors"]["email"], "bad format");
    }

    #[test]
    fn multiple_found_is_internal_not_404() {
        let err: ApiError =
            crate::database::repository::RepoError::MultipleFound("user".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

/// Message every 201 envelope carries, regardless of what the caller passed.
pub const CREATED_MESSAGE: &str = "Item created successfully";

/// Uniform outward shape: {success, data?, message, errors?}. Absent data
/// and errors keys are omitted entirely, not rendered as null.
#[derive(Debug, Serialize)]
pub struct ResponseSchema<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

/// Success envelope plus the status code it renders with.
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub body: ResponseSchema<T>,
    pub status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            body: ResponseSchema {
                success: true,
                data: Some(data),
                message: message.into(),
                errors: None,
            },
            status: StatusCode::OK,
        }
    }

    /// 201 Created; the message is fixed.
    pub fn created(data: T) -> Self {
        Self {
            body: ResponseSchema {
                success: true,
                data: Some(data),
                message: CREATED_MESSAGE.to_string(),
                errors: None,
            },
            status: StatusCode::CREATED,
        }
    }
}

impl ApiResponse<Value> {
    /// 200 with a message and no data payload (delete path).
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            body: ResponseSchema {
                success: true,
                data: None,
                message: message.into(),
                errors: None,
            },
            status: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.body) {
            Ok(value) => (self.status, Json(value)).into_response(),
            Err(e) => {
                tracing::error!("failed to serialize response body: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "success": false,
                        "message": crate::error::INTERNAL_ERROR_MESSAGE,
                    })),
                )
                    .into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

// src/api/types.rs

use serde::{Deserialize, Serialize};

use axum::http::StatusCode;
use axum::Json;

use crate::infra::errors::RelayError;

/// Body for POST /api/quota.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
}

/// Response for POST /api/quota.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
    pub allowed: bool,
    pub has_own_key: bool,
    pub count: u32,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Response for GET /api/settings/api-key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveApiKeyResponse {
    pub message: String,
    pub masked_key: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

/// Codes are returned to the caller for delivery; this service does not
/// send mail itself.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
}

/// Query for GET /api/chats.
#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
pub struct ListChatsResponse<T: Serialize> {
    pub chats: Vec<T>,
    pub total: usize,
}

/// Body for POST /api/chat (one turn).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnRequest {
    #[serde(default)]
    pub chat_id: Option<String>,
    pub message: String,
    /// Data-URL or remote image references, passed through untouched.
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Map a domain error to its HTTP shape. The distinct code errors keep
/// their distinct messages via Display.
pub fn error_response(err: RelayError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
        RelayError::NotFound => StatusCode::NOT_FOUND,
        RelayError::Validation(_) | RelayError::CodeExpired | RelayError::CodeIncorrect => {
            StatusCode::BAD_REQUEST
        }
        RelayError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        RelayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        RelayError::StoreUnavailable(_) | RelayError::Database(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        RelayError::Config(_) | RelayError::Io(_) | RelayError::Other(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

// src/api/auth.rs

use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::types::ErrorResponse;
use crate::api::ApiState;
use crate::store::{session_key, KvHandle};

/// The authenticated caller. Session issuance lives outside this service;
/// we only resolve an opaque bearer token to the identity stored with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Resolve the caller from `Authorization: Bearer <token>`. Any failure —
/// missing header, unknown token, unreadable store — is a plain 401; the
/// boundary never leaks which case it was.
pub async fn authenticate(
    state: &ApiState,
    headers: &HeaderMap,
) -> Result<Identity, (StatusCode, Json<ErrorResponse>)> {
    let auth_header = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let token = auth_header.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() {
        return Err(unauthorized());
    }

    let fields = match state.kv.hgetall(&session_key(token)).await {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!("session lookup failed: {e}");
            return Err(unauthorized());
        }
    };

    match (fields.get("userId"), fields.get("email")) {
        (Some(user_id), Some(email)) if !user_id.is_empty() => Ok(Identity {
            user_id: user_id.clone(),
            email: email.clone(),
        }),
        _ => Err(unauthorized()),
    }
}

fn unauthorized() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".into(),
        }),
    )
}

/// Store a session token → identity binding. Used by the external auth
/// layer and by tests.
pub async fn register_session(
    kv: &KvHandle,
    token: &str,
    identity: &Identity,
) -> anyhow::Result<()> {
    kv.hset(
        &session_key(token),
        vec![
            ("userId".to_string(), identity.user_id.clone()),
            ("email".to_string(), identity.email.clone()),
        ],
    )
    .await
}

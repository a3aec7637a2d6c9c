// src/api/handlers.rs

use std::collections::HashMap;
use std::convert::Infallible;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::Utc;
use futures::Stream;
use tokio::sync::mpsc;

use crate::api::types::*;
use crate::api::{auth, ApiState};
use crate::infra::errors::RelayError;
use crate::session::reconcile;
use crate::session::state::SessionState;
use crate::session::RawEvent;
use crate::store::chats::{ChatRecord, ChatStatus};
use crate::util::title_from;

type HandlerError = (StatusCode, Json<ErrorResponse>);

/// POST /api/quota — claim one question slot for the caller.
pub async fn claim_quota(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<QuotaResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    // malformed or missing bodies default to no chat id
    let chat_id = serde_json::from_slice::<QuotaRequest>(&body)
        .ok()
        .and_then(|b| b.chat_id);

    let outcome = state
        .quota
        .claim(&identity.user_id, chat_id.as_deref())
        .await;

    let message = (!outcome.allowed).then(|| {
        format!(
            "You have used all {} free questions for today. Add your own API key to continue.",
            outcome.limit
        )
    });

    Ok(Json(QuotaResponse {
        allowed: outcome.allowed,
        has_own_key: outcome.has_own_key,
        count: outcome.count,
        limit: outcome.limit,
        message,
    }))
}

/// GET /api/settings — the caller's access snapshot.
pub async fn get_settings(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<crate::store::settings::AccessSnapshot>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    let snapshot = state
        .settings
        .snapshot(&identity.user_id, &identity.email)
        .await;
    Ok(Json(snapshot))
}

/// GET /api/settings/api-key — the caller's stored key, unmasked.
pub async fn get_api_key(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<ApiKeyResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    let api_key = state
        .settings
        .api_key_for(&identity.user_id)
        .await
        .unwrap_or_default();
    Ok(Json(ApiKeyResponse { api_key }))
}

/// POST /api/settings/api-key
pub async fn save_api_key(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<SaveApiKeyRequest>,
) -> Result<Json<SaveApiKeyResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    let masked_key = state
        .settings
        .save_api_key(&identity.user_id, &body.api_key)
        .await
        .map_err(error_response)?;
    Ok(Json(SaveApiKeyResponse {
        message: "API key saved.".into(),
        masked_key,
    }))
}

/// DELETE /api/settings/api-key
pub async fn remove_api_key(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    state
        .settings
        .remove_api_key(&identity.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse {
        message: "API key removed.".into(),
    }))
}

/// POST /api/settings/verify-email/request
pub async fn request_email_verification(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<CodeResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    match state
        .settings
        .request_email_verification(&identity.email)
        .await
        .map_err(error_response)?
    {
        crate::store::settings::CodeIssue::Issued(code) => Ok(Json(CodeResponse {
            message: "Verification code generated. Please check your email.".into(),
            code: Some(code),
        })),
        crate::store::settings::CodeIssue::AlreadyVerified => Ok(Json(CodeResponse {
            message: "Email already verified.".into(),
            code: None,
        })),
    }
}

/// POST /api/settings/verify-email
pub async fn verify_email(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<VerifyEmailRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    state
        .settings
        .verify_email(&identity.email, &body.code)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse {
        message: "Email verified successfully.".into(),
    }))
}

/// POST /api/auth/reset/request — no session required.
pub async fn request_password_reset(
    State(state): State<ApiState>,
    Json(body): Json<ResetRequest>,
) -> Result<Json<CodeResponse>, HandlerError> {
    let code = state
        .settings
        .request_password_reset(&body.email)
        .await
        .map_err(error_response)?;
    Ok(Json(CodeResponse {
        message: "Password reset code generated. Please check your email.".into(),
        code: Some(code),
    }))
}

/// POST /api/auth/reset
pub async fn reset_password(
    State(state): State<ApiState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<StatusResponse>, HandlerError> {
    state
        .settings
        .reset_password(&body.email, &body.code, &body.new_password)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse {
        message: "Password updated successfully.".into(),
    }))
}

/// GET /api/chats — most recent first, filtered before pagination.
pub async fn list_chats(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<ListChatsResponse<ChatRecord>>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    let chats = state
        .chats
        .list(&identity.user_id, query.limit, query.offset)
        .await;
    let total = state.chats.count_active(&identity.user_id).await;
    Ok(Json(ListChatsResponse { chats, total }))
}

/// GET /api/chats/:id
pub async fn get_chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ChatRecord>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    match state.chats.get(&id, &identity.user_id).await {
        Some(chat) => Ok(Json(chat)),
        None => Err(error_response(RelayError::NotFound)),
    }
}

/// DELETE /api/chats/:id — soft delete.
pub async fn delete_chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    state
        .chats
        .soft_delete(&id, &identity.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse {
        message: "Chat deleted.".into(),
    }))
}

/// DELETE /api/chats — tombstone everything active.
pub async fn clear_chats(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    state
        .chats
        .clear_all(&identity.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(StatusResponse {
        message: "History cleared.".into(),
    }))
}

/// POST /api/chats/:id/share
pub async fn share_chat(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ChatRecord>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;
    let chat = state
        .chats
        .share(&id, &identity.user_id)
        .await
        .map_err(error_response)?;
    Ok(Json(chat))
}

/// GET /api/share/:id — public view of a shared chat, projected for display.
pub async fn get_shared_chat(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    let Some(chat) = state.chats.shared(&id).await else {
        return Err(error_response(RelayError::NotFound));
    };
    let units = crate::session::replay::project(&chat.id, &chat.messages, &state.config.artifacts);
    Ok(Json(serde_json::json!({
        "id": chat.id,
        "title": chat.title,
        "createdAt": chat.created_at,
        "units": units,
    })))
}

/// POST /api/chat — run one turn, streaming display units as SSE. The turn
/// task outlives a dropped client connection so the log still persists.
pub async fn run_chat_turn(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<TurnRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HandlerError> {
    let identity = auth::authenticate(&state, &headers).await?;

    if body.message.trim().is_empty() {
        return Err(error_response(RelayError::validation(
            "Message cannot be empty.",
        )));
    }

    let chat_id = body
        .chat_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let api_key = state
        .settings
        .api_key_for(&identity.user_id)
        .await
        .unwrap_or_default();

    let outcome = state.quota.claim(&identity.user_id, Some(&chat_id)).await;
    // a caller holding their own key is admitted even when the ledger
    // could not be consulted; everyone else fails closed
    if !outcome.allowed && api_key.is_none() {
        return Err(error_response(RelayError::QuotaExceeded {
            limit: outcome.limit,
        }));
    }

    // resume the persisted session if the chat exists and is ours
    let prior = state.chats.get(&chat_id, &identity.user_id).await;
    let mut session = match &prior {
        Some(record) => SessionState::from_parts(
            record.id.clone(),
            Some(record.title.clone()),
            record.messages.clone(),
        ),
        None => SessionState::new(chat_id.clone()),
    };

    let first_turn = session.events().is_empty();
    session.set_title_once(title_from(&body.message));
    session.append(RawEvent::user_input(&body.message, &body.attachments));

    let model = body
        .model_id
        .clone()
        .unwrap_or_else(|| state.config.agent.default_model.clone());
    let metadata = crate::agent::TurnMetadata::new(
        session.id(),
        &model,
        &state.config.agent.db_name,
        api_key,
    );

    let stream = state
        .agent
        .stream_turn(session.events(), &metadata)
        .await
        .map_err(error_response)?;

    let client_info = client_info_from_headers(&headers);
    let (tx, mut rx) = mpsc::channel(64);

    let chats = state.chats.clone();
    let artifacts = state.config.artifacts.clone();
    let user_id = identity.user_id.clone();
    tokio::spawn(async move {
        let outcome = reconcile::run_turn(&mut session, first_turn, stream, &artifacts, &tx).await;
        if let Some(error) = &outcome.error {
            tracing::warn!("turn for chat {} ended with error: {error}", session.id());
        }

        let record = ChatRecord {
            id: session.id().to_string(),
            title: session.title().unwrap_or("New chat").to_string(),
            user_id: user_id.clone(),
            created_at: prior
                .as_ref()
                .map(|p| p.created_at)
                .unwrap_or_else(Utc::now),
            path: format!("/chat/{}", session.id()),
            share_path: prior.as_ref().and_then(|p| p.share_path.clone()),
            status: ChatStatus::Active,
            client_info_history: prior
                .as_ref()
                .map(|p| p.client_info_history.clone())
                .unwrap_or_default(),
            messages: session.into_events(),
        };

        if let Err(e) = chats.save(&record).await {
            tracing::error!("failed to persist chat {}: {e}", record.id);
            return;
        }
        if let Err(e) = chats
            .append_client_info(&record.id, &user_id, client_info)
            .await
        {
            tracing::warn!("failed to append client info for {}: {e}", record.id);
        }
    });

    let sse_stream = async_stream::stream! {
        while let Some(turn_event) = rx.recv().await {
            match Event::default().json_data(&turn_event) {
                Ok(event) => yield Ok::<_, Infallible>(event),
                Err(e) => tracing::warn!("unserializable turn event: {e}"),
            }
        }
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn client_info_from_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut info = HashMap::new();
    for name in ["user-agent", "x-forwarded-for", "accept-language"] {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            info.insert(name.to_string(), value.to_string());
        }
    }
    info.insert("timestamp".to_string(), Utc::now().to_rfc3339());
    info
}

// src/api/mod.rs — HTTP API server

pub mod auth;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::agent::AgentClient;
use crate::infra::config::Config;
use crate::store::chats::ChatStore;
use crate::store::quota::QuotaLedger;
use crate::store::settings::SettingsStore;
use crate::store::KvHandle;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub kv: KvHandle,
    pub chats: ChatStore,
    pub settings: SettingsStore,
    pub quota: QuotaLedger,
    pub agent: Arc<AgentClient>,
    pub config: Arc<Config>,
}

impl ApiState {
    pub fn new(kv: KvHandle, config: Config) -> Self {
        let config = Arc::new(config);
        Self {
            chats: ChatStore::new(kv.clone()),
            settings: SettingsStore::new(kv.clone(), config.quota.clone()),
            quota: QuotaLedger::new(kv.clone(), config.quota.clone()),
            agent: Arc::new(AgentClient::new(&config.agent)),
            kv,
            config,
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            "http://localhost:3000".parse().unwrap(),
            "http://127.0.0.1:3000".parse().unwrap(),
        ])
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any);

    Router::new()
        .route("/api/quota", post(handlers::claim_quota))
        .route("/api/settings", get(handlers::get_settings))
        .route(
            "/api/settings/api-key",
            get(handlers::get_api_key)
                .post(handlers::save_api_key)
                .delete(handlers::remove_api_key),
        )
        .route(
            "/api/settings/verify-email/request",
            post(handlers::request_email_verification),
        )
        .route("/api/settings/verify-email", post(handlers::verify_email))
        .route(
            "/api/auth/reset/request",
            post(handlers::request_password_reset),
        )
        .route("/api/auth/reset", post(handlers::reset_password))
        .route(
            "/api/chats",
            get(handlers::list_chats).delete(handlers::clear_chats),
        )
        .route(
            "/api/chats/{id}",
            get(handlers::get_chat).delete(handlers::delete_chat),
        )
        .route("/api/chats/{id}/share", post(handlers::share_chat))
        .route("/api/share/{id}", get(handlers::get_shared_chat))
        .route("/api/chat", post(handlers::run_chat_turn))
        .route("/api/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}

/// Start the API server on the configured bind address (blocking).
pub async fn start_server(state: ApiState) -> anyhow::Result<()> {
    let addr = format!(
        "{}:{}",
        state.config.server.bind, state.config.server.port
    );

    let router = build_router(state);

    tracing::info!("API server listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreManager;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_state() -> ApiState {
        let manager = StoreManager::in_memory().unwrap();
        let (kv, _join) = manager.spawn();
        let mut config = Config::default();
        config.quota.daily_limit = Some(5);
        ApiState::new(kv, config)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let req = Request::builder()
            .uri("/api/health")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_quota_requires_auth() {
        let app = build_router(test_state());
        let req = Request::builder()
            .method("POST")
            .uri("/api/quota")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}

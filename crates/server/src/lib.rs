pub mod adapter;
pub mod auth;
pub mod handler;
pub mod proxy;
pub mod retry;
pub mod scheduler;

use crate::adapter::ProtocolAdapter;
use axum::{Router, middleware as axum_mw};
use lgw_core::config::Config;
use lgw_core::strategy::RoundRobinStrategy;
use lgw_provider::ClientRegistry;
use lgw_store::Repositories;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub clients: Arc<ClientRegistry>,
    pub strategy: Arc<RoundRobinStrategy>,
    pub adapter: Arc<dyn ProtocolAdapter>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: Arc<Config>, repos: Repositories) -> Self {
        Self {
            config,
            repos,
            clients: Arc::new(lgw_provider::build_registry()),
            strategy: Arc::new(RoundRobinStrategy::new()),
            adapter: Arc::new(adapter::PassthroughAdapter),
            start_time: Instant::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit_bytes = state.config.body_limit_mb * 1024 * 1024;

    // Public routes — no auth required
    let public_routes = Router::new()
        .route("/health", axum::routing::get(handler::health::health))
        .route("/", axum::routing::get(handler::health::info));

    // Proxy routes — API key required, body size limited
    let api_routes = Router::new()
        .route(
            "/v1/models",
            axum::routing::get(handler::models::list_models),
        )
        .route(
            "/v1/chat/completions",
            axum::routing::post(handler::chat_completions::chat_completions),
        )
        .route(
            "/v1/completions",
            axum::routing::post(handler::completions::completions),
        )
        .route(
            "/v1/embeddings",
            axum::routing::post(handler::embeddings::embeddings),
        )
        .route(
            "/v1/messages",
            axum::routing::post(handler::messages::messages),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

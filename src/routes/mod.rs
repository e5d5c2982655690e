use crate::state::AppState;
use crate::websocket::handlers::ws_handler;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

pub mod health;
pub mod sessions;

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/v1/sessions/:id", get(sessions::session_info))
        .route("/ws/chat", get(ws_handler))
        .layer(CorsLayer::permissive())
}

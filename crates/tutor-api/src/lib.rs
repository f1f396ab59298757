pub mod channel_auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod receipts;
pub mod state;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every HTTP and WebSocket route of the chat service.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/chat/messages",
            get(messages::get_history).post(messages::send_message),
        )
        .route("/api/chat/messages/read", patch(receipts::mark_read))
        .route("/api/chat/unread-count", get(receipts::unread_count))
        .route("/api/chat/conversations", get(conversations::list_conversations))
        .route("/api/chat/channel-auth", post(channel_auth::authorize_channel))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

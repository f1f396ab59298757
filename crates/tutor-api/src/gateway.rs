use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use tutor_relay::connection;
use tutor_types::auth::verify_token;

use crate::error::ApiError;
use crate::middleware::TOKEN_COOKIE;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Upgrade to the gateway WebSocket.
///
/// A token in the query string or session cookie is checked before the
/// upgrade; without one the socket must send `Identify` first.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    jar: CookieJar,
    ws: WebSocketUpgrade,
) -> Response {
    let publisher = state.publisher.clone();
    let token = query
        .token
        .or_else(|| jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()));

    match token {
        Some(token) => match verify_token(&token, &state.jwt_secret) {
            Ok(claims) => ws
                .on_upgrade(move |socket| {
                    connection::handle_connection_authenticated(socket, publisher, claims)
                })
                .into_response(),
            Err(_) => ApiError::Unauthorized.into_response(),
        },
        None => {
            let jwt_secret = state.jwt_secret.clone();
            ws.on_upgrade(move |socket| connection::handle_connection(socket, publisher, jwt_secret))
                .into_response()
        }
    }
}

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use tutor_types::auth::{Claims, verify_token};

use crate::error::ApiError;
use crate::state::AppState;

/// Cookie the web app stores its session token in.
pub const TOKEN_COOKIE: &str = "token";

/// Bearer header first, then the session cookie.
pub fn extract_token(headers: &axum::http::HeaderMap, jar: &CookieJar) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::to_string)
        .or_else(|| jar.get(TOKEN_COOKIE).map(|c| c.value().to_string()))
}

/// Validate the JWT and stash its `Claims` as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers(), &jar).ok_or(ApiError::Unauthorized)?;

    let claims: Claims = verify_token(&token, &state.jwt_secret).map_err(|e| {
        tracing::debug!("Rejected token: {}", e);
        ApiError::Unauthorized
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

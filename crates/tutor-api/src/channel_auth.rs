use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::{info, warn};

use tutor_relay::RelayError;
use tutor_types::api::{ChannelAuthRequest, ChannelAuthResponse};
use tutor_types::auth::Claims;
use tutor_types::channel::{self, ChannelAccessError};

use crate::error::ApiError;
use crate::extract::ApiForm;
use crate::state::AppState;

/// Sign a hosted-relay subscription, but only for one of the caller's own
/// conversations.
pub async fn authorize_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiForm(req): ApiForm<ChannelAuthRequest>,
) -> Result<impl IntoResponse, ApiError> {
    channel::authorize(&req.channel_name, claims.sub).map_err(|e| {
        warn!(
            "{} ({}) denied relay subscription to {}: {}",
            claims.name, claims.sub, req.channel_name, e
        );
        match e {
            ChannelAccessError::Malformed => ApiError::Validation(e.to_string()),
            ChannelAccessError::NotParticipant => ApiError::Forbidden(e.to_string()),
        }
    })?;

    let hosted = state
        .publisher
        .hosted()
        .ok_or(RelayError::NotConfigured("TUTOR_RELAY_KEY"))?;

    let auth = hosted
        .authorize(&req.socket_id, &req.channel_name)
        .map_err(|e| match e {
            RelayError::InvalidSocketId(_) | RelayError::InvalidChannel(_) => {
                ApiError::Validation(e.to_string())
            }
            other => ApiError::Relay(other),
        })?;

    info!("{} ({}) authorized for {}", claims.name, claims.sub, req.channel_name);
    Ok(Json(ChannelAuthResponse { auth }))
}

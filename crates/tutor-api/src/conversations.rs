use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::warn;

use tutor_types::api::{ConversationListResponse, ConversationSummary};
use tutor_types::auth::Claims;
use tutor_types::models::Role;

use crate::error::ApiError;
use crate::messages::message_view;
use crate::state::{AppState, run_db};

/// The caller's conversations, most recent activity first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let rows = run_db(&state, move |db| db.list_conversations(user_id)).await?;

    let conversations = rows
        .into_iter()
        .filter_map(|row| {
            let peer_role = match row.peer_role.parse::<Role>() {
                Ok(role) => role,
                Err(e) => {
                    warn!("Corrupt peer role in conversation {}: {}", row.conversation_id, e);
                    return None;
                }
            };
            Some(ConversationSummary {
                channel_id: row.conversation_id,
                peer_id: row.peer_id,
                peer_name: row.peer_name,
                peer_role,
                unread_count: row.unread_count,
                last_message: message_view(row.last_message)?,
            })
        })
        .collect();

    Ok(Json(ConversationListResponse {
        success: true,
        conversations,
    }))
}

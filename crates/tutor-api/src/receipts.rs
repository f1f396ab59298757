use std::collections::BTreeMap;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::info;

use tutor_types::api::{MarkReadRequest, MarkReadResponse, UnreadCountResponse};
use tutor_types::auth::Claims;
use tutor_types::channel::CONVERSATION_CHANNEL_PREFIX;
use tutor_types::events::RelayEvent;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::messages::parse_timestamp;
use crate::state::{AppState, run_db};

/// Most ids accepted by one mark-read call.
pub const MAX_MARK_READ_IDS: usize = 500;

/// Mark messages addressed to the caller as read.
///
/// Ids the caller did not receive, or that are already read, are skipped;
/// `updatedCount` reports only rows that changed.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut ids = req.message_ids;
    if ids.is_empty() {
        return Err(ApiError::Validation("messageIds must not be empty".into()));
    }
    if ids.len() > MAX_MARK_READ_IDS {
        return Err(ApiError::Validation(format!(
            "at most {} messageIds per request",
            MAX_MARK_READ_IDS
        )));
    }
    ids.sort_unstable();
    ids.dedup();

    let reader_id = claims.sub;
    let receipt = run_db(&state, move |db| db.mark_read(&ids, reader_id)).await?;
    let updated_count = receipt.rows.len();

    if updated_count > 0 {
        info!("{} ({}) read {} messages", claims.name, reader_id, updated_count);

        let read_at = parse_timestamp(&receipt.read_at).unwrap_or_else(Utc::now);
        let mut by_conversation: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        for row in receipt.rows {
            by_conversation.entry(row.conversation_id).or_default().push(row.id);
        }

        for (conversation_id, message_ids) in by_conversation {
            state.publisher.publish(
                &format!("{}{}", CONVERSATION_CHANNEL_PREFIX, conversation_id),
                RelayEvent::MessagesRead {
                    message_ids,
                    reader_id,
                    read_at,
                },
            );
        }
    }

    Ok(Json(MarkReadResponse {
        success: true,
        updated_count,
    }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let unread_count = run_db(&state, move |db| db.unread_count(user_id)).await?;

    Ok(Json(UnreadCountResponse {
        success: true,
        unread_count,
    }))
}

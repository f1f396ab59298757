use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tutor_db::{NewMessage, models::MessageRow};
use tutor_types::api::{
    HistoryQuery, HistoryResponse, MessageView, SendMessageRequest, SendMessageResponse,
};
use tutor_types::auth::Claims;
use tutor_types::events::RelayEvent;
use tutor_types::models::{ConversationPair, Party, Role};

use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};
use crate::state::{AppState, run_db};

/// Longest message body accepted, in characters.
pub const MAX_CONTENT_CHARS: usize = 4000;

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 200;

/// Persist a message, then publish it to the conversation channel.
///
/// The response only depends on the insert: publishing is fire-and-forget
/// and its failures never reach the caller.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::Validation(format!(
            "content must be at most {} characters",
            MAX_CONTENT_CHARS
        )));
    }

    if req.sender_id != claims.sub || req.sender_role != claims.role {
        return Err(ApiError::Forbidden(
            "sender does not match the authenticated user".into(),
        ));
    }

    let sender = Party::new(req.sender_id, req.sender_role);
    let recipient = Party::new(req.recipient_id, req.recipient_role);
    let pair = ConversationPair::new(sender, recipient)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let conversation_id = pair.channel_id();
    let row = run_db(&state, move |db| {
        // Both parties must exist with the roles claimed for them
        for party in [sender, recipient] {
            match db.get_user(party.id)? {
                Some(user) if user.role == party.role.as_str() => {}
                _ => return Ok(None),
            }
        }

        db.insert_message(&NewMessage {
            conversation_id: &conversation_id,
            sender_id: sender.id,
            sender_role: sender.role.as_str(),
            recipient_id: recipient.id,
            recipient_role: recipient.role.as_str(),
            content: &content,
        })
        .map(Some)
    })
    .await?
    .ok_or_else(|| ApiError::NotFound("conversation participant not found".into()))?;

    let message = message_view(row)
        .ok_or_else(|| ApiError::Internal("stored message could not be decoded".into()))?;

    info!(
        "{} {} -> {} {}: message {}",
        sender.role, sender.id, recipient.role, recipient.id, message.id
    );

    state
        .publisher
        .publish(&pair.channel_name(), RelayEvent::NewMessage(message.clone()));

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            success: true,
            message_id: message.id,
            message,
        }),
    ))
}

/// History of one conversation, oldest first. Only its two parties may read it.
pub async fn get_history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let member = match (query.student_id, query.parent_id) {
        (Some(id), None) => Party::new(id, Role::Student),
        (None, Some(id)) => Party::new(id, Role::Parent),
        (Some(_), Some(_)) => {
            return Err(ApiError::Validation(
                "specify only one of studentId or parentId".into(),
            ));
        }
        (None, None) => {
            return Err(ApiError::Validation("studentId or parentId is required".into()));
        }
    };
    let teacher_id = query
        .teacher_id
        .ok_or_else(|| ApiError::Validation("teacherId is required".into()))?;

    let pair = ConversationPair::new(member, Party::new(teacher_id, Role::Teacher))
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if !pair.contains(claims.sub) {
        return Err(ApiError::Forbidden(
            "not a participant of this conversation".into(),
        ));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let before = query.before;
    let conversation_id = pair.channel_id();

    let rows = run_db(&state, move |db| db.get_conversation(&conversation_id, before, limit)).await?;

    let messages = rows.into_iter().filter_map(message_view).collect();

    Ok(Json(HistoryResponse {
        success: true,
        messages,
    }))
}

/// Parse a stored timestamp. Also accepts SQLite's `YYYY-MM-DD HH:MM:SS`.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

/// Convert a stored row for the wire. Corrupt rows are logged and skipped.
pub(crate) fn message_view(row: MessageRow) -> Option<MessageView> {
    let sender_role = match row.sender_role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => {
            warn!("Corrupt sender_role on message {}: {}", row.id, e);
            return None;
        }
    };
    let Some(timestamp) = parse_timestamp(&row.created_at) else {
        warn!("Corrupt created_at '{}' on message {}", row.created_at, row.id);
        return None;
    };
    let read_at = row.read_at.as_deref().and_then(|raw| {
        let parsed = parse_timestamp(raw);
        if parsed.is_none() {
            warn!("Corrupt read_at '{}' on message {}", raw, row.id);
        }
        parsed
    });

    Some(MessageView {
        id: row.id,
        sender_id: row.sender_id,
        recipient_id: row.recipient_id,
        content: row.content,
        timestamp,
        sender_name: row.sender_name,
        sender_role,
        is_read: row.is_read,
        read_at,
    })
}

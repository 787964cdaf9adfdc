use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, AppState,
    notifications::{self, NotificationKind},
    push::PushGateway,
    realtime::{ChangeTable, Hub},
    session::require_user,
};

use super::Message;

#[derive(Deserialize)]
pub(crate) struct ConversationQuery {
    /// The other participant.
    with: Uuid,
}

pub(crate) async fn list_messages(
    db_pool: &SqlitePool,
    event_id: &str,
    viewer: &str,
    other: &str,
) -> AppResult<Vec<Message>> {
    let rows: Vec<Message> = sqlx::query_as(
        "SELECT * FROM messages
         WHERE event_id=?1
           AND ((sender_id=?2 AND recipient_id=?3) OR (sender_id=?3 AND recipient_id=?2))
         ORDER BY created_at ASC",
    )
    .bind(event_id)
    .bind(viewer)
    .bind(other)
    .fetch_all(db_pool)
    .await?;
    Ok(rows)
}

/// Batched read receipt for everything the other side sent. Best-effort:
/// a failure is logged and the thread still renders.
pub(crate) async fn mark_pair_read(db_pool: &SqlitePool, event_id: &str, viewer: &str, other: &str) {
    let result = sqlx::query(
        "UPDATE messages SET read_at=?
         WHERE event_id=? AND recipient_id=? AND sender_id=? AND read_at IS NULL",
    )
    .bind(Utc::now())
    .bind(event_id)
    .bind(viewer)
    .bind(other)
    .execute(db_pool)
    .await;
    if let Err(err) = result {
        tracing::warn!(error = %err, event = event_id, "failed to mark conversation read");
    }
}

/// Single-row read receipt used as realtime inserts arrive. Best-effort.
pub(crate) async fn mark_row_read(db_pool: &SqlitePool, message_id: &str) {
    let result = sqlx::query("UPDATE messages SET read_at=? WHERE id=? AND read_at IS NULL")
        .bind(Utc::now())
        .bind(message_id)
        .execute(db_pool)
        .await;
    if let Err(err) = result {
        tracing::warn!(error = %err, message = message_id, "failed to mark message read");
    }
}

/// The initial, server-ordered view of one conversation.
#[debug_handler]
pub(crate) async fn conversation(
    Path(event_id): Path<Uuid>,
    Query(ConversationQuery { with }): Query<ConversationQuery>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Message>>> {
    let viewer = require_user(&session).await?.to_string();
    let other = with.to_string();
    let event_id = event_id.to_string();

    let rows = list_messages(&db_pool, &event_id, &viewer, &other).await?;
    mark_pair_read(&db_pool, &event_id, &viewer, &other).await;
    Ok(Json(rows))
}

pub async fn send_msg(
    db_pool: &SqlitePool,
    hub: &Hub,
    push: &PushGateway,
    event_id: Uuid,
    sender_id: Uuid,
    recipient_id: Uuid,
    body: &str,
) -> AppResult<Message> {
    if body.trim().is_empty() {
        return Err(AppError::bad_request("message body is empty"));
    }
    let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM events WHERE id=?")
        .bind(event_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    if exists.is_none() {
        return Err(AppError::not_found("event not found"));
    }

    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO messages (id, event_id, sender_id, recipient_id, body, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(event_id.to_string())
    .bind(sender_id.to_string())
    .bind(recipient_id.to_string())
    .bind(body)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    let message: Message = sqlx::query_as("SELECT * FROM messages WHERE id=?")
        .bind(id.to_string())
        .fetch_one(db_pool)
        .await?;

    // The sender's own view picks this up over the subscription; there is
    // no optimistic append anywhere.
    hub.publish_insert(ChangeTable::Messages, &message);

    notifications::create_notification(
        db_pool,
        hub,
        push,
        &recipient_id.to_string(),
        NotificationKind::Message,
        "New message",
        body,
        Some(json!({ "event_id": event_id, "sender_id": sender_id })),
    )
    .await?;

    Ok(message)
}

#[derive(Deserialize)]
pub(crate) struct SendBody {
    recipient_id: Uuid,
    body: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn post_message(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    session: Session,
    Json(SendBody { recipient_id, body }): Json<SendBody>,
) -> AppResult<Json<Message>> {
    let sender_id = require_user(&session).await?;
    let message = send_msg(
        &state.db_pool,
        &state.hub,
        &state.push,
        event_id,
        sender_id,
        recipient_id,
        &body,
    )
    .await?;
    Ok(Json(message))
}

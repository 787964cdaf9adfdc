mod inbox;
mod msg;
mod ws;

use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;

pub use inbox::{ConversationSummary, get_conversations};
pub use msg::send_msg;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/conversations", get(inbox::conversations))
        .route(
            "/events/{event_id}/messages",
            get(msg::conversation).post(msg::post_message),
        )
        .route("/events/{event_id}/messages/ws", get(ws::conversation_ws))
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub event_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A conversation is addressed by (event, participant A, participant B).
/// Rows for other pairs sharing the event are discarded, never displayed.
pub(crate) fn belongs_to_pair(msg: &Message, event_id: &str, viewer: &str, other: &str) -> bool {
    msg.event_id == event_id
        && ((msg.sender_id == viewer && msg.recipient_id == other)
            || (msg.sender_id == other && msg.recipient_id == viewer))
}

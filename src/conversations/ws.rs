use axum::{
    debug_handler,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult,
    realtime::{ChangeTable, Hub},
    session::require_user,
};

use super::{Message, belongs_to_pair, msg};

#[derive(Deserialize)]
pub(crate) struct WsQuery {
    with: Uuid,
}

/// Live insert feed for one conversation. Inserts for the event are
/// filtered to the (viewer, other) pair before being forwarded; rows
/// addressed to the viewer are marked read as they are delivered.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversation_ws(
    Path(event_id): Path<Uuid>,
    Query(WsQuery { with }): Query<WsQuery>,
    State(db_pool): State<SqlitePool>,
    State(hub): State<Hub>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let viewer = require_user(&session).await?.to_string();
    let other = with.to_string();
    let event_id = event_id.to_string();

    Ok(ws
        .on_upgrade(async move |stream| {
            let mut rx = hub.subscribe();
            let (mut sender, mut receiver) = stream.split();

            let forward_task = tokio::spawn(async move {
                loop {
                    let event = match rx.recv().await {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "conversation feed lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if event.table != ChangeTable::Messages {
                        continue;
                    }
                    let Ok(row) = serde_json::from_value::<Message>(event.row.clone()) else {
                        tracing::warn!("malformed message change payload");
                        continue;
                    };
                    if !belongs_to_pair(&row, &event_id, &viewer, &other) {
                        continue;
                    }
                    if row.recipient_id == viewer {
                        msg::mark_row_read(&db_pool, &row.id).await;
                    }
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(text.into()).await.is_err() {
                        break;
                    }
                }
            });

            // Sends go through the insert endpoint, not this socket; drain
            // until the peer closes, then release the subscription.
            while let Some(Ok(_)) = receiver.next().await {}
            forward_task.abort();
        })
        .into_response())
}

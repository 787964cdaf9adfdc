use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tower_sessions::Session;

use crate::{
    AppResult,
    realtime::{ChangeTable, Hub},
    session::require_user,
};

use super::Notification;

/// Live insert feed for the signed-in user's notifications. One socket is
/// one subscription; closing the socket releases it.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn notifications_ws(
    State(hub): State<Hub>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let user_id = require_user(&session).await?.to_string();

    Ok(ws
        .on_upgrade(async move |stream| {
            let mut rx = hub.subscribe();
            let (mut sender, mut receiver) = stream.split();

            let forward_task = tokio::spawn(async move {
                loop {
                    let event = match rx.recv().await {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "notification feed lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if event.table != ChangeTable::Notifications {
                        continue;
                    }
                    // Validate the payload against the row schema before use.
                    let Ok(row) = serde_json::from_value::<Notification>(event.row.clone()) else {
                        tracing::warn!("malformed notification change payload");
                        continue;
                    };
                    if row.user_id != user_id {
                        continue;
                    }
                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(text.into()).await.is_err() {
                        break;
                    }
                }
            });

            // Nothing meaningful arrives from the peer; drain until close,
            // then tear the subscription down.
            while let Some(Ok(_)) = receiver.next().await {}
            forward_task.abort();
        })
        .into_response())
}

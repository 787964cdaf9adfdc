mod ws;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult, AppState,
    push::PushGateway,
    realtime::{ChangeTable, Hub},
    session::require_user,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/ws", get(ws::notifications_ws))
        .route("/notifications/unread_count", get(unread_count))
        .route("/notifications/read_all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Wave,
    ProxyRequest,
    EventUpdate,
    Payment,
    System,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        use NotificationKind::*;
        match self {
            Message => "message",
            Wave => "wave",
            ProxyRequest => "proxy_request",
            EventUpdate => "event_update",
            Payment => "payment",
            System => "system",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub title: String,
    pub body: String,
    pub data: Option<Value>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert a notification row, publish it on the change feed, and fan out to
/// push delivery. The push dispatch is detached and best-effort: its failure
/// is logged and never reaches the operation that created the notification.
pub async fn create_notification(
    db_pool: &SqlitePool,
    hub: &Hub,
    push: &PushGateway,
    user_id: &str,
    kind: NotificationKind,
    title: &str,
    body: &str,
    data: Option<Value>,
) -> AppResult<Notification> {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO notifications (id, user_id, type, title, body, data, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(user_id)
    .bind(kind.as_str())
    .bind(title)
    .bind(body)
    .bind(data)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    let notification: Notification = sqlx::query_as("SELECT * FROM notifications WHERE id=?")
        .bind(id.to_string())
        .fetch_one(db_pool)
        .await?;

    hub.publish_insert(ChangeTable::Notifications, &notification);

    let push = push.clone();
    let pool = db_pool.clone();
    let row = notification.clone();
    tokio::spawn(async move {
        if let Err(err) = push.dispatch(&pool, &row).await {
            tracing::warn!(error = %err, notification = %row.id, "push dispatch failed");
        }
    });

    Ok(notification)
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    limit: Option<i64>,
}

/// Newest page of notifications. The unread count is served separately
/// because this page may be smaller than the true unread total.
#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(ListQuery { limit }): Query<ListQuery>,
) -> AppResult<Json<Vec<Notification>>> {
    let user_id = require_user(&session).await?;
    let limit = limit.unwrap_or(50).clamp(1, 200);

    let rows: Vec<Notification> = sqlx::query_as(
        "SELECT * FROM notifications WHERE user_id=? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(user_id.to_string())
    .bind(limit)
    .fetch_all(&db_pool)
    .await?;
    Ok(Json(rows))
}

#[debug_handler]
pub(crate) async fn unread_count(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = require_user(&session).await?;
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id=? AND read_at IS NULL")
            .bind(user_id.to_string())
            .fetch_one(&db_pool)
            .await?;
    Ok(Json(json!({ "count": count })))
}

#[debug_handler]
pub(crate) async fn mark_read(
    Path(id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = require_user(&session).await?;
    sqlx::query("UPDATE notifications SET read_at=? WHERE id=? AND user_id=? AND read_at IS NULL")
        .bind(Utc::now())
        .bind(id.to_string())
        .bind(user_id.to_string())
        .execute(&db_pool)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[debug_handler]
pub(crate) async fn mark_all_read(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = require_user(&session).await?;
    let updated = sqlx::query("UPDATE notifications SET read_at=? WHERE user_id=? AND read_at IS NULL")
        .bind(Utc::now())
        .bind(user_id.to_string())
        .execute(&db_pool)
        .await?
        .rows_affected();
    Ok(Json(json!({ "updated": updated })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testutil::seed_user;

    async fn notifier() -> (Hub, PushGateway) {
        (Hub::new(16), PushGateway::disabled("http://localhost:8080"))
    }

    #[tokio::test]
    async fn create_publishes_on_the_change_feed() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "Faye").await;
        let (hub, push) = notifier().await;
        let mut rx = hub.subscribe();

        let created = create_notification(
            &pool,
            &hub,
            &push,
            &user_id.to_string(),
            NotificationKind::System,
            "Welcome",
            "Thanks for joining",
            None,
        )
        .await
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, ChangeTable::Notifications);
        assert_eq!(event.row["id"], created.id.as_str());
        assert_eq!(event.row["type"], "system");
    }

    #[tokio::test]
    async fn mark_all_read_zeroes_unread_and_stamps_every_row() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "Faye").await;
        let (hub, push) = notifier().await;

        for i in 0..3 {
            create_notification(
                &pool,
                &hub,
                &push,
                &user_id.to_string(),
                NotificationKind::Wave,
                "Wave",
                &format!("wave {i}"),
                None,
            )
            .await
            .unwrap();
        }

        let updated =
            sqlx::query("UPDATE notifications SET read_at=? WHERE user_id=? AND read_at IS NULL")
                .bind(Utc::now())
                .bind(user_id.to_string())
                .execute(&pool)
                .await
                .unwrap()
                .rows_affected();
        assert_eq!(updated, 3);

        let (unread,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id=? AND read_at IS NULL",
        )
        .bind(user_id.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(unread, 0);

        let rows: Vec<Notification> = sqlx::query_as("SELECT * FROM notifications WHERE user_id=?")
            .bind(user_id.to_string())
            .fetch_all(&pool)
            .await
            .unwrap();
        assert!(rows.iter().all(|n| n.read_at.is_some()));
    }

    #[tokio::test]
    async fn unread_count_is_not_bounded_by_the_page() {
        let pool = test_pool().await;
        let user_id = seed_user(&pool, "Faye").await;
        let (hub, push) = notifier().await;

        for i in 0..60 {
            create_notification(
                &pool,
                &hub,
                &push,
                &user_id.to_string(),
                NotificationKind::System,
                "Ping",
                &format!("ping {i}"),
                None,
            )
            .await
            .unwrap();
        }

        let page: Vec<Notification> = sqlx::query_as(
            "SELECT * FROM notifications WHERE user_id=? ORDER BY created_at DESC LIMIT 50",
        )
        .bind(user_id.to_string())
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(page.len(), 50);

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM notifications WHERE user_id=? AND read_at IS NULL",
        )
        .bind(user_id.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 60);
    }
}

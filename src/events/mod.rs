mod new;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, AppState,
    notifications::{self, NotificationKind},
    session::require_user,
};

pub use new::create_event;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", post(new::new_event))
        .route("/events/{id}", get(event))
        .route("/events/{id}/invite", post(invite))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Event {
    pub id: String,
    pub client_id: String,
    pub title: String,
    pub event_type: String,
    pub description: Option<String>,
    pub location_address: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub dress_code: Option<String>,
    pub tone: Option<String>,
    pub message: Option<String>,
    pub rate_type: String,
    pub budget_cents: Option<i64>,
    pub currency: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[debug_handler]
async fn event(
    Path(id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Event>> {
    require_user(&session).await?;
    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id=?")
        .bind(id.to_string())
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("event not found"))?;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
struct InviteBody {
    proxy_id: Uuid,
}

/// Client invites a specific proxy to their event. Duplicate invites are
/// no-ops; the proxy gets a proxy_request notification the first time
/// only. Returns whether this call created the invite.
pub async fn invite_proxy(
    db_pool: &SqlitePool,
    hub: &crate::realtime::Hub,
    push: &crate::push::PushGateway,
    event_id: Uuid,
    inviter: Uuid,
    proxy_id: Uuid,
) -> AppResult<bool> {
    let (client_id, title): (String, String) =
        sqlx::query_as("SELECT client_id, title FROM events WHERE id=?")
            .bind(event_id.to_string())
            .fetch_optional(db_pool)
            .await?
            .ok_or_else(|| AppError::not_found("event not found"))?;
    if client_id != inviter.to_string() {
        return Err(AppError::forbidden("only the event owner can invite proxies"));
    }
    let target: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM profiles WHERE id=?")
        .bind(proxy_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    if target.is_none() {
        return Err(AppError::not_found("proxy not found"));
    }

    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO event_invites (event_id, proxy_id, created_at) VALUES (?, ?, ?)",
    )
    .bind(event_id.to_string())
    .bind(proxy_id.to_string())
    .bind(Utc::now())
    .execute(db_pool)
    .await?
    .rows_affected();

    if inserted > 0 {
        notifications::create_notification(
            db_pool,
            hub,
            push,
            &proxy_id.to_string(),
            NotificationKind::ProxyRequest,
            "New proxy request",
            &format!("You have been invited to stand in at \"{title}\""),
            Some(json!({ "event_id": event_id })),
        )
        .await?;
    }
    Ok(inserted > 0)
}

#[debug_handler(state = AppState)]
async fn invite(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    session: Session,
    Json(InviteBody { proxy_id }): Json<InviteBody>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&session).await?;
    let invited = invite_proxy(&state.db_pool, &state.hub, &state.push, id, user_id, proxy_id).await?;
    Ok(Json(json!({ "invited": invited })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::push::PushGateway;
    use crate::realtime::Hub;
    use crate::testutil::seed_user;

    async fn seed_event(pool: &SqlitePool, client: Uuid) -> Uuid {
        let event = new::create_event(
            pool,
            client,
            serde_json::from_value(json!({
                "title": "Hearing",
                "event_type": "court",
                "start_time": Utc::now(),
                "price_type": "free",
            }))
            .unwrap(),
        )
        .await
        .unwrap();
        Uuid::parse_str(&event.id).unwrap()
    }

    #[tokio::test]
    async fn inviting_a_nonexistent_proxy_is_not_found() {
        let pool = test_pool().await;
        let hub = Hub::new(16);
        let push = PushGateway::disabled("http://localhost:8080");
        let client = seed_user(&pool, "Client").await;
        let event_id = seed_event(&pool, client).await;

        let err = invite_proxy(&pool, &hub, &push, event_id, client, Uuid::now_v7())
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM event_invites")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn duplicate_invite_notifies_only_once() {
        let pool = test_pool().await;
        let hub = Hub::new(16);
        let push = PushGateway::disabled("http://localhost:8080");
        let client = seed_user(&pool, "Client").await;
        let proxy = seed_user(&pool, "Proxy").await;
        let event_id = seed_event(&pool, client).await;

        assert!(invite_proxy(&pool, &hub, &push, event_id, client, proxy).await.unwrap());
        assert!(!invite_proxy(&pool, &hub, &push, event_id, client, proxy).await.unwrap());

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE type='proxy_request'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
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

/// One row of the proxy feed, fully denormalized: the client never issues a
/// second round trip per row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProxySummary {
    pub id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub completed_events: i64,
    pub rating: f64,
}

/// Ranking is decided here, nowhere else: verified first, then rating,
/// then seniority. Callers treat the returned order as authoritative.
pub async fn get_proxy_feed(
    db_pool: &SqlitePool,
    limit: i64,
    offset: i64,
    search: Option<&str>,
    min_rating: Option<f64>,
) -> AppResult<Vec<ProxySummary>> {
    let rows: Vec<ProxySummary> = sqlx::query_as(
        "SELECT p.id, p.full_name, p.avatar_url, p.bio, p.is_verified, p.created_at,
            (SELECT COUNT(*) FROM event_responses r JOIN events e ON e.id=r.event_id
               WHERE r.proxy_id=p.id AND r.status='accept' AND e.status='completed') AS completed_events,
            COALESCE((SELECT AVG(v.rating) FROM reviews v WHERE v.proxy_id=p.id), 0.0) AS rating
         FROM profiles p
         JOIN user_roles ur ON ur.user_id=p.id AND ur.role='proxy'
         WHERE (?1 IS NULL OR p.full_name LIKE '%'||?1||'%' OR COALESCE(p.bio,'') LIKE '%'||?1||'%')
           AND (?2 IS NULL OR COALESCE((SELECT AVG(v.rating) FROM reviews v WHERE v.proxy_id=p.id), 0.0) >= ?2)
         ORDER BY p.is_verified DESC, rating DESC, p.created_at ASC
         LIMIT ?3 OFFSET ?4",
    )
    .bind(search)
    .bind(min_rating)
    .bind(limit)
    .bind(offset)
    .fetch_all(db_pool)
    .await?;
    Ok(rows)
}

#[derive(Deserialize)]
pub(crate) struct ProxyFeedQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    search: Option<String>,
    min_rating: Option<f64>,
}

#[debug_handler]
pub(crate) async fn proxy_feed(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(query): Query<ProxyFeedQuery>,
) -> AppResult<Json<Vec<ProxySummary>>> {
    require_user(&session).await?;
    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let offset = query.offset.unwrap_or(0).max(0);
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());

    let rows = get_proxy_feed(&db_pool, limit, offset, search, query.min_rating).await?;
    Ok(Json(rows))
}

/// A wave is a lightweight nudge from a client to a proxy; it only exists
/// as a notification. Both ends must be real profiles.
pub async fn send_wave(
    db_pool: &SqlitePool,
    hub: &crate::realtime::Hub,
    push: &crate::push::PushGateway,
    from: Uuid,
    to: Uuid,
) -> AppResult<()> {
    let sender: Option<(String,)> = sqlx::query_as("SELECT full_name FROM profiles WHERE id=?")
        .bind(from.to_string())
        .fetch_optional(db_pool)
        .await?;
    let Some((sender_name,)) = sender else {
        return Err(AppError::not_found("profile not found"));
    };
    let target: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM profiles WHERE id=?")
        .bind(to.to_string())
        .fetch_optional(db_pool)
        .await?;
    if target.is_none() {
        return Err(AppError::not_found("proxy not found"));
    }

    notifications::create_notification(
        db_pool,
        hub,
        push,
        &to.to_string(),
        NotificationKind::Wave,
        "Someone waved at you",
        &format!("{sender_name} waved at you"),
        Some(json!({ "from": from })),
    )
    .await?;
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn wave(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&session).await?;
    send_wave(&state.db_pool, &state.hub, &state.push, user_id, id).await?;
    Ok(Json(json!({ "waved": true })))
}

//! Reviews left by clients for proxies after an event.
//!
//! One review per (event, client); the aggregate rating is computed on read
//! and never cached on the profile.

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, AppState, session::require_user};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/reviews", post(post_review))
        .route("/proxies/{id}/rating", get(proxy_rating))
        .route("/proxies/{id}/reviews/count", get(proxy_review_count))
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Review {
    pub id: String,
    pub event_id: String,
    pub client_id: String,
    pub proxy_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NewReview {
    event_id: Uuid,
    proxy_id: Uuid,
    rating: i64,
    comment: Option<String>,
}

/// Insert a review for an event the caller booked. Only the event's client
/// may review, and a second review for the same event is rejected by the
/// unique constraint.
pub(crate) async fn create_review(
    db_pool: &SqlitePool,
    client_id: Uuid,
    review: &NewReview,
) -> AppResult<Review> {
    if !(1..=5).contains(&review.rating) {
        return Err(AppError::bad_request("rating must be between 1 and 5"));
    }

    let event: Option<(String,)> = sqlx::query_as("SELECT client_id FROM events WHERE id=?")
        .bind(review.event_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    let Some((owner,)) = event else {
        return Err(AppError::not_found("event not found"));
    };
    if owner != client_id.to_string() {
        return Err(AppError::forbidden("only the event's client may review"));
    }

    let id = Uuid::now_v7();
    let inserted = sqlx::query(
        "INSERT OR IGNORE INTO reviews (id, event_id, client_id, proxy_id, rating, comment, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(review.event_id.to_string())
    .bind(client_id.to_string())
    .bind(review.proxy_id.to_string())
    .bind(review.rating)
    .bind(review.comment.as_deref())
    .bind(Utc::now())
    .execute(db_pool)
    .await?
    .rows_affected();
    if inserted == 0 {
        return Err(AppError::bad_request("event already reviewed"));
    }

    let row: Review = sqlx::query_as("SELECT * FROM reviews WHERE id=?")
        .bind(id.to_string())
        .fetch_one(db_pool)
        .await?;
    Ok(row)
}

pub async fn average_rating(db_pool: &SqlitePool, proxy_id: Uuid) -> AppResult<f64> {
    let (rating,): (f64,) =
        sqlx::query_as("SELECT COALESCE(AVG(rating), 0.0) FROM reviews WHERE proxy_id=?")
            .bind(proxy_id.to_string())
            .fetch_one(db_pool)
            .await?;
    Ok(rating)
}

#[debug_handler]
pub(crate) async fn post_review(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(body): Json<NewReview>,
) -> AppResult<Json<Review>> {
    let client_id = require_user(&session).await?;
    let row = create_review(&db_pool, client_id, &body).await?;
    Ok(Json(row))
}

#[debug_handler]
pub(crate) async fn proxy_rating(
    Path(id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Value>> {
    let rating = average_rating(&db_pool, id).await?;
    Ok(Json(json!({ "rating": rating })))
}

#[debug_handler]
pub(crate) async fn proxy_review_count(
    Path(id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Value>> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews WHERE proxy_id=?")
        .bind(id.to_string())
        .fetch_one(&db_pool)
        .await?;
    Ok(Json(json!({ "count": count })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testutil::seed_user;
    use axum::http::StatusCode;

    async fn seed_event(pool: &SqlitePool, client: Uuid) -> Uuid {
        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO events (id, client_id, title, event_type, start_time, rate_type, created_at)
             VALUES (?, ?, 'Gala', 'wedding', ?, 'free', ?)",
        )
        .bind(id.to_string())
        .bind(client.to_string())
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn review(event_id: Uuid, proxy_id: Uuid, rating: i64) -> NewReview {
        NewReview {
            event_id,
            proxy_id,
            rating,
            comment: None,
        }
    }

    #[tokio::test]
    async fn unreviewed_proxy_has_zero_rating_and_count() {
        let pool = test_pool().await;
        let proxy = seed_user(&pool, "Nilo").await;

        assert_eq!(average_rating(&pool, proxy).await.unwrap(), 0.0);
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reviews WHERE proxy_id=?")
            .bind(proxy.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn rating_is_the_average_across_events() {
        let pool = test_pool().await;
        let client = seed_user(&pool, "Ada").await;
        let proxy = seed_user(&pool, "Nilo").await;

        let first = seed_event(&pool, client).await;
        let second = seed_event(&pool, client).await;
        create_review(&pool, client, &review(first, proxy, 5)).await.unwrap();
        create_review(&pool, client, &review(second, proxy, 2)).await.unwrap();

        assert_eq!(average_rating(&pool, proxy).await.unwrap(), 3.5);
    }

    #[tokio::test]
    async fn second_review_for_the_same_event_is_rejected() {
        let pool = test_pool().await;
        let client = seed_user(&pool, "Ada").await;
        let proxy = seed_user(&pool, "Nilo").await;
        let event = seed_event(&pool, client).await;

        create_review(&pool, client, &review(event, proxy, 4)).await.unwrap();
        let err = create_review(&pool, client, &review(event, proxy, 1))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn only_the_events_client_may_review() {
        let pool = test_pool().await;
        let client = seed_user(&pool, "Ada").await;
        let stranger = seed_user(&pool, "Kit").await;
        let proxy = seed_user(&pool, "Nilo").await;
        let event = seed_event(&pool, client).await;

        let err = create_review(&pool, stranger, &review(event, proxy, 5))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected() {
        let pool = test_pool().await;
        let client = seed_user(&pool, "Ada").await;
        let proxy = seed_user(&pool, "Nilo").await;
        let event = seed_event(&pool, client).await;

        for rating in [0, 6] {
            let err = create_review(&pool, client, &review(event, proxy, rating))
                .await
                .unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
    }
}

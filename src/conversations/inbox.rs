use axum::{Json, debug_handler, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, session::require_user};

/// One inbox row: the latest exchange with one participant about one event,
/// denormalized so the messages screen renders from a single call.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub event_id: String,
    pub event_title: String,
    pub other_id: String,
    pub other_name: String,
    pub other_avatar: Option<String>,
    pub last_body: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i64,
}

/// The viewer's conversations, one per (event, other participant) pair,
/// newest activity first.
pub async fn get_conversations(db_pool: &SqlitePool, viewer: &str) -> AppResult<Vec<ConversationSummary>> {
    let rows: Vec<ConversationSummary> = sqlx::query_as(
        "SELECT c.event_id,
            ev.title AS event_title,
            c.other_id,
            p.full_name AS other_name,
            p.avatar_url AS other_avatar,
            (SELECT m2.body FROM messages m2
               WHERE m2.event_id=c.event_id
                 AND ((m2.sender_id=?1 AND m2.recipient_id=c.other_id)
                   OR (m2.sender_id=c.other_id AND m2.recipient_id=?1))
               ORDER BY m2.created_at DESC LIMIT 1) AS last_body,
            c.last_message_at,
            (SELECT COUNT(*) FROM messages m3
               WHERE m3.event_id=c.event_id AND m3.sender_id=c.other_id
                 AND m3.recipient_id=?1 AND m3.read_at IS NULL) AS unread_count
         FROM (SELECT event_id,
                  CASE WHEN sender_id=?1 THEN recipient_id ELSE sender_id END AS other_id,
                  MAX(created_at) AS last_message_at
               FROM messages
               WHERE sender_id=?1 OR recipient_id=?1
               GROUP BY event_id, other_id) c
         JOIN events ev ON ev.id=c.event_id
         JOIN profiles p ON p.id=c.other_id
         ORDER BY c.last_message_at DESC",
    )
    .bind(viewer)
    .fetch_all(db_pool)
    .await?;
    Ok(rows)
}

#[debug_handler]
pub(crate) async fn conversations(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<ConversationSummary>>> {
    let viewer = require_user(&session).await?.to_string();
    let rows = get_conversations(&db_pool, &viewer).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::events::create_event;
    use crate::push::PushGateway;
    use crate::realtime::Hub;
    use crate::testutil::seed_user;
    use super::super::msg;
    use serde_json::json;
    use uuid::Uuid;

    async fn seed_event(pool: &SqlitePool, client_id: Uuid, title: &str) -> Uuid {
        let event = create_event(
            pool,
            client_id,
            serde_json::from_value(json!({
                "title": title,
                "event_type": "other",
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
    async fn inbox_shows_one_row_per_pair_with_latest_message_and_unread() {
        let pool = test_pool().await;
        let hub = Hub::new(16);
        let push = PushGateway::disabled("http://localhost:8080");
        let client = seed_user(&pool, "Client").await;
        let proxy_a = seed_user(&pool, "Asha").await;
        let proxy_b = seed_user(&pool, "Bruno").await;
        let event = seed_event(&pool, client, "Gallery opening").await;

        msg::send_msg(&pool, &hub, &push, event, client, proxy_a, "free that day?")
            .await
            .unwrap();
        msg::send_msg(&pool, &hub, &push, event, proxy_a, client, "yes, what time?")
            .await
            .unwrap();
        msg::send_msg(&pool, &hub, &push, event, proxy_b, client, "I can cover it")
            .await
            .unwrap();

        let inbox = get_conversations(&pool, &client.to_string()).await.unwrap();
        assert_eq!(inbox.len(), 2);

        // Newest activity first.
        assert_eq!(inbox[0].other_name, "Bruno");
        assert_eq!(inbox[0].last_body, "I can cover it");
        assert_eq!(inbox[0].unread_count, 1);
        assert_eq!(inbox[0].event_title, "Gallery opening");

        assert_eq!(inbox[1].other_name, "Asha");
        assert_eq!(inbox[1].last_body, "yes, what time?");
        assert_eq!(inbox[1].unread_count, 1);
    }

    #[tokio::test]
    async fn reading_a_thread_zeroes_its_unread_count_only() {
        let pool = test_pool().await;
        let hub = Hub::new(16);
        let push = PushGateway::disabled("http://localhost:8080");
        let client = seed_user(&pool, "Client").await;
        let proxy_a = seed_user(&pool, "Asha").await;
        let proxy_b = seed_user(&pool, "Bruno").await;
        let event = seed_event(&pool, client, "Gallery opening").await;

        msg::send_msg(&pool, &hub, &push, event, proxy_a, client, "hello")
            .await
            .unwrap();
        msg::send_msg(&pool, &hub, &push, event, proxy_b, client, "hi")
            .await
            .unwrap();

        msg::mark_pair_read(
            &pool,
            &event.to_string(),
            &client.to_string(),
            &proxy_a.to_string(),
        )
        .await;

        let inbox = get_conversations(&pool, &client.to_string()).await.unwrap();
        let by_name = |name: &str| inbox.iter().find(|c| c.other_name == name).unwrap();
        assert_eq!(by_name("Asha").unread_count, 0);
        assert_eq!(by_name("Bruno").unread_count, 1);
    }

    #[tokio::test]
    async fn same_pair_across_two_events_is_two_conversations() {
        let pool = test_pool().await;
        let hub = Hub::new(16);
        let push = PushGateway::disabled("http://localhost:8080");
        let client = seed_user(&pool, "Client").await;
        let proxy = seed_user(&pool, "Asha").await;
        let first = seed_event(&pool, client, "Funeral").await;
        let second = seed_event(&pool, client, "Wedding").await;

        msg::send_msg(&pool, &hub, &push, first, client, proxy, "about the funeral")
            .await
            .unwrap();
        msg::send_msg(&pool, &hub, &push, second, client, proxy, "about the wedding")
            .await
            .unwrap();

        let inbox = get_conversations(&pool, &client.to_string()).await.unwrap();
        assert_eq!(inbox.len(), 2);
        let titles: Vec<_> = inbox.iter().map(|c| c.event_title.as_str()).collect();
        assert!(titles.contains(&"Funeral"));
        assert!(titles.contains(&"Wedding"));
    }
}

//! Device tokens and FCM push dispatch.
//!
//! Dispatch fans out one request per registered token and tolerates partial
//! failure: the caller gets aggregate counts, never an all-or-nothing error.
//! Without a configured server key the gateway is a disabled no-op.

use axum::{
    Json, Router, debug_handler,
    extract::{Path, State},
    routing::{delete, get, post},
};
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{AppResult, AppState, config::Config, notifications::Notification, session::require_user};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/devices", post(register_device))
        .route("/devices/{token}", delete(unregister_device))
        .route("/push/public-key", get(public_key))
}

pub fn functions_router() -> Router<AppState> {
    Router::new().route("/functions/send-push-notification", post(send_push_notification))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Web,
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterBody {
    token: String,
    platform: Platform,
    device_info: Option<Value>,
}

/// Re-registering an existing token is a no-op apart from refreshing its
/// owner and metadata; no duplicate rows.
#[debug_handler]
pub(crate) async fn register_device(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(body): Json<RegisterBody>,
) -> AppResult<Json<Value>> {
    let user_id = require_user(&session).await?;
    sqlx::query(
        "INSERT INTO device_tokens (token, user_id, platform, device_info, created_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(token) DO UPDATE SET
            user_id=excluded.user_id,
            platform=excluded.platform,
            device_info=excluded.device_info",
    )
    .bind(&body.token)
    .bind(user_id.to_string())
    .bind(body.platform.as_str())
    .bind(body.device_info)
    .bind(Utc::now())
    .execute(&db_pool)
    .await?;
    Ok(Json(json!({ "registered": true })))
}

#[debug_handler]
pub(crate) async fn unregister_device(
    Path(token): Path<String>,
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Value>> {
    let user_id = require_user(&session).await?;
    sqlx::query("DELETE FROM device_tokens WHERE token=? AND user_id=?")
        .bind(&token)
        .bind(user_id.to_string())
        .execute(&db_pool)
        .await?;
    Ok(Json(json!({ "unregistered": true })))
}

/// VAPID key browser clients need to subscribe for web push.
#[debug_handler]
pub(crate) async fn public_key(State(config): State<Config>) -> Json<Value> {
    Json(json!({ "vapid_key": config.fcm_vapid_key }))
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushSummary {
    pub message: &'static str,
    pub successful: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Clone)]
pub struct PushGateway {
    http: reqwest::Client,
    server_key: Option<String>,
    app_url: String,
}

impl PushGateway {
    pub fn new(http: reqwest::Client, server_key: Option<String>, app_url: impl Into<String>) -> Self {
        Self {
            http,
            server_key,
            app_url: app_url.into(),
        }
    }

    /// Gateway with push delivery disabled; every dispatch is a no-op.
    pub fn disabled(app_url: impl Into<String>) -> Self {
        Self::new(reqwest::Client::new(), None, app_url)
    }

    /// Where tapping the push lands, derived from the notification type.
    pub fn click_action(&self, notification: &Notification) -> String {
        match notification.kind.as_str() {
            "message" => {
                let event_id = notification
                    .data
                    .as_ref()
                    .and_then(|d| d.get("event_id"))
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                format!("{}/events/{event_id}", self.app_url)
            }
            "wave" | "proxy_request" => format!("{}/request-feed", self.app_url),
            _ => format!("{}/notifications", self.app_url),
        }
    }

    fn fcm_payload(&self, notification: &Notification, token: &str) -> Value {
        json!({
            "to": token,
            "notification": {
                "title": notification.title,
                "body": notification.body,
                "click_action": self.click_action(notification),
            },
            "data": {
                "notification_id": notification.id,
                "type": notification.kind,
                "payload": notification.data,
            },
            "priority": "high",
        })
    }

    /// One concurrent send per registered token. Zero registrations is a
    /// successful no-op, and a failed token never fails the whole call.
    pub async fn dispatch(&self, db_pool: &SqlitePool, notification: &Notification) -> AppResult<PushSummary> {
        let Some(server_key) = &self.server_key else {
            tracing::debug!("push delivery disabled, skipping dispatch");
            return Ok(PushSummary {
                message: "Push delivery disabled",
                successful: 0,
                failed: 0,
                total: 0,
            });
        };

        let tokens: Vec<(String,)> = sqlx::query_as("SELECT token FROM device_tokens WHERE user_id=?")
            .bind(&notification.user_id)
            .fetch_all(db_pool)
            .await?;
        if tokens.is_empty() {
            return Ok(PushSummary {
                message: "No device tokens found for user",
                successful: 0,
                failed: 0,
                total: 0,
            });
        }

        let sends = tokens.iter().map(|(token,)| {
            let payload = self.fcm_payload(notification, token);
            async move {
                let response = self
                    .http
                    .post(FCM_SEND_URL)
                    .header("Authorization", format!("key={server_key}"))
                    .json(&payload)
                    .send()
                    .await?;
                response.error_for_status()?;
                Ok::<_, reqwest::Error>(())
            }
        });
        let results = join_all(sends).await;

        let successful = results.iter().filter(|r| r.is_ok()).count();
        let failed = results.len() - successful;
        for err in results.into_iter().filter_map(Result::err) {
            tracing::warn!(error = %err, notification = %notification.id, "push send failed");
        }

        Ok(PushSummary {
            message: "Notifications sent",
            successful,
            failed,
            total: tokens.len(),
        })
    }
}

/// Serverless-style boundary: takes a full notification row and relays it
/// to every device registered for its recipient.
#[debug_handler(state = AppState)]
pub(crate) async fn send_push_notification(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> AppResult<Json<PushSummary>> {
    let summary = state.push.dispatch(&state.db_pool, &notification).await?;
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testutil::seed_user;
    use chrono::Utc;
    use uuid::Uuid;

    fn notification(kind: &str, data: Option<Value>) -> Notification {
        Notification {
            id: Uuid::now_v7().to_string(),
            user_id: Uuid::now_v7().to_string(),
            kind: kind.to_owned(),
            title: "t".to_owned(),
            body: "b".to_owned(),
            data,
            read_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn click_through_target_follows_the_type_tag() {
        let push = PushGateway::disabled("https://tmwy.app");

        let message = notification("message", Some(json!({ "event_id": "e-9" })));
        assert_eq!(push.click_action(&message), "https://tmwy.app/events/e-9");

        assert_eq!(
            push.click_action(&notification("wave", None)),
            "https://tmwy.app/request-feed"
        );
        assert_eq!(
            push.click_action(&notification("proxy_request", None)),
            "https://tmwy.app/request-feed"
        );
        assert_eq!(
            push.click_action(&notification("payment", None)),
            "https://tmwy.app/notifications"
        );
    }

    #[tokio::test]
    async fn disabled_gateway_dispatch_is_a_no_op() {
        let pool = test_pool().await;
        let push = PushGateway::disabled("https://tmwy.app");
        let summary = push.dispatch(&pool, &notification("system", None)).await.unwrap();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn zero_registered_tokens_is_a_successful_no_op() {
        let pool = test_pool().await;
        let user = seed_user(&pool, "Dana").await;
        let push = PushGateway::new(
            reqwest::Client::new(),
            Some("test-key".to_owned()),
            "https://tmwy.app",
        );

        let mut row = notification("system", None);
        row.user_id = user.to_string();
        let summary = push.dispatch(&pool, &row).await.unwrap();
        assert_eq!(summary.message, "No device tokens found for user");
        assert_eq!(summary.total, 0);
    }

    #[tokio::test]
    async fn re_registering_a_token_keeps_the_count_stable() {
        let pool = test_pool().await;
        let user = seed_user(&pool, "Dana").await;

        for _ in 0..2 {
            sqlx::query(
                "INSERT INTO device_tokens (token, user_id, platform, device_info, created_at)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(token) DO UPDATE SET
                    user_id=excluded.user_id,
                    platform=excluded.platform,
                    device_info=excluded.device_info",
            )
            .bind("tok-1")
            .bind(user.to_string())
            .bind("web")
            .bind(None::<Value>)
            .bind(Utc::now())
            .execute(&pool)
            .await
            .unwrap();
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM device_tokens WHERE user_id=?")
            .bind(user.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}

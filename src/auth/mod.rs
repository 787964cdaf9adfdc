mod callback;
mod clients;
mod login;
mod logout;

use axum::{Json, Router, debug_handler, routing::get};
use rand::seq::IndexedRandom;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

pub use clients::{ClientProvider, Clients};

use crate::{AppResult, AppState, session::USER_ID};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/session", get(session_info))
        .route("/auth/login/{provider}", get(login::login))
        .route("/auth/callback/{provider}", get(callback::callback))
        .route("/auth/logout", get(logout::logout))
}

#[debug_handler]
async fn session_info(session: Session) -> AppResult<Json<serde_json::Value>> {
    let user_id = session.get::<Uuid>(USER_ID).await?;
    Ok(Json(json!({ "user_id": user_id })))
}

/// Resolve an external (provider, subject) identity to a local user,
/// creating the profile, default role grant and identity row on first
/// sign-in.
pub(crate) async fn ensure_user(
    db_pool: &SqlitePool,
    provider: ClientProvider,
    subject: &str,
    display_name: Option<String>,
) -> AppResult<Uuid> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT user_id FROM identities WHERE provider=? AND subject=?")
            .bind(provider.id())
            .bind(subject)
            .fetch_optional(db_pool)
            .await?;

    if let Some((user_id,)) = existing {
        return Ok(Uuid::parse_str(&user_id)?);
    }

    create_user(db_pool, provider, subject, display_name).await
}

/// Slow path of [`ensure_user`]. Two concurrent first sign-ins can both
/// miss the lookup; the identity insert decides the winner and the loser
/// rolls back and adopts the winning user.
async fn create_user(
    db_pool: &SqlitePool,
    provider: ClientProvider,
    subject: &str,
    display_name: Option<String>,
) -> AppResult<Uuid> {
    let user_id = Uuid::now_v7();
    let full_name = display_name.unwrap_or_else(placeholder_name);

    let mut tx = db_pool.begin().await?;
    sqlx::query(
        "INSERT INTO profiles (id, full_name, default_role, created_at) VALUES (?, ?, 'client', ?)",
    )
    .bind(user_id.to_string())
    .bind(&full_name)
    .bind(chrono::Utc::now())
    .execute(&mut *tx)
    .await?;
    sqlx::query("INSERT INTO user_roles (user_id, role, is_active) VALUES (?, 'client', 1)")
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;
    let claimed = sqlx::query(
        "INSERT OR IGNORE INTO identities (provider, subject, user_id) VALUES (?, ?, ?)",
    )
    .bind(provider.id())
    .bind(subject)
    .bind(user_id.to_string())
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if claimed == 0 {
        tx.rollback().await?;
        let (winner,): (String,) =
            sqlx::query_as("SELECT user_id FROM identities WHERE provider=? AND subject=?")
                .bind(provider.id())
                .bind(subject)
                .fetch_one(db_pool)
                .await?;
        return Ok(Uuid::parse_str(&winner)?);
    }
    tx.commit().await?;

    tracing::info!(user = %user_id, name = %full_name, "created user");
    Ok(user_id)
}

/// Placeholder display name for providers that withhold the real one.
fn placeholder_name() -> String {
    let adjectives = [
        "Quick", "Brave", "Silent", "Witty", "Clever", "Gentle", "Calm", "Bold", "Proud", "Lucky",
    ];
    let nouns = [
        "Fox", "Bear", "Eagle", "Wolf", "Tiger", "Owl", "Falcon", "Panda", "Dolphin", "Heron",
    ];
    let mut rng = rand::rng();
    format!(
        "{} {}",
        adjectives.choose(&mut rng).unwrap_or(&"Quiet"),
        nouns.choose(&mut rng).unwrap_or(&"Guest"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn first_sign_in_creates_profile_and_default_role() {
        let pool = test_pool().await;
        let user_id = ensure_user(&pool, ClientProvider::Google, "sub-1", Some("Ada".into()))
            .await
            .unwrap();

        let (name, role): (String, String) = sqlx::query_as(
            "SELECT full_name, default_role FROM profiles WHERE id=?",
        )
        .bind(user_id.to_string())
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(name, "Ada");
        assert_eq!(role, "client");

        let (active,): (String,) =
            sqlx::query_as("SELECT role FROM user_roles WHERE user_id=? AND is_active=1")
                .bind(user_id.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(active, "client");
    }

    #[tokio::test]
    async fn repeat_sign_in_reuses_the_same_user() {
        let pool = test_pool().await;
        let a = ensure_user(&pool, ClientProvider::Google, "sub-2", None)
            .await
            .unwrap();
        let b = ensure_user(&pool, ClientProvider::Google, "sub-2", None)
            .await
            .unwrap();
        assert_eq!(a, b);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn losing_a_sign_in_race_adopts_the_winning_user() {
        let pool = test_pool().await;
        let winner = ensure_user(&pool, ClientProvider::Google, "sub-3", Some("Winner".into()))
            .await
            .unwrap();

        // A second sign-in that missed the lookup lands here with the
        // identity already claimed.
        let loser = create_user(&pool, ClientProvider::Google, "sub-3", Some("Loser".into()))
            .await
            .unwrap();
        assert_eq!(loser, winner);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}

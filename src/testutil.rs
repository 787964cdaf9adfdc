//! Shared fixtures for the in-memory database tests.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::profiles::Role;

pub async fn seed_user(pool: &SqlitePool, name: &str) -> Uuid {
    let user_id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO profiles (id, full_name, default_role, created_at) VALUES (?, ?, 'client', ?)",
    )
    .bind(user_id.to_string())
    .bind(name)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await
    .expect("seed profile");
    sqlx::query("INSERT INTO user_roles (user_id, role, is_active) VALUES (?, 'client', 1)")
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .expect("seed role");
    user_id
}

pub async fn grant(pool: &SqlitePool, user_id: Uuid, role: Role) {
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role, is_active) VALUES (?, ?, 0)")
        .bind(user_id.to_string())
        .bind(role.as_str())
        .execute(pool)
        .await
        .expect("grant role");
}

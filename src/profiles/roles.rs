use axum::{Json, debug_handler, extract::State};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, session::require_user};

use super::{Role, me::load_identity};

#[derive(Debug, Deserialize)]
pub(crate) struct RoleBody {
    role: Role,
}

#[debug_handler]
pub(crate) async fn list_roles(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&session).await?;
    let view = load_identity(&db_pool, user_id).await?;
    Ok(Json(json!({
        "current_role": view.current_role,
        "available_roles": view.available_roles,
    })))
}

#[debug_handler]
pub(crate) async fn grant_role(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(RoleBody { role }): Json<RoleBody>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&session).await?;
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role, is_active) VALUES (?, ?, 0)")
        .bind(user_id.to_string())
        .bind(role.as_str())
        .execute(&db_pool)
        .await?;
    Ok(Json(json!({ "granted": role })))
}

#[debug_handler]
pub(crate) async fn set_active_role(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(RoleBody { role }): Json<RoleBody>,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = require_user(&session).await?;
    switch_active_role(&db_pool, user_id, role).await?;
    Ok(Json(json!({ "current_role": role })))
}

pub(crate) async fn active_role(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<String>> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT role FROM user_roles WHERE user_id=? AND is_active=1")
            .bind(user_id.to_string())
            .fetch_optional(db_pool)
            .await?;
    Ok(row.map(|(role,)| role))
}

/// Atomic exactly-one-active-role switch. Runs in a transaction: on any
/// failure the previous active role is left untouched.
pub async fn switch_active_role(db_pool: &SqlitePool, user_id: Uuid, role: Role) -> AppResult<()> {
    let mut tx = db_pool.begin().await?;

    let granted: Option<(i64,)> =
        sqlx::query_as("SELECT 1 FROM user_roles WHERE user_id=? AND role=?")
            .bind(user_id.to_string())
            .bind(role.as_str())
            .fetch_optional(&mut *tx)
            .await?;
    if granted.is_none() {
        return Err(AppError::forbidden(format!(
            "role {} is not granted",
            role.as_str()
        )));
    }

    sqlx::query("UPDATE user_roles SET is_active = (role = ?) WHERE user_id = ?")
        .bind(role.as_str())
        .bind(user_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

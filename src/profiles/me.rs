use axum::{
    Json, debug_handler,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, session::require_user};

use super::Profile;

/// Profile plus the role view the navigation is built from.
#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub profile: Profile,
    pub current_role: String,
    pub available_roles: Vec<String>,
}

pub(crate) async fn load_identity(db_pool: &SqlitePool, user_id: Uuid) -> AppResult<IdentityView> {
    let profile: Profile = sqlx::query_as("SELECT * FROM profiles WHERE id=?")
        .bind(user_id.to_string())
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))?;

    // A failed or empty role read must not yield an inconsistent role set;
    // fall back to the profile's stored default role.
    let roles: Vec<(String, bool)> = match sqlx::query_as(
        "SELECT role, is_active FROM user_roles WHERE user_id=? ORDER BY role",
    )
    .bind(user_id.to_string())
    .fetch_all(db_pool)
    .await
    {
        Ok(rows) if !rows.is_empty() => rows,
        Ok(_) => vec![(profile.default_role.clone(), true)],
        Err(err) => {
            tracing::warn!(error = %err, "failed to load role grants, using default role");
            vec![(profile.default_role.clone(), true)]
        }
    };

    let current_role = roles
        .iter()
        .find(|(_, active)| *active)
        .map(|(role, _)| role.clone())
        .unwrap_or_else(|| profile.default_role.clone());
    let available_roles = roles.into_iter().map(|(role, _)| role).collect();

    Ok(IdentityView {
        profile,
        current_role,
        available_roles,
    })
}

#[debug_handler]
pub(crate) async fn my_profile(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<IdentityView>> {
    let user_id = require_user(&session).await?;
    Ok(Json(load_identity(&db_pool, user_id).await?))
}

#[debug_handler]
pub(crate) async fn profile(
    Path(id): Path<Uuid>,
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Profile>> {
    let profile: Profile = sqlx::query_as("SELECT * FROM profiles WHERE id=?")
        .bind(id.to_string())
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("profile not found"))?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateProfile {
    full_name: Option<String>,
    bio: Option<String>,
    location_city: Option<String>,
    location_state: Option<String>,
    location_country: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[debug_handler]
pub(crate) async fn update_profile(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(update): Json<UpdateProfile>,
) -> AppResult<Json<Profile>> {
    let user_id = require_user(&session).await?;

    sqlx::query(
        "UPDATE profiles SET
            full_name = COALESCE(?, full_name),
            bio = COALESCE(?, bio),
            location_city = COALESCE(?, location_city),
            location_state = COALESCE(?, location_state),
            location_country = COALESCE(?, location_country),
            latitude = COALESCE(?, latitude),
            longitude = COALESCE(?, longitude)
        WHERE id=?",
    )
    .bind(&update.full_name)
    .bind(&update.bio)
    .bind(&update.location_city)
    .bind(&update.location_state)
    .bind(&update.location_country)
    .bind(update.latitude)
    .bind(update.longitude)
    .bind(user_id.to_string())
    .execute(&db_pool)
    .await?;

    let profile: Profile = sqlx::query_as("SELECT * FROM profiles WHERE id=?")
        .bind(user_id.to_string())
        .fetch_one(&db_pool)
        .await?;
    Ok(Json(profile))
}

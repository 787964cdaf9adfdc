use axum::{
    Json,
    body::Bytes,
    debug_handler,
    extract::{Query, State},
};
use serde::Deserialize;
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppError, AppResult, AppState,
    session::require_user,
    storage::{COVER_PHOTOS, MediaStore, PROFILE_PHOTOS},
};

#[derive(Deserialize)]
pub(crate) struct PhotoQuery {
    /// File extension of the uploaded image, e.g. `png`.
    ext: Option<String>,
}

fn sanitize_ext(ext: Option<String>) -> AppResult<String> {
    let ext = ext.unwrap_or_else(|| "jpg".to_owned());
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::bad_request("invalid file extension"));
    }
    Ok(ext.to_ascii_lowercase())
}

/// Upload then row update are two sequential calls with no rollback: a
/// failed update leaves the stored file behind and surfaces the error.
async fn upload_photo(
    db_pool: &SqlitePool,
    media: &MediaStore,
    session: &Session,
    bucket: &str,
    stem: &str,
    column: &str,
    ext: Option<String>,
    bytes: Bytes,
) -> AppResult<String> {
    let user_id = require_user(session).await?;
    let ext = sanitize_ext(ext)?;

    let path = format!("{user_id}/{stem}.{ext}");
    let url = media.upload(bucket, &path, &bytes, true).await?;

    sqlx::query(&format!("UPDATE profiles SET {column}=? WHERE id=?"))
        .bind(&url)
        .bind(user_id.to_string())
        .execute(db_pool)
        .await?;

    Ok(url)
}

#[debug_handler(state = AppState)]
pub(crate) async fn upload_avatar(
    State(db_pool): State<SqlitePool>,
    State(media): State<MediaStore>,
    session: Session,
    Query(PhotoQuery { ext }): Query<PhotoQuery>,
    bytes: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let url = upload_photo(
        &db_pool,
        &media,
        &session,
        PROFILE_PHOTOS,
        "avatar",
        "avatar_url",
        ext,
        bytes,
    )
    .await?;
    Ok(Json(json!({ "url": url })))
}

#[debug_handler(state = AppState)]
pub(crate) async fn upload_cover(
    State(db_pool): State<SqlitePool>,
    State(media): State<MediaStore>,
    session: Session,
    Query(PhotoQuery { ext }): Query<PhotoQuery>,
    bytes: Bytes,
) -> AppResult<Json<serde_json::Value>> {
    let url = upload_photo(
        &db_pool,
        &media,
        &session,
        COVER_PHOTOS,
        "cover",
        "cover_url",
        ext,
        bytes,
    )
    .await?;
    Ok(Json(json!({ "url": url })))
}

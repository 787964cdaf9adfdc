//! Bucketed file storage on local disk, served back under `/media`.

use std::path::{Component, Path, PathBuf};

use axum::{
    body::Bytes,
    debug_handler,
    extract::{Path as AxumPath, State},
    http::header,
    response::{IntoResponse, Response},
};
use tokio::fs;

use crate::{AppError, AppResult};

pub const PROFILE_PHOTOS: &str = "profile-photos";
pub const COVER_PHOTOS: &str = "cover-photos";

const BUCKETS: &[&str] = &[PROFILE_PHOTOS, COVER_PHOTOS];

#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    public_base: String,
}

impl MediaStore {
    pub async fn new(base_path: PathBuf, public_base: String) -> anyhow::Result<Self> {
        for bucket in BUCKETS {
            fs::create_dir_all(base_path.join(bucket)).await?;
        }
        tracing::info!(path = %base_path.display(), "media store initialized");
        Ok(Self {
            base_path,
            public_base,
        })
    }

    /// Resolve a bucket-relative path, rejecting traversal components.
    fn resolve(&self, bucket: &str, path: &str) -> AppResult<PathBuf> {
        if !BUCKETS.contains(&bucket) {
            return Err(AppError::bad_request(format!("unknown bucket {bucket}")));
        }
        let mut resolved = self.base_path.join(bucket);
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(AppError::bad_request("path traversal detected")),
            }
        }
        Ok(resolved)
    }

    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/media/{bucket}/{path}", self.public_base)
    }

    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: &[u8],
        overwrite: bool,
    ) -> AppResult<String> {
        let target = self.resolve(bucket, path)?;
        if !overwrite && fs::try_exists(&target).await? {
            return Err(AppError::bad_request(format!("{bucket}/{path} already exists")));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, data).await?;
        tracing::debug!(bucket, path, size = data.len(), "stored media object");
        Ok(self.public_url(bucket, path))
    }

    pub async fn read(&self, bucket: &str, path: &str) -> AppResult<Vec<u8>> {
        let target = self.resolve(bucket, path)?;
        match fs::read(&target).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(AppError::not_found(format!("{bucket}/{path} not found")))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list(&self, bucket: &str, prefix: &str) -> AppResult<Vec<String>> {
        let dir = self.resolve(bucket, prefix)?;
        let mut names = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        for path in paths {
            let target = self.resolve(bucket, path)?;
            match fs::remove_file(&target).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

#[debug_handler(state = crate::AppState)]
pub async fn serve_media(
    AxumPath((bucket, path)): AxumPath<(String, String)>,
    State(media): State<MediaStore>,
) -> AppResult<Response> {
    let data = media.read(&bucket, &path).await?;
    let content_type = match path.rsplit('.').next() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    };
    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Bytes::from(data),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (MediaStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080".to_owned(),
        )
        .await
        .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn upload_and_read_back() {
        let (store, _dir) = test_store().await;
        let url = store
            .upload(PROFILE_PHOTOS, "u1/avatar.png", b"png-bytes", true)
            .await
            .unwrap();
        assert_eq!(url, "http://localhost:8080/media/profile-photos/u1/avatar.png");
        assert_eq!(store.read(PROFILE_PHOTOS, "u1/avatar.png").await.unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn overwrite_flag_is_enforced() {
        let (store, _dir) = test_store().await;
        store
            .upload(COVER_PHOTOS, "u1/cover.jpg", b"one", false)
            .await
            .unwrap();
        assert!(
            store
                .upload(COVER_PHOTOS, "u1/cover.jpg", b"two", false)
                .await
                .is_err()
        );
        store
            .upload(COVER_PHOTOS, "u1/cover.jpg", b"two", true)
            .await
            .unwrap();
        assert_eq!(store.read(COVER_PHOTOS, "u1/cover.jpg").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn list_and_remove() {
        let (store, _dir) = test_store().await;
        store
            .upload(PROFILE_PHOTOS, "u2/avatar.png", b"a", true)
            .await
            .unwrap();
        store
            .upload(PROFILE_PHOTOS, "u2/older.png", b"b", true)
            .await
            .unwrap();

        let listed = store.list(PROFILE_PHOTOS, "u2").await.unwrap();
        assert_eq!(listed, vec!["avatar.png".to_string(), "older.png".to_string()]);

        store
            .remove(PROFILE_PHOTOS, &["u2/older.png".to_string()])
            .await
            .unwrap();
        let listed = store.list(PROFILE_PHOTOS, "u2").await.unwrap();
        assert_eq!(listed, vec!["avatar.png".to_string()]);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (store, _dir) = test_store().await;
        assert!(
            store
                .upload(PROFILE_PHOTOS, "../escape.png", b"x", true)
                .await
                .is_err()
        );
        assert!(store.read(PROFILE_PHOTOS, "../../etc/passwd").await.is_err());
    }
}

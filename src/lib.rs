pub mod auth;
pub mod checkout;
pub mod config;
pub mod conversations;
pub mod db;
pub mod events;
pub mod feeds;
pub mod notifications;
pub mod profiles;
pub mod push;
pub mod realtime;
pub mod reviews;
pub mod session;
pub mod storage;

mod appresult;

#[cfg(test)]
pub mod testutil;

pub use appresult::{AppError, AppResult};

use axum::extract::FromRef;
use serde_json::Value;
use sqlx::SqlitePool;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: config::Config,
    pub clients: auth::Clients,
    pub hub: realtime::Hub,
    pub media: storage::MediaStore,
    pub push: push::PushGateway,
    pub http: reqwest::Client,
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
}

impl GetField for Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(self
            .get(field)
            .ok_or_else(|| AppError::bad_request(format!("expected {field} in payload")))?
            .as_str()
            .ok_or_else(|| AppError::bad_request(format!("expected {field} to be a string")))?
            .to_owned())
    }
}

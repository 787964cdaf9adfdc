mod me;
mod photos;
mod roles;

use axum::{
    Router,
    routing::{get, patch, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AppState;

pub use roles::switch_active_role;
pub(crate) use roles::active_role;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/profiles/me", get(me::my_profile))
        .route("/profiles/me", patch(me::update_profile))
        .route("/profiles/me/avatar", post(photos::upload_avatar))
        .route("/profiles/me/cover", post(photos::upload_cover))
        .route("/profiles/{id}", get(me::profile))
        .route("/roles", get(roles::list_roles).post(roles::grant_role))
        .route("/roles/active", post(roles::set_active_role))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Proxy,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Proxy => "proxy",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub bio: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub default_role: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

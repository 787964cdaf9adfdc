//! Configuration loaded from environment variables.
//!
//! Required pieces (bind address, database) have defaults so the server can
//! start with zero configuration for local development. Optional provider
//! keys (Stripe, FCM, OAuth) merely disable the dependent feature when
//! absent; they never prevent startup.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address for the HTTP server.
    /// Env: `HTTP_ADDR`, default `0.0.0.0:8080`.
    pub http_addr: SocketAddr,

    /// SQLite connection string.
    /// Env: `DATABASE_URL`, default `sqlite://tmwy.db?mode=rwc`.
    pub database_url: String,

    /// Public base URL of the application, used for media URLs, OAuth
    /// redirects and checkout return pages.
    /// Env: `APP_URL`, default `http://localhost:8080`.
    pub app_url: String,

    /// Filesystem root for uploaded media buckets.
    /// Env: `MEDIA_PATH`, default `./media`.
    pub media_path: PathBuf,

    /// Stripe secret key. Env: `STRIPE_SECRET_KEY`.
    pub stripe_secret_key: Option<String>,
    /// Stripe price id for the verified membership subscription.
    /// Env: `STRIPE_VERIFIED_PRICE_ID`.
    pub stripe_verified_price_id: Option<String>,

    /// FCM legacy server key used to dispatch pushes.
    /// Env: `FCM_SERVER_KEY`.
    pub fcm_server_key: Option<String>,
    /// FCM web-push public (VAPID) key handed to browser clients.
    /// Env: `FCM_VAPID_KEY`.
    pub fcm_vapid_key: Option<String>,

    /// Firebase web API key; the identity-toolkit endpoint built from it
    /// resolves OAuth provider tokens into a stable subject id.
    /// Env: `FIREBASE_API_KEY`.
    pub firebase_api_key: Option<String>,

    /// Env: `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`.
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    /// Env: `APPLE_CLIENT_ID` / `APPLE_CLIENT_SECRET`.
    pub apple_client_id: Option<String>,
    pub apple_client_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_url: "sqlite://tmwy.db?mode=rwc".to_owned(),
            app_url: "http://localhost:8080".to_owned(),
            media_path: PathBuf::from("./media"),
            stripe_secret_key: None,
            stripe_verified_price_id: None,
            fcm_server_key: None,
            fcm_vapid_key: None,
            firebase_api_key: None,
            google_client_id: None,
            google_client_secret: None,
            apple_client_id: None,
            apple_client_secret: None,
        }
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "invalid HTTP_ADDR, using default"),
            }
        }
        if let Some(url) = var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(url) = var("APP_URL") {
            config.app_url = url.trim_end_matches('/').to_owned();
        }
        if let Some(path) = var("MEDIA_PATH") {
            config.media_path = PathBuf::from(path);
        }

        config.stripe_secret_key = var("STRIPE_SECRET_KEY");
        config.stripe_verified_price_id = var("STRIPE_VERIFIED_PRICE_ID");
        config.fcm_server_key = var("FCM_SERVER_KEY");
        config.fcm_vapid_key = var("FCM_VAPID_KEY");
        config.firebase_api_key = var("FIREBASE_API_KEY");
        config.google_client_id = var("GOOGLE_CLIENT_ID");
        config.google_client_secret = var("GOOGLE_CLIENT_SECRET");
        config.apple_client_id = var("APPLE_CLIENT_ID");
        config.apple_client_secret = var("APPLE_CLIENT_SECRET");

        if config.stripe_secret_key.is_none() || config.stripe_verified_price_id.is_none() {
            tracing::warn!("Stripe keys not supplied, verified checkout disabled");
        }
        if config.fcm_server_key.is_none() {
            tracing::warn!("FCM_SERVER_KEY not supplied, push delivery disabled");
        }

        config
    }
}

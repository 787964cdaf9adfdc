use tmwy::{
    AppState, auth, checkout, config::Config, conversations, db, events, feeds, notifications,
    profiles, push, realtime::Hub, reviews, storage,
};

use axum::{Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tmwy=info,info".into()))
        .init();

    let config = Config::from_env();

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::days(7)));

    let db_pool = db::connect(&config.database_url).await?;
    db::init_schema(&db_pool).await?;

    let http = reqwest::Client::new();
    let clients = auth::Clients::from_config(&config);
    let media = storage::MediaStore::new(config.media_path.clone(), config.app_url.clone()).await?;
    let push = push::PushGateway::new(http.clone(), config.fcm_server_key.clone(), config.app_url.clone());

    let app_state = AppState {
        db_pool,
        config: config.clone(),
        clients,
        hub: Hub::new(256),
        media,
        push,
        http,
    };

    let app = Router::new()
        .merge(auth::router())
        .nest(
            "/api",
            Router::new()
                .merge(profiles::router())
                .merge(events::router())
                .merge(feeds::router())
                .merge(conversations::router())
                .merge(notifications::router())
                .merge(reviews::router())
                .merge(push::router()),
        )
        .merge(push::functions_router())
        .merge(checkout::functions_router())
        .route("/media/{bucket}/{*path}", get(storage::serve_media))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
        .layer(session_layer);

    tracing::info!(addr = %config.http_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

use std::str::FromStr;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub async fn connect(database_url: &str) -> sqlx::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
}

/// Idempotent schema bootstrap, run once at startup.
pub async fn init_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    for stmt in SCHEMA {
        sqlx::query(stmt).execute(pool).await?;
    }
    Ok(())
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS profiles (
        id TEXT PRIMARY KEY,
        full_name TEXT NOT NULL,
        avatar_url TEXT,
        cover_url TEXT,
        bio TEXT,
        location_city TEXT,
        location_state TEXT,
        location_country TEXT,
        latitude REAL,
        longitude REAL,
        default_role TEXT NOT NULL DEFAULT 'client',
        is_verified INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS identities (
        provider TEXT NOT NULL,
        subject TEXT NOT NULL,
        user_id TEXT NOT NULL REFERENCES profiles(id),
        PRIMARY KEY (provider, subject)
    )",
    "CREATE TABLE IF NOT EXISTS user_roles (
        user_id TEXT NOT NULL REFERENCES profiles(id),
        role TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (user_id, role)
    )",
    "CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        client_id TEXT NOT NULL REFERENCES profiles(id),
        title TEXT NOT NULL,
        event_type TEXT NOT NULL,
        description TEXT,
        location_address TEXT,
        location_city TEXT,
        location_state TEXT,
        location_country TEXT,
        zip_code TEXT,
        latitude REAL,
        longitude REAL,
        start_time TEXT NOT NULL,
        end_time TEXT,
        dress_code TEXT,
        tone TEXT,
        message TEXT,
        rate_type TEXT NOT NULL,
        budget_cents INTEGER,
        currency TEXT NOT NULL DEFAULT 'usd',
        status TEXT NOT NULL DEFAULT 'open',
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS event_responses (
        event_id TEXT NOT NULL REFERENCES events(id),
        proxy_id TEXT NOT NULL REFERENCES profiles(id),
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (event_id, proxy_id)
    )",
    "CREATE TABLE IF NOT EXISTS event_invites (
        event_id TEXT NOT NULL REFERENCES events(id),
        proxy_id TEXT NOT NULL REFERENCES profiles(id),
        created_at TEXT NOT NULL,
        PRIMARY KEY (event_id, proxy_id)
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT PRIMARY KEY,
        event_id TEXT NOT NULL REFERENCES events(id),
        sender_id TEXT NOT NULL REFERENCES profiles(id),
        recipient_id TEXT NOT NULL REFERENCES profiles(id),
        body TEXT NOT NULL,
        read_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES profiles(id),
        type TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        data TEXT,
        read_at TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS device_tokens (
        token TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES profiles(id),
        platform TEXT NOT NULL,
        device_info TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        event_id TEXT NOT NULL REFERENCES events(id),
        client_id TEXT NOT NULL REFERENCES profiles(id),
        proxy_id TEXT NOT NULL REFERENCES profiles(id),
        rating INTEGER NOT NULL,
        comment TEXT,
        created_at TEXT NOT NULL,
        UNIQUE (event_id, client_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_event ON messages (event_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications (user_id, created_at)",
];

/// In-memory pool for tests. A single connection keeps every query on the
/// same in-memory database.
#[doc(hidden)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("in-memory sqlite options")
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("in-memory sqlite");
    init_schema(&pool).await.expect("schema init");
    pool
}

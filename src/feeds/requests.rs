use std::cmp::Ordering;

use axum::{
    Json, debug_handler,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppError, AppResult, AppState,
    notifications::{self, NotificationKind},
    profiles::active_role,
    push::PushGateway,
    realtime::Hub,
    session::require_user,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestSort {
    /// Group by city, soonest date within a city.
    #[default]
    CityDate,
    /// Ascending distance from the viewer; unknown distances last.
    Distance,
    Date,
    EventType,
    City,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RequestSummary {
    pub event_id: String,
    pub title: String,
    pub event_type: String,
    pub description: Option<String>,
    pub location_address: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    pub zip_code: Option<String>,
    #[serde(skip_serializing)]
    pub latitude: Option<f64>,
    #[serde(skip_serializing)]
    pub longitude: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub budget_cents: Option<i64>,
    pub currency: String,
    pub rate_type: String,
    pub status: String,
    pub requested_at: DateTime<Utc>,
    pub client_id: String,
    pub client_name: String,
    pub client_avatar: Option<String>,
    pub client_verified: bool,
    pub invited_count: i64,
    pub accepted_count: i64,
    pub response_status: Option<String>,
    #[sqlx(default)]
    pub has_responded: bool,
    #[sqlx(default)]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct RequestFilter<'a> {
    pub event_type: Option<&'a str>,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub min_budget_cents: Option<i64>,
}

pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Ascending distance from the viewer, unknown distances last. The only
/// ranking that needs the viewer's coordinates, so the only one applied
/// in process; the rest order in SQL.
pub fn sort_by_distance(rows: &mut [RequestSummary]) {
    rows.sort_by(|a, b| match (a.distance_km, b.distance_km) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.start_time.cmp(&b.start_time),
    });
}

fn order_clause(sort: RequestSort) -> Option<&'static str> {
    match sort {
        RequestSort::CityDate => {
            Some("(e.location_city IS NULL), LOWER(e.location_city), e.start_time")
        }
        RequestSort::Date => Some("e.start_time"),
        RequestSort::EventType => Some("e.event_type, e.start_time"),
        RequestSort::City => Some("(e.location_city IS NULL), LOWER(e.location_city)"),
        RequestSort::Distance => None,
    }
}

const FEED_SELECT: &str = "SELECT e.id AS event_id, e.title, e.event_type, e.description,
    e.location_address, e.location_city, e.location_state, e.location_country, e.zip_code,
    e.latitude, e.longitude, e.start_time, e.end_time,
    e.budget_cents, e.currency, e.rate_type, e.status, e.created_at AS requested_at,
    e.client_id, p.full_name AS client_name, p.avatar_url AS client_avatar,
    p.is_verified AS client_verified,
    (SELECT COUNT(*) FROM event_invites i WHERE i.event_id=e.id) AS invited_count,
    (SELECT COUNT(*) FROM event_responses r
       WHERE r.event_id=e.id AND r.status='accept') AS accepted_count,
    (SELECT r.status FROM event_responses r
       WHERE r.event_id=e.id AND r.proxy_id=?1) AS response_status
 FROM events e
 JOIN profiles p ON p.id=e.client_id
 WHERE e.status='open' AND e.client_id != ?1
   AND (?2 IS NULL OR e.event_type = ?2)
   AND (?3 IS NULL OR e.location_city = ?3)
   AND (?4 IS NULL OR e.location_state = ?4)
   AND (?5 IS NULL OR COALESCE(e.budget_cents, 0) >= ?5)";

/// One call returns the whole ranked window; the backend owns the ranking
/// and the caller never re-sorts. Non-distance sorts order and page in
/// SQL; the distance sort ranks the filtered set in process because it
/// depends on the viewer's coordinates.
pub async fn get_request_feed(
    db_pool: &SqlitePool,
    viewer: Uuid,
    limit: i64,
    offset: i64,
    filter: RequestFilter<'_>,
    sort: RequestSort,
) -> AppResult<Vec<RequestSummary>> {
    let offset = offset.max(0);
    let limit = limit.clamp(1, 200);

    let sql = match order_clause(sort) {
        Some(clause) => format!("{FEED_SELECT} ORDER BY {clause} LIMIT ?6 OFFSET ?7"),
        None => FEED_SELECT.to_owned(),
    };
    let mut query = sqlx::query_as(&sql)
        .bind(viewer.to_string())
        .bind(filter.event_type)
        .bind(filter.city)
        .bind(filter.state)
        .bind(filter.min_budget_cents);
    if order_clause(sort).is_some() {
        query = query.bind(limit).bind(offset);
    }
    let mut rows: Vec<RequestSummary> = query.fetch_all(db_pool).await?;

    // A viewer without stored coordinates gets every distance as unknown,
    // which the distance sort places last; never an error.
    let viewer_coords: Option<(f64, f64)> = sqlx::query_as::<_, (Option<f64>, Option<f64>)>(
        "SELECT latitude, longitude FROM profiles WHERE id=?",
    )
    .bind(viewer.to_string())
    .fetch_optional(db_pool)
    .await?
    .and_then(|(lat, lon)| Some((lat?, lon?)));

    for row in rows.iter_mut() {
        row.has_responded = row.response_status.is_some();
        row.distance_km = match (viewer_coords, row.latitude, row.longitude) {
            (Some(viewer), Some(lat), Some(lon)) => Some(haversine_km(viewer, (lat, lon))),
            _ => None,
        };
    }

    if order_clause(sort).is_none() {
        sort_by_distance(&mut rows);
        rows = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseChoice {
    Accept,
    Decline,
}

impl ResponseChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseChoice::Accept => "accept",
            ResponseChoice::Decline => "decline",
        }
    }
}

/// Upsert the proxy's decision and notify the client. Shared counters are
/// never patched locally; callers reload the feed afterwards.
pub async fn respond_to_request(
    db_pool: &SqlitePool,
    hub: &Hub,
    push: &PushGateway,
    proxy_id: Uuid,
    event_id: Uuid,
    response: ResponseChoice,
) -> AppResult<()> {
    let event: Option<(String, String, String)> =
        sqlx::query_as("SELECT client_id, title, status FROM events WHERE id=?")
            .bind(event_id.to_string())
            .fetch_optional(db_pool)
            .await?;
    let Some((client_id, title, status)) = event else {
        return Err(AppError::not_found("event not found"));
    };
    if status != "open" {
        return Err(AppError::bad_request("event is no longer open"));
    }
    if client_id == proxy_id.to_string() {
        return Err(AppError::forbidden("cannot respond to your own request"));
    }

    sqlx::query(
        "INSERT INTO event_responses (event_id, proxy_id, status, created_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(event_id, proxy_id) DO UPDATE SET status=excluded.status",
    )
    .bind(event_id.to_string())
    .bind(proxy_id.to_string())
    .bind(response.as_str())
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    let (headline, line) = match response {
        ResponseChoice::Accept => ("Request accepted", "accepted your request"),
        ResponseChoice::Decline => ("Request declined", "declined your request"),
    };
    let proxy_name: Option<(String,)> = sqlx::query_as("SELECT full_name FROM profiles WHERE id=?")
        .bind(proxy_id.to_string())
        .fetch_optional(db_pool)
        .await?;
    let proxy_name = proxy_name.map(|(name,)| name).unwrap_or_else(|| "A proxy".to_owned());

    notifications::create_notification(
        db_pool,
        hub,
        push,
        &client_id,
        NotificationKind::EventUpdate,
        headline,
        &format!("{proxy_name} {line} for \"{title}\""),
        Some(json!({ "event_id": event_id, "response": response })),
    )
    .await?;

    Ok(())
}

#[derive(Deserialize)]
pub(crate) struct RequestFeedQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    event_type: Option<String>,
    city: Option<String>,
    state: Option<String>,
    min_budget_cents: Option<i64>,
    #[serde(default)]
    sort_by: RequestSort,
}

#[debug_handler]
pub(crate) async fn request_feed(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Query(query): Query<RequestFeedQuery>,
) -> AppResult<Json<Vec<RequestSummary>>> {
    let viewer = require_user(&session).await?;
    if active_role(&db_pool, viewer).await?.as_deref() != Some("proxy") {
        return Err(AppError::forbidden("request feed requires the proxy role"));
    }

    let filter = RequestFilter {
        event_type: query.event_type.as_deref(),
        city: query.city.as_deref(),
        state: query.state.as_deref(),
        min_budget_cents: query.min_budget_cents,
    };
    let rows = get_request_feed(
        &db_pool,
        viewer,
        query.limit.unwrap_or(50),
        query.offset.unwrap_or(0),
        filter,
        query.sort_by,
    )
    .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub(crate) struct RespondBody {
    response: ResponseChoice,
}

#[debug_handler(state = AppState)]
pub(crate) async fn respond(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    session: Session,
    Json(RespondBody { response }): Json<RespondBody>,
) -> AppResult<Json<serde_json::Value>> {
    let proxy_id = require_user(&session).await?;
    if active_role(&state.db_pool, proxy_id).await?.as_deref() != Some("proxy") {
        return Err(AppError::forbidden("responding requires the proxy role"));
    }
    respond_to_request(&state.db_pool, &state.hub, &state.push, proxy_id, event_id, response).await?;
    Ok(Json(json!({ "response": response })))
}

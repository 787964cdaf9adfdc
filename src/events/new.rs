use axum::{Json, debug_handler, extract::State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult, session::require_user};

use super::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    Free,
    Paid,
    Negotiable,
}

#[derive(Debug, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub event_type: String,
    pub description: Option<String>,
    pub location_address: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub location_country: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub dress_code: Option<String>,
    pub tone: Option<String>,
    pub message: Option<String>,
    pub price_type: PriceType,
    /// Dollar amount as entered by the user, e.g. "150" or "149.50".
    pub price_amount: Option<String>,
}

const EVENT_TYPES: &[&str] = &["funeral", "wedding", "court", "hospital", "other"];

/// Map the form's pricing mode onto the stored rate fields. A paid event
/// carries its budget in cents; free and negotiable events carry none.
fn rate_fields(price_type: PriceType, price_amount: Option<&str>) -> AppResult<(&'static str, Option<i64>)> {
    match price_type {
        PriceType::Free => Ok(("free", None)),
        PriceType::Negotiable => Ok(("negotiable", None)),
        PriceType::Paid => {
            let amount =
                price_amount.ok_or_else(|| AppError::bad_request("price_amount is required for paid events"))?;
            Ok(("listed", Some(parse_budget_cents(amount)?)))
        }
    }
}

fn parse_budget_cents(amount: &str) -> AppResult<i64> {
    let amount = amount.trim().trim_start_matches('$');
    let invalid = || AppError::bad_request(format!("invalid price amount \"{amount}\""));

    let (dollars, cents) = match amount.split_once('.') {
        Some((dollars, cents)) => (dollars, cents),
        None => (amount, ""),
    };
    if dollars.is_empty() || cents.len() > 2 {
        return Err(invalid());
    }
    if !dollars.chars().all(|c| c.is_ascii_digit()) || !cents.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let dollars: i64 = dollars.parse().map_err(|_| invalid())?;
    let cents: i64 = if cents.is_empty() {
        0
    } else {
        // "5" means fifty cents, "05" five.
        let parsed: i64 = cents.parse().map_err(|_| invalid())?;
        if cents.len() == 1 { parsed * 10 } else { parsed }
    };
    dollars
        .checked_mul(100)
        .and_then(|total| total.checked_add(cents))
        .ok_or_else(invalid)
}

pub async fn create_event(db_pool: &SqlitePool, client_id: Uuid, new: NewEvent) -> AppResult<Event> {
    if !EVENT_TYPES.contains(&new.event_type.as_str()) {
        return Err(AppError::bad_request(format!(
            "unknown event type \"{}\"",
            new.event_type
        )));
    }
    let (rate_type, budget_cents) = rate_fields(new.price_type, new.price_amount.as_deref())?;

    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO events (
            id, client_id, title, event_type, description,
            location_address, location_city, location_state, location_country, zip_code,
            latitude, longitude, start_time, end_time,
            dress_code, tone, message,
            rate_type, budget_cents, currency, status, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'usd', 'open', ?)",
    )
    .bind(id.to_string())
    .bind(client_id.to_string())
    .bind(&new.title)
    .bind(&new.event_type)
    .bind(&new.description)
    .bind(&new.location_address)
    .bind(&new.location_city)
    .bind(&new.location_state)
    .bind(&new.location_country)
    .bind(&new.zip_code)
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(new.start_time)
    .bind(new.end_time)
    .bind(&new.dress_code)
    .bind(&new.tone)
    .bind(&new.message)
    .bind(rate_type)
    .bind(budget_cents)
    .bind(Utc::now())
    .execute(db_pool)
    .await?;

    let event: Event = sqlx::query_as("SELECT * FROM events WHERE id=?")
        .bind(id.to_string())
        .fetch_one(db_pool)
        .await?;
    Ok(event)
}

#[debug_handler]
pub(crate) async fn new_event(
    State(db_pool): State<SqlitePool>,
    session: Session,
    Json(new): Json<NewEvent>,
) -> AppResult<Json<Event>> {
    let client_id = require_user(&session).await?;
    Ok(Json(create_event(&db_pool, client_id, new).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::testutil::seed_user;

    #[test]
    fn budget_parsing() {
        assert_eq!(parse_budget_cents("150").unwrap(), 15000);
        assert_eq!(parse_budget_cents("$150").unwrap(), 15000);
        assert_eq!(parse_budget_cents("149.50").unwrap(), 14950);
        assert_eq!(parse_budget_cents("149.5").unwrap(), 14950);
        assert_eq!(parse_budget_cents("0.05").unwrap(), 5);
        assert!(parse_budget_cents("").is_err());
        assert!(parse_budget_cents("12.345").is_err());
        assert!(parse_budget_cents("-3").is_err());
        assert!(parse_budget_cents("abc").is_err());
    }

    #[test]
    fn absurd_amounts_are_rejected_not_wrapped() {
        // i64::MAX dollars cannot be stored as cents.
        assert!(parse_budget_cents("9223372036854775807").is_err());
        assert!(parse_budget_cents("92233720368547758.08").is_err());
    }

    #[test]
    fn price_modes_map_to_rate_fields() {
        assert_eq!(rate_fields(PriceType::Free, None).unwrap(), ("free", None));
        assert_eq!(
            rate_fields(PriceType::Negotiable, Some("20")).unwrap(),
            ("negotiable", None)
        );
        assert_eq!(
            rate_fields(PriceType::Paid, Some("150")).unwrap(),
            ("listed", Some(15000))
        );
        assert!(rate_fields(PriceType::Paid, None).is_err());
    }

    fn minimal_event(title: &str) -> NewEvent {
        NewEvent {
            title: title.to_owned(),
            event_type: "wedding".to_owned(),
            description: None,
            location_address: None,
            location_city: Some("Austin".to_owned()),
            location_state: Some("TX".to_owned()),
            location_country: None,
            zip_code: None,
            latitude: None,
            longitude: None,
            start_time: Utc::now(),
            end_time: None,
            dress_code: None,
            tone: None,
            message: None,
            price_type: PriceType::Paid,
            price_amount: Some("150".to_owned()),
        }
    }

    #[tokio::test]
    async fn paid_event_is_stored_as_listed_with_cents() {
        let pool = test_pool().await;
        let client_id = seed_user(&pool, "Cass").await;

        let event = create_event(&pool, client_id, minimal_event("Cousin's wedding"))
            .await
            .unwrap();
        assert_eq!(event.rate_type, "listed");
        assert_eq!(event.budget_cents, Some(15000));
        assert_eq!(event.status, "open");
    }

    #[tokio::test]
    async fn unknown_event_type_is_rejected() {
        let pool = test_pool().await;
        let client_id = seed_user(&pool, "Cass").await;
        let mut new = minimal_event("Mystery");
        new.event_type = "gala".to_owned();
        assert!(create_event(&pool, client_id, new).await.is_err());
    }
}

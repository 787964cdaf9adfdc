//! Stripe checkout for the verified membership subscription.
//!
//! Thin relay over the Stripe REST API: the server creates a hosted
//! checkout session and hands the URL back, nothing about the purchase is
//! persisted here. Verification state lands on the profile out of band.

use axum::{Json, Router, debug_handler, extract::State, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{AppError, AppResult, AppState, GetField, config::Config};

const STRIPE_CHECKOUT_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

pub fn functions_router() -> Router<AppState> {
    Router::new().route("/functions/create-verified-checkout", post(create_verified_checkout))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckoutBody {
    email: String,
}

/// Form body for the checkout session create call. Stripe takes
/// `application/x-www-form-urlencoded` with bracketed array keys.
fn session_form<'a>(config: &'a Config, price_id: &'a str, email: &'a str) -> Vec<(&'static str, String)> {
    vec![
        ("mode", "subscription".to_owned()),
        ("customer_email", email.to_owned()),
        ("line_items[0][price]", price_id.to_owned()),
        ("line_items[0][quantity]", "1".to_owned()),
        ("success_url", format!("{}/profile?verified=success", config.app_url)),
        ("cancel_url", format!("{}/profile", config.app_url)),
        ("allow_promotion_codes", "true".to_owned()),
    ]
}

#[debug_handler(state = AppState)]
pub(crate) async fn create_verified_checkout(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> AppResult<Json<Value>> {
    let (secret_key, price_id) = checkout_keys(&state.config)?;

    let email = body.email.trim();
    if email.is_empty() {
        return Err(AppError::bad_request("email is required"));
    }

    let response = state
        .http
        .post(STRIPE_CHECKOUT_URL)
        .bearer_auth(secret_key)
        .form(&session_form(&state.config, price_id, email))
        .send()
        .await?;

    let status = response.status();
    let payload: Value = response.json().await?;
    if !status.is_success() {
        let detail = payload
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .unwrap_or("checkout session creation failed");
        tracing::warn!(status = %status, detail, "stripe rejected the checkout session");
        return Err(AppError::with_status(
            axum::http::StatusCode::BAD_GATEWAY,
            detail.to_owned(),
        ));
    }

    let url = payload.get_str_field("url")?;
    Ok(Json(json!({ "url": url })))
}

fn checkout_keys(config: &Config) -> AppResult<(&str, &str)> {
    match (&config.stripe_secret_key, &config.stripe_verified_price_id) {
        (Some(key), Some(price)) => Ok((key, price)),
        _ => Err(AppError::with_status(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "verified checkout is not configured",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_stripe_keys_surface_as_a_server_error() {
        let config = Config::default();
        let err = checkout_keys(&config).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn session_form_targets_the_profile_return_pages() {
        let mut config = Config::default();
        config.app_url = "https://tmwy.app".to_owned();

        let form = session_form(&config, "price_123", "a@b.c");
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };
        assert_eq!(get("mode"), "subscription");
        assert_eq!(get("line_items[0][price]"), "price_123");
        assert_eq!(get("success_url"), "https://tmwy.app/profile?verified=success");
        assert_eq!(get("cancel_url"), "https://tmwy.app/profile");
    }
}

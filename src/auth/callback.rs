use axum::{
    debug_handler,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect},
};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{
    AppError, AppResult, AppState, GetField,
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL, USER_ID},
};

use super::{Clients, clients::ClientProvider, ensure_user};

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

/// Request body for the identity-toolkit exchange, which resolves a
/// provider access token into a stable subject id for either provider.
#[derive(Serialize)]
struct IdpRequest {
    post_body: String,
    request_uri: String,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[debug_handler(state = AppState)]
pub(crate) async fn callback(
    Path(provider): Path<ClientProvider>,
    Query(CallbackQuery { state, code }): Query<CallbackQuery>,
    State(db_pool): State<SqlitePool>,
    State(clients): State<Clients>,
    State(http): State<reqwest::Client>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or_else(|| AppError::bad_request("OAuth: without state"))?);
    let code =
        AuthorizationCode::new(code.ok_or_else(|| AppError::bad_request("OAuth: without code"))?);

    let Some(stored_state) = session.get::<String>(CSRF_STATE).await? else {
        return Err(AppError::bad_request("no csrf_state"));
    };
    if state.secret().as_str() != stored_state.as_str() {
        return Err(AppError::bad_request("csrf tokens don't match"));
    }
    let Some(pkce_verifier) = session.get::<String>(PKCE_VERIFIER).await? else {
        return Err(AppError::bad_request("no pkce_verifier"));
    };

    let client = clients.get_client(provider)?;
    let no_redirect = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&no_redirect)
        .await?;

    let idp_url = clients
        .firebase_idp_url
        .as_ref()
        .ok_or_else(|| AppError::bad_request("OAuth sign-in is not configured"))?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http
        .post(idp_url)
        .json(&IdpRequest {
            post_body: format!("access_token={access_token}&providerId={}", provider.id()),
            request_uri: "http://localhost/".to_owned(),
            return_idp_credential: true,
            return_secure_token: true,
        })
        .send()
        .await?
        .json()
        .await?;

    let subject = body.get_str_field("localId")?;
    let display_name = body
        .get("displayName")
        .and_then(|v| v.as_str())
        .map(str::to_owned);

    let user_id = ensure_user(&db_pool, provider, &subject, display_name).await?;
    session.insert(USER_ID, user_id).await?;

    tracing::info!(user = %user_id, provider = %provider, "signed in");

    let return_url: String = session
        .get(RETURN_URL)
        .await?
        .unwrap_or_else(|| "/".to_string());
    Ok(Redirect::to(return_url.as_str()))
}

use tower_sessions::Session;
use uuid::Uuid;

use crate::{AppError, AppResult};

pub const USER_ID: &str = "user_id";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";

/// Identity gate for every authenticated endpoint. After sign-out the
/// session is cleared, so stale calls fail here instead of reaching the
/// database with a dangling identity.
pub async fn require_user(session: &Session) -> AppResult<Uuid> {
    match session.get::<Uuid>(USER_ID).await? {
        Some(user_id) => Ok(user_id),
        None => Err(AppError::unauthorized("not signed in")),
    }
}

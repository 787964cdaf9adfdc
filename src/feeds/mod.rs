mod proxies;
mod requests;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use proxies::{ProxySummary, get_proxy_feed};
pub use requests::{RequestSort, RequestSummary, ResponseChoice, get_request_feed, respond_to_request};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/feed/proxies", get(proxies::proxy_feed))
        .route("/feed/requests", get(requests::request_feed))
        .route("/feed/requests/{event_id}/respond", post(requests::respond))
        .route("/proxies/{id}/wave", post(proxies::wave))
}

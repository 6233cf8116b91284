//! Web server module: router assembly and CORS policy.

pub mod auth;
pub mod handlers;

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use auth::{AuthUser, AuthVerifier, RestAuthVerifier};
pub use handlers::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.app_origins);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/wifi/connect", post(handlers::wifi_connect))
        .route("/api/campaigns/send", post(handlers::campaign_send))
        .route("/api/email/send", post(handlers::email_send))
        .route("/api/segment/preview", post(handlers::segment_preview))
        .route("/api/admin/bootstrap", post(handlers::admin_bootstrap))
        .route("/api/admin/invite", post(handlers::admin_invite))
        .route("/api/admin/revoke", post(handlers::admin_revoke))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS restricted to the configured app origins; wide open only when
/// none are configured (local development).
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() {
        warn!("APP_ORIGINS not set, allowing any origin");
        return layer.allow_origin(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "invalid CORS origin ignored");
                None
            }
        })
        .collect();

    layer.allow_origin(AllowOrigin::list(parsed))
}

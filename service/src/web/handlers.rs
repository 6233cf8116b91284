//! HTTP endpoint handlers.
//!
//! Thin layer over the flow modules: authenticate, validate the body,
//! delegate, shape the JSON response. All heavy lifting lives in
//! `portal`, `campaign`, and `unifi`.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::campaign::segment::{self, SegmentFilter};
use crate::campaign::send::{send_campaign, send_campaign_test, send_single, SendContext};
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::mail::Mailer;
use crate::portal::{self, ConnectFailureKind, ConnectRequest};
use crate::storage::StorageResolver;
use crate::store::Store;
use crate::unifi::UnifiClient;
use crate::web::auth::{authenticate, require_admin, AuthVerifier};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub auth: Arc<dyn AuthVerifier>,
    pub resolver: Arc<dyn StorageResolver>,
    /// `None` when provider credentials are not configured.
    pub mailer: Option<Arc<dyn Mailer>>,
    pub controller: Arc<UnifiClient>,
}

impl AppState {
    fn send_context(&self) -> SendContext<'_> {
        SendContext {
            store: self.store.as_ref(),
            mailer: self.mailer.as_deref(),
            resolver: self.resolver.as_ref(),
            config: &self.config,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Wi-Fi Connect
// =============================================================================

/// Captive-portal connect endpoint. Unauthenticated, CORS-gated.
pub async fn wifi_connect(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ConnectRequest>,
) -> Response {
    let user_agent = headers.get(USER_AGENT).and_then(|v| v.to_str().ok());
    let forwarded_for = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok());

    info!(
        has_email = request.email.is_some(),
        client_mac = ?request.client_mac,
        ssid = ?request.ssid,
        "wifi_connect_received"
    );

    match portal::handle_connect(
        state.store.as_ref(),
        &state.controller,
        &state.config,
        &request,
        user_agent,
        forwarded_for,
    )
    .await
    {
        Ok(debug) => (
            StatusCode::OK,
            Json(json!({ "success": true, "debug": debug })),
        )
            .into_response(),
        Err(failure) => match failure.kind {
            ConnectFailureKind::Validation(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ConnectFailureKind::Controller(err) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": format!("controller {} failed", err.stage),
                    "unifi_error": err.message,
                    "unifi_url": err.url,
                    "debug": failure.debug,
                })),
            )
                .into_response(),
        },
    }
}

// =============================================================================
// Campaign Send
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CampaignSendRequest {
    pub campaign_id: Uuid,
    pub mode: String,
    #[serde(default)]
    pub test_email: Option<String>,
}

/// Campaign send trigger. Bearer + admin.
pub async fn campaign_send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CampaignSendRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(
        state.auth.as_ref(),
        state.store.as_ref(),
        &state.config,
        &headers,
    )
    .await?;

    let ctx = state.send_context();
    match request.mode.as_str() {
        "send" => {
            let outcome = send_campaign(&ctx, request.campaign_id).await?;
            Ok(Json(json!({
                "ok": true,
                "sent": outcome.sent,
                "failed": outcome.failed,
                "run_id": outcome.run_id,
                "simulated": outcome.simulated,
            })))
        }
        "test" => {
            let test_email = request
                .test_email
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| {
                    ApiError::Validation("test_email is required for test mode".to_string())
                })?;
            let outcome = send_campaign_test(&ctx, request.campaign_id, test_email).await?;
            Ok(Json(json!({
                "ok": true,
                "message_id": outcome.message_id,
                "run_id": outcome.run_id,
                "simulated": outcome.simulated,
            })))
        }
        other => Err(ApiError::Validation(format!(
            "mode must be \"send\" or \"test\", got \"{other}\""
        ))),
    }
}

// =============================================================================
// Single / Test Email Send
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct EmailSendRequest {
    pub template_id: Uuid,
    pub mode: String,
    #[serde(default)]
    pub guest_id: Option<Uuid>,
    #[serde(default)]
    pub to_email: Option<String>,
    #[serde(default)]
    pub to_name: Option<String>,
    #[serde(default)]
    pub subject_override: Option<String>,
}

/// Single/test email send. Bearer + admin.
pub async fn email_send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmailSendRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(
        state.auth.as_ref(),
        state.store.as_ref(),
        &state.config,
        &headers,
    )
    .await?;

    let template = state
        .store
        .fetch_template(request.template_id)
        .await?
        .ok_or(ApiError::NotFound("template"))?;

    let explicit_email = request
        .to_email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    let (to_email, to_name) = match request.mode.as_str() {
        "test" => {
            let email = explicit_email.ok_or_else(|| {
                ApiError::Validation("to_email is required for test mode".to_string())
            })?;
            (email.to_string(), request.to_name.clone())
        }
        "single" => match request.guest_id {
            Some(guest_id) => {
                let guest = state
                    .store
                    .fetch_guest(guest_id)
                    .await?
                    .ok_or(ApiError::NotFound("guest"))?;
                let email = explicit_email
                    .map(str::to_string)
                    .unwrap_or(guest.email);
                (email, request.to_name.clone().or(guest.full_name))
            }
            None => {
                let email = explicit_email.ok_or_else(|| {
                    ApiError::Validation(
                        "guest_id or to_email is required for single mode".to_string(),
                    )
                })?;
                (email.to_string(), request.to_name.clone())
            }
        },
        other => {
            return Err(ApiError::Validation(format!(
                "mode must be \"test\" or \"single\", got \"{other}\""
            )))
        }
    };

    let ctx = state.send_context();
    let outcome = send_single(
        &ctx,
        &template,
        &to_email,
        to_name.as_deref(),
        request.subject_override.as_deref(),
        &request.mode,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "run_id": outcome.run_id,
        "to": outcome.to,
        "mode": request.mode,
        "simulated": outcome.simulated,
    })))
}

// =============================================================================
// Segment Preview
// =============================================================================

/// Audience preview for the admin console. Bearer + admin.
pub async fn segment_preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(filter): Json<SegmentFilter>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(
        state.auth.as_ref(),
        state.store.as_ref(),
        &state.config,
        &headers,
    )
    .await?;

    let contacts = state.store.fetch_contacts(filter.since(Utc::now())).await?;
    let eligible = segment::apply(contacts, &filter);
    let recipients = segment::distinct_recipients(eligible);

    let sample: Vec<serde_json::Value> = recipients
        .iter()
        .take(10)
        .map(|c| {
            json!({
                "email": c.email,
                "name": c.full_name,
            })
        })
        .collect();

    Ok(Json(json!({
        "eligible": recipients.len(),
        "sample": sample,
    })))
}

// =============================================================================
// Admin Management
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AdminEmailRequest {
    pub email: String,
}

/// First-admin bootstrap: succeeds only while the admin table is empty.
pub async fn admin_bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user = authenticate(state.auth.as_ref(), &headers).await?;
    let email = user
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Auth("token carries no email".to_string()))?;

    if state.store.admin_count().await? > 0 {
        return Err(ApiError::Forbidden(
            "an admin already exists; ask them for an invite".to_string(),
        ));
    }

    state.store.upsert_admin(&email).await?;
    info!(email = %email, "admin_bootstrapped");

    Ok(Json(json!({ "ok": true, "email": email })))
}

/// Invite another admin. Bearer + admin.
pub async fn admin_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdminEmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_admin(
        state.auth.as_ref(),
        state.store.as_ref(),
        &state.config,
        &headers,
    )
    .await?;

    let email = request.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::Validation(
            "email must be a valid address".to_string(),
        ));
    }

    state.store.upsert_admin(&email).await?;
    info!(email = %email, "admin_invited");

    Ok(Json(json!({ "ok": true, "email": email })))
}

/// Revoke an admin. Bearer + admin; self-revocation is rejected.
pub async fn admin_revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdminEmailRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let caller = require_admin(
        state.auth.as_ref(),
        state.store.as_ref(),
        &state.config,
        &headers,
    )
    .await?;

    let email = request.email.trim().to_lowercase();
    let caller_email = caller
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if email == caller_email {
        return Err(ApiError::Validation(
            "cannot revoke your own admin access".to_string(),
        ));
    }

    if !state.store.revoke_admin(&email).await? {
        return Err(ApiError::NotFound("admin"));
    }
    info!(email = %email, "admin_revoked");

    Ok(Json(json!({ "ok": true, "email": email })))
}

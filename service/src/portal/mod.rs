//! Captive-portal connect flow.
//!
//! Turns a splash-page submission into durable contact/guest/connection
//! records and actual network access for the submitting device. The
//! priority is authorizing the guest's network access: each persistence
//! step is independent and best-effort: a failed write is logged and
//! recorded in the debug payload, never a reason to deny access.

pub mod device;
pub mod mac;

use chrono::{DateTime, Datelike, Local, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::store::{ContactSubmissionRow, GuestConnectionRow, GuestPatch, NewGuest, Store};
use crate::unifi::{ControllerError, UnifiClient};

/// Splash-page POST body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub marketing_opt_in: Option<bool>,
    #[serde(default)]
    pub client_mac: Option<String>,
    #[serde(default)]
    pub ap_mac: Option<String>,
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default)]
    pub unifi_site: Option<String>,
    #[serde(default)]
    pub unifi_ap: Option<String>,
    /// Client identifier the controller passed to the splash page.
    #[serde(default)]
    pub unifi_id: Option<String>,
    #[serde(default)]
    pub unifi_t: Option<String>,
}

/// Which steps of the flow succeeded, reported back to the splash page
/// for operational diagnosis.
#[derive(Debug, Default, Serialize)]
pub struct ConnectDebug {
    pub submission_saved: bool,
    pub guest_id: Option<Uuid>,
    pub connection_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub persistence_errors: Vec<String>,
}

/// A short-circuit exit from the flow.
#[derive(Debug)]
pub struct ConnectFailure {
    pub kind: ConnectFailureKind,
    pub debug: ConnectDebug,
}

#[derive(Debug)]
pub enum ConnectFailureKind {
    /// Bad submission: rejected before any persistence or network call.
    Validation(String),
    /// The controller sequence failed; carries stage and attempted URL.
    Controller(ControllerError),
}

/// Run the full connect flow: validate, persist best-effort, then drive
/// the controller through login → verify → authorize.
pub async fn handle_connect(
    store: &dyn Store,
    controller: &UnifiClient,
    config: &Config,
    request: &ConnectRequest,
    user_agent: Option<&str>,
    forwarded_for: Option<&str>,
) -> Result<ConnectDebug, ConnectFailure> {
    let (site, auth_mac) = match validate(request, config) {
        Ok(validated) => validated,
        Err(message) => {
            return Err(ConnectFailure {
                kind: ConnectFailureKind::Validation(message),
                debug: ConnectDebug::default(),
            })
        }
    };

    let mut connect_debug = persist_submission(store, request, user_agent, forwarded_for, Utc::now())
        .await;

    info!(
        mac = %auth_mac,
        site = %site,
        submission_saved = connect_debug.submission_saved,
        guest_id = ?connect_debug.guest_id,
        "wifi_connect_persisted"
    );

    let session = match controller.login().await {
        Ok(session) => session,
        Err(err) => return Err(controller_failure(err, connect_debug)),
    };
    connect_debug.login_endpoint = Some(session.login_url.clone());

    if let Err(err) = controller.verify_session(&session).await {
        return Err(controller_failure(err, connect_debug));
    }

    if let Err(err) = controller.authorize_guest(&session, &site, &auth_mac).await {
        return Err(controller_failure(err, connect_debug));
    }

    info!(mac = %auth_mac, site = %site, "wifi_connect_authorized");
    Ok(connect_debug)
}

fn controller_failure(err: ControllerError, debug: ConnectDebug) -> ConnectFailure {
    ConnectFailure {
        kind: ConnectFailureKind::Controller(err),
        debug,
    }
}

/// Check the submission before any persistence or network call.
///
/// Returns the resolved controller site and the MAC to authorize: the
/// controller-supplied client id when it looks like a MAC, otherwise the
/// submitted `client_mac`.
pub fn validate(request: &ConnectRequest, config: &Config) -> Result<(String, String), String> {
    let client_mac = request
        .client_mac
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| "client_mac is required".to_string())?;

    if !mac::is_valid_mac(client_mac) {
        return Err(format!("client_mac is not a valid MAC address: {client_mac}"));
    }

    let site = request
        .unifi_site
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| config.unifi_site.clone())
        .ok_or_else(|| "no controller site configured".to_string())?;

    let auth_mac = request
        .unifi_id
        .as_deref()
        .filter(|id| mac::is_valid_mac(id))
        .unwrap_or(client_mac);

    Ok((site, mac::normalize_mac(auth_mac)))
}

/// Best-effort persistence: submission row, guest upsert, connection
/// event. Each step records its own outcome and never aborts the rest.
pub async fn persist_submission(
    store: &dyn Store,
    request: &ConnectRequest,
    user_agent: Option<&str>,
    forwarded_for: Option<&str>,
    now: DateTime<Utc>,
) -> ConnectDebug {
    let mut debug = ConnectDebug::default();
    let classified = device::classify_user_agent(user_agent);

    let submission = ContactSubmissionRow {
        full_name: non_empty(request.name.as_deref()),
        email: non_empty(request.email.as_deref()),
        mobile: non_empty(request.mobile.as_deref()),
        marketing_opt_in: request.marketing_opt_in.unwrap_or(false),
        client_mac: request
            .client_mac
            .as_deref()
            .map(mac::normalize_mac)
            .unwrap_or_default(),
        ap_mac: non_empty(request.ap_mac.as_deref()),
        ssid: non_empty(request.ssid.as_deref()),
        device_type: classified.device_type.to_string(),
        os_family: classified.os_family.to_string(),
        ip_address: client_ip(forwarded_for),
        user_agent: non_empty(user_agent),
        created_at: now,
    };

    match store.insert_submission(&submission).await {
        Ok(()) => debug.submission_saved = true,
        Err(err) => {
            warn!(error = %err, "submission_write_failed");
            debug.persistence_errors.push(format!("submission: {err}"));
        }
    }

    if let Some(email) = non_empty(request.email.as_deref()) {
        let normalized = email.trim().to_lowercase();
        match upsert_guest(store, &normalized, request).await {
            Ok(guest_id) => debug.guest_id = Some(guest_id),
            Err(err) => {
                warn!(error = %err, "guest_upsert_failed");
                debug.persistence_errors.push(format!("guest: {err}"));
            }
        }
    }

    if let Some(guest_id) = debug.guest_id {
        let local = now.with_timezone(&Local);
        let connection = GuestConnectionRow {
            guest_id,
            connected_at: now,
            device_type: classified.device_type.to_string(),
            os_family: classified.os_family.to_string(),
            user_agent: non_empty(user_agent),
            weekday: local.weekday().num_days_from_sunday() as u8,
            hour: local.hour() as u8,
        };
        match store.insert_connection(&connection).await {
            Ok(()) => debug.connection_saved = true,
            Err(err) => {
                warn!(error = %err, "connection_write_failed");
                debug.persistence_errors.push(format!("connection: {err}"));
            }
        }
    }

    debug
}

/// Look up the guest by normalized email; update non-destructively when
/// found, insert otherwise. Never creates a second row for one email.
async fn upsert_guest(
    store: &dyn Store,
    normalized_email: &str,
    request: &ConnectRequest,
) -> Result<Uuid, crate::store::StoreError> {
    let name = non_empty(request.name.as_deref());
    let mobile = non_empty(request.mobile.as_deref());

    match store.find_guest_by_email(normalized_email).await? {
        Some(existing) => {
            let patch = GuestPatch {
                full_name: name,
                mobile,
            };
            if !patch.is_empty() {
                store.update_guest(existing.id, &patch).await?;
            }
            Ok(existing.id)
        }
        None => {
            let guest = store
                .insert_guest(&NewGuest {
                    email: normalized_email.to_string(),
                    full_name: name,
                    mobile,
                })
                .await?;
            Ok(guest.id)
        }
    }
}

/// Requesting IP: first value of an `X-Forwarded-For`-style header.
pub fn client_ip(forwarded_for: Option<&str>) -> Option<String> {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

//! Wireless controller client.
//!
//! Drives the controller's management API through the three-step sequence
//! the captive portal needs: login (with a legacy-endpoint fallback),
//! session verification, and guest authorization. Each step independently
//! catches transport and timeout errors and rewraps them with the
//! attempted URL attached, so a failure always says which outbound call
//! broke and at which stage.

use std::fmt;
use std::time::Duration;

use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::{info, warn};

/// Fixed guest lease length.
pub const GUEST_LEASE_MINUTES: u32 = 480;

/// Which step of the controller sequence failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerStage {
    Login,
    Verify,
    Authorize,
}

impl fmt::Display for ControllerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerStage::Login => write!(f, "login"),
            ControllerStage::Verify => write!(f, "verify"),
            ControllerStage::Authorize => write!(f, "authorize"),
        }
    }
}

/// A controller failure: stage, attempted URL, and what went wrong.
#[derive(Debug, Clone, thiserror::Error)]
#[error("controller {stage} failed at {url}: {message}")]
pub struct ControllerError {
    pub stage: ControllerStage,
    pub url: String,
    pub message: String,
}

/// An authenticated controller session. Ephemeral: one login cookie is
/// used for exactly one verify and one authorize call, then discarded.
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub cookie: String,
    /// Which login endpoint actually produced the session.
    pub login_url: String,
}

/// HTTP client for a single controller deployment.
pub struct UnifiClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    timeout: Duration,
}

impl UnifiClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Log in, preferring the current endpoint and falling back once to
    /// the legacy path. Success requires an HTTP success status AND a
    /// session cookie; a cookie-less success is itself a failure.
    pub async fn login(&self) -> Result<LoginSession, ControllerError> {
        let payload = json!({
            "username": self.username,
            "password": self.password,
        });

        let primary = self.url("/api/auth/login");
        match self.try_login(&primary, &payload).await {
            Ok(cookie) => {
                info!(url = %primary, "controller_login_ok");
                return Ok(LoginSession {
                    cookie,
                    login_url: primary,
                });
            }
            Err(err) => {
                warn!(url = %primary, error = %err, "controller_login_retrying_legacy");
            }
        }

        let legacy = self.url("/api/login");
        let cookie = self.try_login(&legacy, &payload).await?;
        info!(url = %legacy, "controller_login_ok");
        Ok(LoginSession {
            cookie,
            login_url: legacy,
        })
    }

    async fn try_login(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, ControllerError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport(ControllerStage::Login, url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ControllerError {
                stage: ControllerStage::Login,
                url: url.to_string(),
                message: format!("login rejected with status {}", status.as_u16()),
            });
        }

        extract_session_cookie(response.headers()).ok_or_else(|| ControllerError {
            stage: ControllerStage::Login,
            url: url.to_string(),
            message: "no session cookie".to_string(),
        })
    }

    /// Confirm the session actually works by listing sites.
    ///
    /// Distinguished from a login failure so callers can tell proxy or
    /// cookie issues from credential issues.
    pub async fn verify_session(&self, session: &LoginSession) -> Result<(), ControllerError> {
        let url = self.url("/api/self/sites");
        let response = self
            .http
            .get(&url)
            .header(COOKIE, &session.cookie)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport(ControllerStage::Verify, &url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport(ControllerStage::Verify, &url, e))?;

        if !session_established(status, &body) {
            return Err(ControllerError {
                stage: ControllerStage::Verify,
                url,
                message: format!("session not established (status {})", status.as_u16()),
            });
        }

        Ok(())
    }

    /// Authorize a client MAC for network access on the given site.
    pub async fn authorize_guest(
        &self,
        session: &LoginSession,
        site: &str,
        mac: &str,
    ) -> Result<(), ControllerError> {
        let url = self.url(&format!("/api/s/{site}/cmd/stamgr"));
        let payload = json!({
            "cmd": "authorize-guest",
            "mac": mac,
            "minutes": GUEST_LEASE_MINUTES,
        });

        let response = self
            .http
            .post(&url)
            .header(COOKIE, &session.cookie)
            .json(&payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport(ControllerStage::Authorize, &url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport(ControllerStage::Authorize, &url, e))?;

        authorize_outcome(status, &body).map_err(|message| ControllerError {
            stage: ControllerStage::Authorize,
            url,
            message,
        })?;

        info!(site = site, mac = mac, "controller_guest_authorized");
        Ok(())
    }

    fn transport(&self, stage: ControllerStage, url: &str, err: reqwest::Error) -> ControllerError {
        let message = if err.is_timeout() {
            format!("timed out after {}ms", self.timeout.as_millis())
        } else {
            err.to_string()
        };
        ControllerError {
            stage,
            url: url.to_string(),
            message,
        }
    }
}

/// Concatenate session cookies from `Set-Cookie` headers.
///
/// Each header instance contributes its first `name=value` pair; cookie
/// attributes are dropped and duplicate names keep the first occurrence.
fn extract_session_cookie(headers: &HeaderMap) -> Option<String> {
    let mut seen_names: Vec<String> = Vec::new();
    let mut pairs: Vec<String> = Vec::new();

    for value in headers.get_all(SET_COOKIE) {
        let Ok(raw) = value.to_str() else { continue };
        let pair = raw.split(';').next().unwrap_or("").trim();
        if pair.is_empty() || !pair.contains('=') {
            continue;
        }
        let name = pair.split('=').next().unwrap_or_default().to_string();
        if seen_names.contains(&name) {
            continue;
        }
        seen_names.push(name);
        pairs.push(pair.to_string());
    }

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

/// A verify response proves the session only when the status is exactly
/// 200 and the body does not contain the controller's `LoginRequired`
/// marker.
fn session_established(status: StatusCode, body: &str) -> bool {
    status == StatusCode::OK && !body.contains("LoginRequired")
}

/// Interpret an authorize response. Success requires an HTTP success
/// status AND `meta.rc == "ok"` in the decoded body; anything else,
/// including a body that is not JSON, is a failure.
fn authorize_outcome(status: StatusCode, body: &str) -> Result<(), String> {
    if !status.is_success() {
        return Err(format!(
            "authorize rejected with status {}",
            status.as_u16()
        ));
    }

    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| format!("authorize response not JSON: {e}"))?;

    match parsed.pointer("/meta/rc").and_then(|v| v.as_str()) {
        Some("ok") => Ok(()),
        Some(rc) => {
            let msg = parsed
                .pointer("/meta/msg")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            if msg.is_empty() {
                Err(format!("controller returned rc={rc}"))
            } else {
                Err(format!("controller returned rc={rc}: {msg}"))
            }
        }
        None => Err("authorize response missing meta.rc".to_string()),
    }
}

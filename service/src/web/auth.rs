//! Bearer authentication and the admin gate.
//!
//! Tokens are minted by the hosted auth service, never by us: the caller's
//! bearer token is forwarded to that service, which returns the caller
//! identity. Admin status then comes from the `admin_users` table, with
//! the environment allow-list consulted only as a fallback.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::config::Config;
use crate::error::ApiError;
use crate::store::Store;

/// The authenticated caller as reported by the auth service.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Hosted-auth collaborator seam.
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// Resolve a bearer token to a caller identity. The error string is
    /// safe to surface in a 401 body.
    async fn verify(&self, bearer_token: &str) -> Result<AuthUser, String>;
}

/// Verifier backed by the hosted auth service's user endpoint.
pub struct RestAuthVerifier {
    http: Client,
    base_url: String,
    api_key: String,
}

impl RestAuthVerifier {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl AuthVerifier for RestAuthVerifier {
    async fn verify(&self, bearer_token: &str) -> Result<AuthUser, String> {
        let url = format!("{}/user", self.base_url.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "auth_service_unreachable");
                "auth service unreachable".to_string()
            })?;

        if !response.status().is_success() {
            return Err("invalid or expired token".to_string());
        }

        response
            .json::<AuthUser>()
            .await
            .map_err(|_| "auth service response not understood".to_string())
    }
}

/// Pull the bearer token out of the Authorization header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticate the caller or fail with a 401.
pub async fn authenticate(
    auth: &dyn AuthVerifier,
    headers: &HeaderMap,
) -> Result<AuthUser, ApiError> {
    let token =
        bearer_token(headers).ok_or_else(|| ApiError::Auth("missing bearer token".to_string()))?;
    auth.verify(token).await.map_err(ApiError::Auth)
}

/// Authenticate and require an unrevoked admin.
///
/// A revoked table row always wins; the allow-list only rescues callers
/// the table does not know about (or when the table read fails).
pub async fn require_admin(
    auth: &dyn AuthVerifier,
    store: &dyn Store,
    config: &Config,
    headers: &HeaderMap,
) -> Result<AuthUser, ApiError> {
    let user = authenticate(auth, headers).await?;
    let email = user
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Auth("token carries no email".to_string()))?;

    match store.find_admin(&email).await {
        Ok(Some(record)) if !record.revoked => return Ok(user),
        Ok(Some(_)) => {
            return Err(ApiError::Forbidden("admin access revoked".to_string()));
        }
        Ok(None) => {}
        Err(err) => {
            warn!(error = %err, "admin_table_read_failed_checking_allow_list");
        }
    }

    if config.admin_emails.contains(&email) {
        Ok(user)
    } else {
        Err(ApiError::Forbidden("caller is not an admin".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::AdminRecord;
    use axum::http::HeaderValue;

    struct StubVerifier {
        email: Option<&'static str>,
    }

    #[async_trait]
    impl AuthVerifier for StubVerifier {
        async fn verify(&self, bearer_token: &str) -> Result<AuthUser, String> {
            if bearer_token == "good" {
                Ok(AuthUser {
                    id: "user-1".to_string(),
                    email: self.email.map(str::to_string),
                })
            } else {
                Err("invalid or expired token".to_string())
            }
        }
    }

    fn headers(token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
            );
        }
        headers
    }

    fn config_with_allow_list(emails: &[&str]) -> Config {
        let mut config = Config::from_env();
        config.admin_emails = emails.iter().map(|e| e.to_string()).collect();
        config
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers(Some("abc"))), Some("abc"));
        assert_eq!(bearer_token(&headers(None)), None);

        let mut raw = HeaderMap::new();
        raw.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&raw), None);
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let store = MemoryStore::new();
        let config = config_with_allow_list(&[]);
        let verifier = StubVerifier {
            email: Some("a@x.com"),
        };
        let err = require_admin(&verifier, &store, &config, &headers(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Auth(_)));
    }

    #[tokio::test]
    async fn test_admin_table_row_grants_access() {
        let store = MemoryStore::new();
        store.admins.lock().unwrap().push(AdminRecord {
            email: "a@x.com".to_string(),
            revoked: false,
        });
        let config = config_with_allow_list(&[]);
        let verifier = StubVerifier {
            email: Some("A@X.com"),
        };
        assert!(
            require_admin(&verifier, &store, &config, &headers(Some("good")))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_revoked_admin_is_forbidden_even_on_allow_list() {
        let store = MemoryStore::new();
        store.admins.lock().unwrap().push(AdminRecord {
            email: "a@x.com".to_string(),
            revoked: true,
        });
        let config = config_with_allow_list(&["a@x.com"]);
        let verifier = StubVerifier {
            email: Some("a@x.com"),
        };
        let err = require_admin(&verifier, &store, &config, &headers(Some("good")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_allow_list_fallback() {
        let store = MemoryStore::new();
        let config = config_with_allow_list(&["a@x.com"]);
        let verifier = StubVerifier {
            email: Some("a@x.com"),
        };
        assert!(
            require_admin(&verifier, &store, &config, &headers(Some("good")))
                .await
                .is_ok()
        );

        let stranger = StubVerifier {
            email: Some("b@x.com"),
        };
        let err = require_admin(&stranger, &store, &config, &headers(Some("good")))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
    }
}

//! Configuration module for environment variable parsing.
//!
//! All configuration is read once at startup and shared read-only through
//! application state; nothing in the request path touches the environment.

use std::env;

use tracing::warn;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Allowed origins for the captive-portal CORS policy
    pub app_origins: Vec<String>,

    /// Relational-store REST base URL
    pub store_url: String,

    /// Service key for the relational store
    pub store_service_key: String,

    /// Hosted auth service base URL (defaults to the store's auth path)
    pub auth_url: String,

    /// Public object-storage base URL
    pub storage_public_base: String,

    /// Bucket holding template and branding images
    pub storage_bucket: String,

    /// Email provider API key; absent means sends are simulated
    pub mailgun_api_key: Option<String>,

    /// Email provider sending domain
    pub mailgun_domain: Option<String>,

    /// Email provider API base URL
    pub mailgun_base_url: String,

    /// Default sender identity
    pub sender_name: String,
    pub sender_email: String,

    /// Wireless controller base URL
    pub unifi_base_url: String,

    /// Wireless controller credentials
    pub unifi_username: String,
    pub unifi_password: String,

    /// Default controller site when the submission carries none
    pub unifi_site: Option<String>,

    /// Controller request timeout in milliseconds
    pub unifi_timeout_ms: u64,

    /// Admin email allow-list (fallback when the admin table has no row)
    pub admin_emails: Vec<String>,

    /// Branding defaults injected as merge variables
    pub venue_name: String,
    pub venue_address: String,

    /// Social links injected as merge variables when set
    pub facebook_url: Option<String>,
    pub instagram_url: Option<String>,
    pub twitter_url: Option<String>,
    pub website_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let store_url =
            env::var("STORE_URL").unwrap_or_else(|_| "http://localhost:54321".to_string());

        let auth_url = env::var("AUTH_URL")
            .unwrap_or_else(|_| format!("{}/auth/v1", store_url.trim_end_matches('/')));

        Config {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8080),

            app_origins: parse_csv("APP_ORIGINS").unwrap_or_default(),

            store_service_key: env::var("STORE_SERVICE_KEY").unwrap_or_else(|_| {
                warn!("STORE_SERVICE_KEY not set, store calls will be rejected upstream");
                String::new()
            }),

            storage_public_base: env::var("STORAGE_PUBLIC_BASE")
                .unwrap_or_else(|_| store_url.clone()),

            storage_bucket: env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "email-assets".to_string()),

            mailgun_api_key: env::var("MAILGUN_API_KEY").ok().filter(|v| !v.is_empty()),

            mailgun_domain: env::var("MAILGUN_DOMAIN").ok().filter(|v| !v.is_empty()),

            mailgun_base_url: env::var("MAILGUN_BASE_URL")
                .unwrap_or_else(|_| "https://api.mailgun.net".to_string()),

            sender_name: env::var("SENDER_NAME").unwrap_or_else(|_| "Guest Wi-Fi".to_string()),

            sender_email: env::var("SENDER_EMAIL")
                .unwrap_or_else(|_| "no-reply@localhost".to_string()),

            unifi_base_url: env::var("UNIFI_BASE_URL")
                .unwrap_or_else(|_| "https://localhost:8443".to_string()),

            unifi_username: env::var("UNIFI_USERNAME").unwrap_or_default(),

            unifi_password: env::var("UNIFI_PASSWORD").unwrap_or_default(),

            unifi_site: env::var("UNIFI_SITE").ok().filter(|v| !v.is_empty()),

            unifi_timeout_ms: env::var("UNIFI_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),

            admin_emails: parse_csv("ADMIN_EMAILS")
                .map(|list| list.into_iter().map(|e| e.to_lowercase()).collect())
                .unwrap_or_default(),

            venue_name: env::var("VENUE_NAME").unwrap_or_default(),
            venue_address: env::var("VENUE_ADDRESS").unwrap_or_default(),

            facebook_url: env::var("FACEBOOK_URL").ok().filter(|v| !v.is_empty()),
            instagram_url: env::var("INSTAGRAM_URL").ok().filter(|v| !v.is_empty()),
            twitter_url: env::var("TWITTER_URL").ok().filter(|v| !v.is_empty()),
            website_url: env::var("WEBSITE_URL").ok().filter(|v| !v.is_empty()),

            store_url,
            auth_url,
        }
    }

    /// Whether real provider sends are possible, or only simulated ones.
    pub fn mail_configured(&self) -> bool {
        self.mailgun_api_key.is_some() && self.mailgun_domain.is_some()
    }
}

/// Parse a comma-separated list of strings.
fn parse_csv(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv() {
        env::set_var("TEST_GW_CSV", "a@x.com, b@x.com ,, ");
        let result = parse_csv("TEST_GW_CSV");
        assert_eq!(
            result,
            Some(vec!["a@x.com".to_string(), "b@x.com".to_string()])
        );
        env::remove_var("TEST_GW_CSV");
    }

    #[test]
    fn test_parse_csv_missing() {
        assert_eq!(parse_csv("TEST_GW_CSV_MISSING"), None);
    }

    #[test]
    fn test_mail_configured_requires_both() {
        let mut config = Config::from_env();
        config.mailgun_api_key = Some("key".to_string());
        config.mailgun_domain = None;
        assert!(!config.mail_configured());
        config.mailgun_domain = Some("mg.example.com".to_string());
        assert!(config.mail_configured());
    }
}

//! REST implementation of the [`Store`] trait.
//!
//! The hosted store exposes PostgREST conventions: tables under
//! `/rest/v1/<table>`, horizontal filters as `column=op.value` query
//! pairs, inserts returning the written row when asked via a `Prefer`
//! header. Every call authenticates with the deployment's service key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use super::{
    AdminRecord, Branding, Campaign, CampaignRunRow, CampaignSendRow, CampaignStatus, Contact,
    ContactSubmissionRow, Guest, GuestConnectionRow, GuestPatch, NewGuest, Store, StoreError,
    Template,
};

/// PostgREST-style store client.
pub struct RestStore {
    http: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            service_key: service_key.into(),
        }
    }

    fn endpoint(&self, table: &str, query: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if query.is_empty() {
            format!("{base}/rest/v1/{table}")
        } else {
            format!("{base}/rest/v1/{table}?{query}")
        }
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
        prefer: Option<&str>,
    ) -> Result<(StatusCode, String), StoreError> {
        let mut request = self
            .http
            .request(method, url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key);

        if let Some(prefer) = prefer {
            request = request.header("Prefer", prefer);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| StoreError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| StoreError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        debug!(url = url, status = status.as_u16(), "store_request_complete");

        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                url: url.to_string(),
                body: text,
            });
        }

        Ok((status, text))
    }

    async fn fetch_rows<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>, StoreError> {
        let (_, body) = self.request(Method::GET, url, None, None).await?;
        decode(url, &body)
    }

    async fn insert(
        &self,
        table: &str,
        row: serde_json::Value,
        prefer: Option<&str>,
    ) -> Result<String, StoreError> {
        let url = self.endpoint(table, "");
        let (_, body) = self.request(Method::POST, &url, Some(row), prefer).await?;
        Ok(body)
    }
}

fn decode<T: DeserializeOwned>(url: &str, body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn to_value<T: serde::Serialize>(url: &str, value: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value).map_err(|e| StoreError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

/// Percent-encode a filter value for a PostgREST query pair.
///
/// Matters for emails: a literal `+` in a query string would otherwise
/// decode as a space on the server side.
fn encode_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[async_trait]
impl Store for RestStore {
    async fn insert_submission(&self, row: &ContactSubmissionRow) -> Result<(), StoreError> {
        let url = self.endpoint("contact_submissions", "");
        self.insert("contact_submissions", to_value(&url, row)?, None)
            .await?;
        Ok(())
    }

    async fn find_guest_by_email(
        &self,
        normalized_email: &str,
    ) -> Result<Option<Guest>, StoreError> {
        let url = self.endpoint(
            "guests",
            &format!("email=eq.{}&limit=1", encode_value(normalized_email)),
        );
        let rows: Vec<Guest> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_guest(&self, guest: &NewGuest) -> Result<Guest, StoreError> {
        let url = self.endpoint("guests", "");
        let body = self
            .insert(
                "guests",
                to_value(&url, guest)?,
                Some("return=representation"),
            )
            .await?;
        let rows: Vec<Guest> = decode(&url, &body)?;
        rows.into_iter().next().ok_or_else(|| StoreError::Decode {
            url,
            message: "insert returned no representation".to_string(),
        })
    }

    async fn update_guest(&self, id: Uuid, patch: &GuestPatch) -> Result<(), StoreError> {
        let url = self.endpoint("guests", &format!("id=eq.{id}"));
        self.request(Method::PATCH, &url, Some(to_value(&url, patch)?), None)
            .await?;
        Ok(())
    }

    async fn fetch_guest(&self, id: Uuid) -> Result<Option<Guest>, StoreError> {
        let url = self.endpoint("guests", &format!("id=eq.{id}&limit=1"));
        let rows: Vec<Guest> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_connection(&self, row: &GuestConnectionRow) -> Result<(), StoreError> {
        let url = self.endpoint("guest_connections", "");
        self.insert("guest_connections", to_value(&url, row)?, None)
            .await?;
        Ok(())
    }

    async fn fetch_template(&self, id: Uuid) -> Result<Option<Template>, StoreError> {
        let url = self.endpoint("templates", &format!("id=eq.{id}&limit=1"));
        let rows: Vec<Template> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_branding(&self) -> Result<Branding, StoreError> {
        let url = self.endpoint("branding_settings", "limit=1");
        let rows: Vec<Branding> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn fetch_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        let url = self.endpoint("campaigns", &format!("id=eq.{id}&limit=1"));
        let rows: Vec<Campaign> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let url = self.endpoint("campaigns", &format!("id=eq.{id}"));
        let body = serde_json::json!({ "status": status });
        self.request(Method::PATCH, &url, Some(body), None).await?;
        Ok(())
    }

    async fn fetch_contacts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Contact>, StoreError> {
        let query = match since {
            Some(since) => format!(
                "select=email,mobile,full_name,tags,last_seen_at&last_seen_at=gte.{}",
                encode_value(&since.to_rfc3339())
            ),
            None => "select=email,mobile,full_name,tags,last_seen_at".to_string(),
        };
        let url = self.endpoint("contacts", &query);
        self.fetch_rows(&url).await
    }

    async fn insert_run(&self, run: &CampaignRunRow) -> Result<(), StoreError> {
        let url = self.endpoint("campaign_runs", "");
        self.insert("campaign_runs", to_value(&url, run)?, None)
            .await?;
        Ok(())
    }

    async fn insert_send(&self, send: &CampaignSendRow) -> Result<(), StoreError> {
        let url = self.endpoint("campaign_sends", "");
        self.insert("campaign_sends", to_value(&url, send)?, None)
            .await?;
        Ok(())
    }

    async fn admin_count(&self) -> Result<u64, StoreError> {
        let url = self.endpoint("admin_users", "select=email,revoked&revoked=eq.false");
        let rows: Vec<AdminRecord> = self.fetch_rows(&url).await?;
        Ok(rows.len() as u64)
    }

    async fn find_admin(&self, email: &str) -> Result<Option<AdminRecord>, StoreError> {
        let url = self.endpoint(
            "admin_users",
            &format!("email=eq.{}&limit=1", encode_value(email)),
        );
        let rows: Vec<AdminRecord> = self.fetch_rows(&url).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert_admin(&self, email: &str) -> Result<(), StoreError> {
        let body = serde_json::json!({ "email": email, "revoked": false });
        self.insert("admin_users", body, Some("resolution=merge-duplicates"))
            .await?;
        Ok(())
    }

    async fn revoke_admin(&self, email: &str) -> Result<bool, StoreError> {
        let url = self.endpoint(
            "admin_users",
            &format!("email=eq.{}", encode_value(email)),
        );
        let body = serde_json::json!({ "revoked": true });
        let (_, text) = self
            .request(
                Method::PATCH,
                &url,
                Some(body),
                Some("return=representation"),
            )
            .await?;
        let rows: Vec<AdminRecord> = decode(&url, &text)?;
        Ok(!rows.is_empty())
    }
}

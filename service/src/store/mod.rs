//! Relational-store collaborator.
//!
//! All durable entities are owned by the hosted relational store; this
//! module defines the rows the service reads and writes plus the [`Store`]
//! trait the rest of the crate depends on. The production implementation
//! ([`rest::RestStore`]) speaks the store's REST surface; tests swap in an
//! in-memory implementation.

pub mod rest;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::campaign::segment::SegmentFilter;

/// Errors from the relational-store collaborator.
///
/// Best-effort call sites log these and continue; everything else maps
/// to a 500-class response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed at {url}: {message}")]
    Transport { url: String, message: String },

    #[error("store returned {status} at {url}: {body}")]
    Rejected {
        status: u16,
        url: String,
        body: String,
    },

    #[error("unexpected store response at {url}: {message}")]
    Decode { url: String, message: String },
}

// =============================================================================
// Rows
// =============================================================================

/// A stored email template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub subject: String,
    pub body_html: String,
    #[serde(default)]
    pub body_text: Option<String>,
    #[serde(default)]
    pub hero_image_path: Option<String>,
    #[serde(default)]
    pub footer_image_path: Option<String>,
    #[serde(default)]
    pub inline_images: Vec<InlineImage>,
}

/// Catalog entry for an image uploaded into a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineImage {
    pub path: String,
    #[serde(default)]
    pub alt: Option<String>,
    #[serde(default)]
    pub sort: Option<i32>,
}

/// Deployment-wide branding defaults, one row per deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Branding {
    #[serde(default)]
    pub logo_path: Option<String>,
    #[serde(default)]
    pub default_hero_path: Option<String>,
    #[serde(default)]
    pub footer_banner_path: Option<String>,
}

/// A guest identity, keyed by normalized (lower-cased) email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guest {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
}

/// Fields for a new guest row.
#[derive(Debug, Clone, Serialize)]
pub struct NewGuest {
    pub email: String,
    pub full_name: Option<String>,
    pub mobile: Option<String>,
}

/// Non-destructive guest update: only fields with a non-empty new value
/// are written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GuestPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
}

impl GuestPatch {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.mobile.is_none()
    }
}

/// Raw captive-portal submission row, one per splash-page POST.
#[derive(Debug, Clone, Serialize)]
pub struct ContactSubmissionRow {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub marketing_opt_in: bool,
    pub client_mac: String,
    pub ap_mac: Option<String>,
    pub ssid: Option<String>,
    pub device_type: String,
    pub os_family: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One guest connection event.
#[derive(Debug, Clone, Serialize)]
pub struct GuestConnectionRow {
    pub guest_id: Uuid,
    pub connected_at: DateTime<Utc>,
    pub device_type: String,
    pub os_family: String,
    pub user_agent: Option<String>,
    /// 0–6, Sunday = 0, local to the serving process.
    pub weekday: u8,
    /// 0–23, local to the serving process.
    pub hour: u8,
}

/// A contact row as seen by segmentation: submission-level, so a repeat
/// visitor appears once per visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Campaign lifecycle: `draft`/`scheduled` → `sending` → `sent` | `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

/// A stored campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub template_id: Uuid,
    pub status: CampaignStatus,
    #[serde(default)]
    pub subject_override: Option<String>,
    #[serde(default)]
    pub segment: SegmentFilter,
}

/// Terminal outcome of one recipient attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
}

/// Per-recipient send record.
#[derive(Debug, Clone, Serialize)]
pub struct CampaignSendRow {
    pub run_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub recipient_email: String,
    pub status: SendStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

/// Aggregate record of one campaign run (bulk, test, or single).
#[derive(Debug, Clone, Serialize)]
pub struct CampaignRunRow {
    pub id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub mode: String,
    pub sent: u32,
    pub failed: u32,
    pub simulated: bool,
    pub created_at: DateTime<Utc>,
}

/// Row in the admin-role table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminRecord {
    pub email: String,
    #[serde(default)]
    pub revoked: bool,
}

// =============================================================================
// Trait
// =============================================================================

/// The relational-store collaborator interface.
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_submission(&self, row: &ContactSubmissionRow) -> Result<(), StoreError>;

    async fn find_guest_by_email(&self, normalized_email: &str)
        -> Result<Option<Guest>, StoreError>;

    async fn insert_guest(&self, guest: &NewGuest) -> Result<Guest, StoreError>;

    async fn update_guest(&self, id: Uuid, patch: &GuestPatch) -> Result<(), StoreError>;

    async fn fetch_guest(&self, id: Uuid) -> Result<Option<Guest>, StoreError>;

    async fn insert_connection(&self, row: &GuestConnectionRow) -> Result<(), StoreError>;

    async fn fetch_template(&self, id: Uuid) -> Result<Option<Template>, StoreError>;

    async fn fetch_branding(&self) -> Result<Branding, StoreError>;

    async fn fetch_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError>;

    async fn update_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError>;

    /// Fetch the broad contact set for segmentation, optionally limited
    /// to rows last seen at or after `since`.
    async fn fetch_contacts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Contact>, StoreError>;

    async fn insert_run(&self, run: &CampaignRunRow) -> Result<(), StoreError>;

    async fn insert_send(&self, send: &CampaignSendRow) -> Result<(), StoreError>;

    async fn admin_count(&self) -> Result<u64, StoreError>;

    async fn find_admin(&self, email: &str) -> Result<Option<AdminRecord>, StoreError>;

    async fn upsert_admin(&self, email: &str) -> Result<(), StoreError>;

    /// Mark an admin revoked. Returns false when no matching row exists.
    async fn revoke_admin(&self, email: &str) -> Result<bool, StoreError>;
}

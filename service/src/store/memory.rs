//! In-memory [`Store`] for unit tests.
//!
//! Backs the collaborator seam so flows can be exercised without a
//! network. Not compiled into the production binary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    AdminRecord, Branding, Campaign, CampaignRunRow, CampaignSendRow, CampaignStatus, Contact,
    ContactSubmissionRow, Guest, GuestConnectionRow, GuestPatch, NewGuest, Store, StoreError,
    Template,
};

#[derive(Default)]
pub struct MemoryStore {
    pub guests: Mutex<Vec<Guest>>,
    pub submissions: Mutex<Vec<ContactSubmissionRow>>,
    pub connections: Mutex<Vec<GuestConnectionRow>>,
    pub templates: Mutex<Vec<Template>>,
    pub branding: Mutex<Branding>,
    pub campaigns: Mutex<Vec<Campaign>>,
    pub contacts: Mutex<Vec<Contact>>,
    pub runs: Mutex<Vec<CampaignRunRow>>,
    pub sends: Mutex<Vec<CampaignSendRow>>,
    pub admins: Mutex<Vec<AdminRecord>>,
    pub status_history: Mutex<Vec<CampaignStatus>>,

    /// Failure injection for best-effort persistence tests.
    pub fail_submissions: AtomicBool,
    pub fail_connections: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn injected(url: &str) -> StoreError {
        StoreError::Transport {
            url: url.to_string(),
            message: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_submission(&self, row: &ContactSubmissionRow) -> Result<(), StoreError> {
        if self.fail_submissions.load(Ordering::Relaxed) {
            return Err(Self::injected("memory://contact_submissions"));
        }
        self.submissions.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn find_guest_by_email(
        &self,
        normalized_email: &str,
    ) -> Result<Option<Guest>, StoreError> {
        Ok(self
            .guests
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.email == normalized_email)
            .cloned())
    }

    async fn insert_guest(&self, guest: &NewGuest) -> Result<Guest, StoreError> {
        let row = Guest {
            id: Uuid::new_v4(),
            email: guest.email.clone(),
            full_name: guest.full_name.clone(),
            mobile: guest.mobile.clone(),
        };
        self.guests.lock().unwrap().push(row.clone());
        Ok(row)
    }

    async fn update_guest(&self, id: Uuid, patch: &GuestPatch) -> Result<(), StoreError> {
        let mut guests = self.guests.lock().unwrap();
        if let Some(guest) = guests.iter_mut().find(|g| g.id == id) {
            if let Some(name) = &patch.full_name {
                guest.full_name = Some(name.clone());
            }
            if let Some(mobile) = &patch.mobile {
                guest.mobile = Some(mobile.clone());
            }
        }
        Ok(())
    }

    async fn fetch_guest(&self, id: Uuid) -> Result<Option<Guest>, StoreError> {
        Ok(self
            .guests
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == id)
            .cloned())
    }

    async fn insert_connection(&self, row: &GuestConnectionRow) -> Result<(), StoreError> {
        if self.fail_connections.load(Ordering::Relaxed) {
            return Err(Self::injected("memory://guest_connections"));
        }
        self.connections.lock().unwrap().push(row.clone());
        Ok(())
    }

    async fn fetch_template(&self, id: Uuid) -> Result<Option<Template>, StoreError> {
        Ok(self
            .templates
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn fetch_branding(&self) -> Result<Branding, StoreError> {
        Ok(self.branding.lock().unwrap().clone())
    }

    async fn fetch_campaign(&self, id: Uuid) -> Result<Option<Campaign>, StoreError> {
        Ok(self
            .campaigns
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn update_campaign_status(
        &self,
        id: Uuid,
        status: CampaignStatus,
    ) -> Result<(), StoreError> {
        let mut campaigns = self.campaigns.lock().unwrap();
        if let Some(campaign) = campaigns.iter_mut().find(|c| c.id == id) {
            campaign.status = status;
        }
        self.status_history.lock().unwrap().push(status);
        Ok(())
    }

    async fn fetch_contacts(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Contact>, StoreError> {
        let contacts = self.contacts.lock().unwrap();
        Ok(contacts
            .iter()
            .filter(|c| match (since, c.last_seen_at) {
                (Some(since), Some(seen)) => seen >= since,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .cloned()
            .collect())
    }

    async fn insert_run(&self, run: &CampaignRunRow) -> Result<(), StoreError> {
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }

    async fn insert_send(&self, send: &CampaignSendRow) -> Result<(), StoreError> {
        self.sends.lock().unwrap().push(send.clone());
        Ok(())
    }

    async fn admin_count(&self) -> Result<u64, StoreError> {
        Ok(self
            .admins
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !a.revoked)
            .count() as u64)
    }

    async fn find_admin(&self, email: &str) -> Result<Option<AdminRecord>, StoreError> {
        Ok(self
            .admins
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn upsert_admin(&self, email: &str) -> Result<(), StoreError> {
        let mut admins = self.admins.lock().unwrap();
        if let Some(existing) = admins.iter_mut().find(|a| a.email == email) {
            existing.revoked = false;
        } else {
            admins.push(AdminRecord {
                email: email.to_string(),
                revoked: false,
            });
        }
        Ok(())
    }

    async fn revoke_admin(&self, email: &str) -> Result<bool, StoreError> {
        let mut admins = self.admins.lock().unwrap();
        match admins.iter_mut().find(|a| a.email == email) {
            Some(admin) => {
                admin.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

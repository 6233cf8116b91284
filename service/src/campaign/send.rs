//! Campaign send orchestration.
//!
//! A thin layer atop the render pipeline: for each recipient, render with
//! that recipient's merge variables, dispatch through the email provider,
//! and record one terminal outcome. Recipients are attempted exactly once,
//! strictly sequentially; a per-recipient failure never aborts the run:
//! it is recorded and rolled into the aggregate. Campaign status follows
//! `draft`/`scheduled` → `sending` → `sent` | `failed`.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::segment;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::mail::{MailError, Mailer, OutgoingEmail};
use crate::render::{render, RenderOverrides};
use crate::storage::StorageResolver;
use crate::store::{
    CampaignRunRow, CampaignSendRow, CampaignStatus, SendStatus, Store, Template,
};

/// Collaborators every send path needs.
pub struct SendContext<'a> {
    pub store: &'a dyn Store,
    /// `None` when provider credentials are not configured: the render
    /// and persistence path still runs, the network send is skipped.
    pub mailer: Option<&'a dyn Mailer>,
    pub resolver: &'a dyn StorageResolver,
    pub config: &'a Config,
}

/// Aggregate outcome of one bulk run.
#[derive(Debug)]
pub struct BulkOutcome {
    pub run_id: Uuid,
    pub sent: u32,
    pub failed: u32,
    pub status: CampaignStatus,
    pub simulated: bool,
}

/// Outcome of a campaign test send.
#[derive(Debug)]
pub struct TestOutcome {
    pub run_id: Uuid,
    pub message_id: String,
    pub simulated: bool,
}

/// Outcome of a single/test email send.
#[derive(Debug)]
pub struct SingleOutcome {
    pub run_id: Uuid,
    pub to: String,
    pub simulated: bool,
}

/// Send a campaign to its segmented audience.
pub async fn send_campaign(ctx: &SendContext<'_>, campaign_id: Uuid) -> ApiResult<BulkOutcome> {
    let campaign = ctx
        .store
        .fetch_campaign(campaign_id)
        .await?
        .ok_or(ApiError::NotFound("campaign"))?;
    let template = ctx
        .store
        .fetch_template(campaign.template_id)
        .await?
        .ok_or(ApiError::NotFound("template"))?;
    let branding = fetch_branding_or_default(ctx).await;

    set_status(ctx, campaign_id, CampaignStatus::Sending).await;

    let since = campaign.segment.since(Utc::now());
    let contacts = ctx.store.fetch_contacts(since).await?;
    let eligible = segment::apply(contacts, &campaign.segment);
    let recipients = segment::distinct_recipients(eligible);

    let run_id = Uuid::new_v4();
    let simulated = ctx.mailer.is_none();
    let overrides = RenderOverrides {
        subject: campaign.subject_override.clone(),
        ..Default::default()
    };

    info!(
        campaign_id = %campaign_id,
        run_id = %run_id,
        recipients = recipients.len(),
        simulated = simulated,
        "campaign_run_starting"
    );

    let mut sent: u32 = 0;
    let mut failed: u32 = 0;

    for recipient in &recipients {
        // Eligible recipients always carry an email by this point.
        let Some(email) = segment::normalized_email(recipient) else {
            continue;
        };
        let vars = recipient_variables(ctx.config, recipient.full_name.as_deref(), &email);
        let rendered = render(&template, &branding, &vars, &overrides, ctx.resolver);
        let outgoing = OutgoingEmail {
            to_email: email.clone(),
            to_name: recipient.full_name.clone(),
            subject: rendered.subject,
            html: rendered.html,
        };

        match dispatch(ctx.mailer, &outgoing).await {
            Ok(message_id) => {
                sent += 1;
                record_send(ctx, run_id, Some(campaign_id), &email, SendStatus::Sent, Some(message_id), None)
                    .await;
            }
            Err(err) => {
                failed += 1;
                error!(to = %email, error = %err, "campaign_recipient_send_failed");
                record_send(
                    ctx,
                    run_id,
                    Some(campaign_id),
                    &email,
                    SendStatus::Failed,
                    None,
                    Some(err.to_string()),
                )
                .await;
            }
        }
    }

    let status = if failed > 0 {
        CampaignStatus::Failed
    } else {
        CampaignStatus::Sent
    };
    set_status(ctx, campaign_id, status).await;
    record_run(ctx, run_id, Some(campaign_id), "bulk", sent, failed, simulated).await;

    info!(
        campaign_id = %campaign_id,
        run_id = %run_id,
        sent = sent,
        failed = failed,
        status = ?status,
        "campaign_run_complete"
    );

    Ok(BulkOutcome {
        run_id,
        sent,
        failed,
        status,
        simulated,
    })
}

/// Render a campaign for a test address and send exactly one message.
/// Campaign status is untouched and no per-recipient rows are written.
pub async fn send_campaign_test(
    ctx: &SendContext<'_>,
    campaign_id: Uuid,
    test_email: &str,
) -> ApiResult<TestOutcome> {
    let campaign = ctx
        .store
        .fetch_campaign(campaign_id)
        .await?
        .ok_or(ApiError::NotFound("campaign"))?;
    let template = ctx
        .store
        .fetch_template(campaign.template_id)
        .await?
        .ok_or(ApiError::NotFound("template"))?;
    let branding = fetch_branding_or_default(ctx).await;

    let vars = recipient_variables(ctx.config, None, test_email);
    let overrides = RenderOverrides {
        subject: campaign.subject_override.clone(),
        ..Default::default()
    };
    let rendered = render(&template, &branding, &vars, &overrides, ctx.resolver);

    let outgoing = OutgoingEmail {
        to_email: test_email.to_string(),
        to_name: None,
        subject: rendered.subject,
        html: rendered.html,
    };

    let simulated = ctx.mailer.is_none();
    let message_id = dispatch(ctx.mailer, &outgoing).await?;

    let run_id = Uuid::new_v4();
    record_run(ctx, run_id, Some(campaign_id), "test", 1, 0, simulated).await;

    Ok(TestOutcome {
        run_id,
        message_id,
        simulated,
    })
}

/// Send one template to one recipient (admin "single"/"test" sends).
pub async fn send_single(
    ctx: &SendContext<'_>,
    template: &Template,
    to_email: &str,
    to_name: Option<&str>,
    subject_override: Option<&str>,
    mode: &str,
) -> ApiResult<SingleOutcome> {
    let branding = fetch_branding_or_default(ctx).await;
    let email = to_email.trim().to_lowercase();
    let vars = recipient_variables(ctx.config, to_name, &email);
    let overrides = RenderOverrides {
        subject: subject_override.map(|s| s.to_string()),
        ..Default::default()
    };
    let rendered = render(template, &branding, &vars, &overrides, ctx.resolver);

    let outgoing = OutgoingEmail {
        to_email: email.clone(),
        to_name: to_name.map(|s| s.to_string()),
        subject: rendered.subject,
        html: rendered.html,
    };

    let simulated = ctx.mailer.is_none();
    let message_id = dispatch(ctx.mailer, &outgoing).await?;

    let run_id = Uuid::new_v4();
    record_send(ctx, run_id, None, &email, SendStatus::Sent, Some(message_id), None).await;
    record_run(ctx, run_id, None, mode, 1, 0, simulated).await;

    Ok(SingleOutcome {
        run_id,
        to: email,
        simulated,
    })
}

/// Merge variables for one recipient: branding defaults from config plus
/// the recipient's own fields. `first_name` defaults to "there".
pub fn recipient_variables(
    config: &Config,
    full_name: Option<&str>,
    email: &str,
) -> HashMap<String, String> {
    let mut vars = HashMap::new();

    vars.insert("venue_name".to_string(), config.venue_name.clone());
    vars.insert("venue_address".to_string(), config.venue_address.clone());
    for (key, value) in [
        ("facebook_url", &config.facebook_url),
        ("instagram_url", &config.instagram_url),
        ("twitter_url", &config.twitter_url),
        ("website_url", &config.website_url),
    ] {
        if let Some(value) = value {
            vars.insert(key.to_string(), value.clone());
        }
    }

    let first_name = full_name
        .and_then(|name| name.split_whitespace().next())
        .filter(|n| !n.is_empty())
        .unwrap_or("there");
    vars.insert("first_name".to_string(), first_name.to_string());
    vars.insert(
        "full_name".to_string(),
        full_name.unwrap_or_default().to_string(),
    );
    vars.insert("email".to_string(), email.to_string());

    vars
}

async fn dispatch(
    mailer: Option<&dyn Mailer>,
    email: &OutgoingEmail,
) -> Result<String, MailError> {
    match mailer {
        Some(mailer) => mailer.send(email).await,
        None => {
            info!(to = %email.to_email, "send_simulated_no_provider_credentials");
            Ok(format!("simulated-{}", Uuid::new_v4()))
        }
    }
}

async fn fetch_branding_or_default(ctx: &SendContext<'_>) -> crate::store::Branding {
    match ctx.store.fetch_branding().await {
        Ok(branding) => branding,
        Err(err) => {
            warn!(error = %err, "branding_fetch_failed_using_defaults");
            crate::store::Branding::default()
        }
    }
}

async fn set_status(ctx: &SendContext<'_>, campaign_id: Uuid, status: CampaignStatus) {
    if let Err(err) = ctx.store.update_campaign_status(campaign_id, status).await {
        warn!(campaign_id = %campaign_id, status = ?status, error = %err, "campaign_status_update_failed");
    }
}

async fn record_send(
    ctx: &SendContext<'_>,
    run_id: Uuid,
    campaign_id: Option<Uuid>,
    email: &str,
    status: SendStatus,
    provider_message_id: Option<String>,
    error: Option<String>,
) {
    let row = CampaignSendRow {
        run_id,
        campaign_id,
        recipient_email: email.to_string(),
        status,
        provider_message_id,
        error,
    };
    if let Err(err) = ctx.store.insert_send(&row).await {
        warn!(to = %email, error = %err, "send_record_write_failed");
    }
}

async fn record_run(
    ctx: &SendContext<'_>,
    run_id: Uuid,
    campaign_id: Option<Uuid>,
    mode: &str,
    sent: u32,
    failed: u32,
    simulated: bool,
) {
    let row = CampaignRunRow {
        id: run_id,
        campaign_id,
        mode: mode.to_string(),
        sent,
        failed,
        simulated,
        created_at: Utc::now(),
    };
    if let Err(err) = ctx.store.insert_run(&row).await {
        warn!(run_id = %run_id, error = %err, "run_record_write_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::segment::SegmentFilter;
    use crate::storage::StorageResolver;
    use crate::store::memory::MemoryStore;
    use crate::store::{Campaign, Contact};
    use async_trait::async_trait;

    struct FixedResolver;

    impl StorageResolver for FixedResolver {
        fn public_url(&self, path: &str) -> Option<String> {
            if path.trim().is_empty() {
                None
            } else {
                Some(format!("https://cdn.test/{path}"))
            }
        }
    }

    /// Mailer that fails for any address containing "fail".
    struct MockMailer;

    #[async_trait]
    impl Mailer for MockMailer {
        async fn send(&self, email: &OutgoingEmail) -> Result<String, MailError> {
            if email.to_email.contains("fail") {
                Err(MailError::Rejected {
                    url: "https://api.mailgun.test/v3/mg/messages".to_string(),
                    status: 400,
                    body: "rejected".to_string(),
                })
            } else {
                Ok(format!("mid-{}", email.to_email))
            }
        }
    }

    fn test_config() -> Config {
        let mut config = Config::from_env();
        config.venue_name = "The Crown".to_string();
        config.venue_address = "1 High St".to_string();
        config
    }

    fn template() -> Template {
        Template {
            id: Uuid::new_v4(),
            subject: "Hi {{first_name}}".to_string(),
            body_html: "<p>News from {{venue_name}}</p>".to_string(),
            body_text: None,
            hero_image_path: None,
            footer_image_path: None,
            inline_images: vec![],
        }
    }

    fn contact(email: &str) -> Contact {
        Contact {
            email: Some(email.to_string()),
            mobile: None,
            full_name: None,
            tags: vec![],
            last_seen_at: None,
        }
    }

    fn seed_campaign(store: &MemoryStore) -> Uuid {
        let tpl = template();
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: "Quiz night".to_string(),
            template_id: tpl.id,
            status: CampaignStatus::Draft,
            subject_override: None,
            segment: SegmentFilter::default(),
        };
        let id = campaign.id;
        store.templates.lock().unwrap().push(tpl);
        store.campaigns.lock().unwrap().push(campaign);
        id
    }

    #[tokio::test]
    async fn test_partial_failure_marks_campaign_failed() {
        let store = MemoryStore::new();
        let campaign_id = seed_campaign(&store);
        {
            let mut contacts = store.contacts.lock().unwrap();
            for i in 0..7 {
                contacts.push(contact(&format!("ok{i}@x.com")));
            }
            for i in 0..3 {
                contacts.push(contact(&format!("fail{i}@x.com")));
            }
        }

        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: Some(&MockMailer),
            resolver: &FixedResolver,
            config: &config,
        };

        let outcome = send_campaign(&ctx, campaign_id).await.unwrap();
        assert_eq!(outcome.sent, 7);
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.status, CampaignStatus::Failed);

        let history = store.status_history.lock().unwrap().clone();
        assert_eq!(
            history,
            vec![CampaignStatus::Sending, CampaignStatus::Failed]
        );

        let sends = store.sends.lock().unwrap();
        assert_eq!(sends.len(), 10);
        assert!(sends
            .iter()
            .filter(|s| s.status == SendStatus::Failed)
            .all(|s| s.error.is_some() && s.provider_message_id.is_none()));

        let runs = store.runs.lock().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!((runs[0].sent, runs[0].failed), (7, 3));
    }

    #[tokio::test]
    async fn test_clean_run_marks_campaign_sent() {
        let store = MemoryStore::new();
        let campaign_id = seed_campaign(&store);
        store.contacts.lock().unwrap().push(contact("a@x.com"));

        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: Some(&MockMailer),
            resolver: &FixedResolver,
            config: &config,
        };

        let outcome = send_campaign(&ctx, campaign_id).await.unwrap();
        assert_eq!(outcome.status, CampaignStatus::Sent);
        assert_eq!((outcome.sent, outcome.failed), (1, 0));
    }

    #[tokio::test]
    async fn test_duplicate_contacts_get_one_message() {
        let store = MemoryStore::new();
        let campaign_id = seed_campaign(&store);
        {
            let mut contacts = store.contacts.lock().unwrap();
            contacts.push(contact("a@x.com"));
            contacts.push(contact("A@X.com"));
        }

        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: Some(&MockMailer),
            resolver: &FixedResolver,
            config: &config,
        };

        let outcome = send_campaign(&ctx, campaign_id).await.unwrap();
        assert_eq!(outcome.sent, 1);
    }

    #[tokio::test]
    async fn test_no_mailer_simulates_sends() {
        let store = MemoryStore::new();
        let campaign_id = seed_campaign(&store);
        store.contacts.lock().unwrap().push(contact("a@x.com"));

        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: None,
            resolver: &FixedResolver,
            config: &config,
        };

        let outcome = send_campaign(&ctx, campaign_id).await.unwrap();
        assert!(outcome.simulated);
        assert_eq!(outcome.status, CampaignStatus::Sent);

        let sends = store.sends.lock().unwrap();
        assert!(sends[0]
            .provider_message_id
            .as_deref()
            .unwrap()
            .starts_with("simulated-"));
    }

    #[tokio::test]
    async fn test_campaign_test_mode_leaves_status_untouched() {
        let store = MemoryStore::new();
        let campaign_id = seed_campaign(&store);

        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: Some(&MockMailer),
            resolver: &FixedResolver,
            config: &config,
        };

        let outcome = send_campaign_test(&ctx, campaign_id, "preview@x.com")
            .await
            .unwrap();
        assert_eq!(outcome.message_id, "mid-preview@x.com");
        assert!(store.status_history.lock().unwrap().is_empty());
        assert!(store.sends.lock().unwrap().is_empty());
        assert_eq!(store.runs.lock().unwrap().len(), 1);
        assert_eq!(store.runs.lock().unwrap()[0].mode, "test");
    }

    #[tokio::test]
    async fn test_missing_campaign_is_not_found() {
        let store = MemoryStore::new();
        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: Some(&MockMailer),
            resolver: &FixedResolver,
            config: &config,
        };

        let err = send_campaign(&ctx, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("campaign")));
    }

    #[tokio::test]
    async fn test_send_single_records_run_and_send() {
        let store = MemoryStore::new();
        let tpl = template();

        let config = test_config();
        let ctx = SendContext {
            store: &store,
            mailer: Some(&MockMailer),
            resolver: &FixedResolver,
            config: &config,
        };

        let outcome = send_single(&ctx, &tpl, "Guest@X.com", Some("Ada Lovelace"), None, "single")
            .await
            .unwrap();
        assert_eq!(outcome.to, "guest@x.com");
        assert!(!outcome.simulated);
        assert_eq!(store.runs.lock().unwrap()[0].mode, "single");
        assert_eq!(store.sends.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_recipient_variables_first_name_default() {
        let config = test_config();
        let vars = recipient_variables(&config, None, "a@x.com");
        assert_eq!(vars.get("first_name").map(String::as_str), Some("there"));

        let vars = recipient_variables(&config, Some("Ada Lovelace"), "a@x.com");
        assert_eq!(vars.get("first_name").map(String::as_str), Some("Ada"));
        assert_eq!(
            vars.get("full_name").map(String::as_str),
            Some("Ada Lovelace")
        );
        assert_eq!(vars.get("venue_name").map(String::as_str), Some("The Crown"));
    }
}

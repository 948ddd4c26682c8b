//! Webhook intake pipeline: verify, validate, dedupe, dispatch.
//!
//! Counter updates go exclusively through the store's atomic RPCs; activity
//! rows only ever have flags set, never cleared, so replays and reordering
//! are safe.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use atlas_core::category::map_reply_category;
use atlas_core::config::{WebhookSecretConfig, WebhooksConfig};
use atlas_core::types::{
    Campaign, EmailStatus, LinkClick, MessageThread, Provider, ReplyCategory, ReplySentiment,
    WebhookEvent,
};
use atlas_core::AtlasResult;
use atlas_store::{ActivityKey, AtlasStore, CampaignMetric, DailyDelta, HourlyField, InsertOutcome};

use crate::events::{parse_event, InboundEvent, WebhookKind};
use crate::signature::verify_signature;

/// What the endpoint should tell the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeStatus {
    /// Dispatched (or a known duplicate, which is equivalent).
    Processed,
    /// Campaign unknown; the raw event was stored for later replay.
    Stored,
}

pub struct WebhookProcessor {
    store: Arc<AtlasStore>,
    config: WebhooksConfig,
}

impl WebhookProcessor {
    pub fn new(store: Arc<AtlasStore>, config: WebhooksConfig) -> Self {
        Self { store, config }
    }

    fn secret_config(&self, provider: Provider) -> &WebhookSecretConfig {
        match provider {
            Provider::Sendline => &self.config.sendline,
            Provider::Outflow => &self.config.outflow,
        }
    }

    /// Run the full intake pipeline for one request body.
    pub fn process(
        &self,
        provider: Provider,
        raw_body: &[u8],
        signature_header: Option<&str>,
    ) -> AtlasResult<IntakeStatus> {
        verify_signature(self.secret_config(provider), raw_body, signature_header)?;

        let (event, payload) = parse_event(raw_body)?;
        metrics::counter!("webhooks.received").increment(1);

        let Some(campaign) = self
            .store
            .find_campaign_by_platform(provider, &event.campaign_platform_id)
        else {
            // Keep the raw event; it can be replayed once the campaign is
            // known to the store.
            self.store.insert_webhook_event(WebhookEvent {
                provider,
                event_id: event.event_id.clone(),
                event_type: event.event_type.clone(),
                payload,
                processed: false,
                processed_at: None,
                received_at: Utc::now(),
            });
            info!(
                provider = provider.as_str(),
                campaign_id = %event.campaign_platform_id,
                "Webhook for unknown campaign stored unprocessed"
            );
            metrics::counter!("webhooks.stored_unresolved").increment(1);
            return Ok(IntakeStatus::Stored);
        };

        let inserted = self.store.insert_webhook_event(WebhookEvent {
            provider,
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            payload,
            processed: false,
            processed_at: None,
            received_at: Utc::now(),
        });
        if inserted == InsertOutcome::Duplicate {
            debug!(
                provider = provider.as_str(),
                event_id = %event.event_id,
                "Duplicate webhook event, skipping dispatch"
            );
            metrics::counter!("webhooks.duplicates").increment(1);
            return Ok(IntakeStatus::Processed);
        }

        self.dispatch(&campaign, &event);
        self.store.mark_event_processed(provider, &event.event_id);
        metrics::counter!("webhooks.processed").increment(1);
        Ok(IntakeStatus::Processed)
    }

    fn dispatch(&self, campaign: &Campaign, event: &InboundEvent) {
        let contact = self
            .store
            .get_or_create_contact(campaign.workspace_id, &event.email);
        let key = ActivityKey {
            workspace_id: campaign.workspace_id,
            campaign_id: campaign.id,
            contact_id: contact.id,
            step_number: event.step_number,
        };
        let date = event.occurred_at.date_naive();

        match event.kind {
            WebhookKind::Sent => {
                let occurred_at = event.occurred_at;
                let step_number = event.step_number;
                self.store.upsert_activity(key, |a| {
                    a.sent = true;
                    a.step_number = step_number;
                    if a.sent_at.is_none() {
                        a.sent_at = Some(occurred_at);
                    }
                });
                self.store
                    .increment_campaign_metric(campaign.id, CampaignMetric::Sent, 1);
                self.store.record_hourly_metric(
                    campaign.workspace_id,
                    campaign.id,
                    event.occurred_at,
                    HourlyField::EmailsSent,
                    1,
                );
                self.store.record_daily_metric(
                    campaign.id,
                    date,
                    DailyDelta { sent: 1, ..DailyDelta::default() },
                );
            }
            WebhookKind::Opened => {
                let occurred_at = event.occurred_at;
                self.store.upsert_activity(key, |a| {
                    a.opened = true;
                    if a.first_opened_at.is_none() {
                        a.first_opened_at = Some(occurred_at);
                    }
                    a.open_count += 1;
                });
                self.store
                    .increment_campaign_metric(campaign.id, CampaignMetric::Opened, 1);
                self.store.record_hourly_metric(
                    campaign.workspace_id,
                    campaign.id,
                    event.occurred_at,
                    HourlyField::Opened,
                    1,
                );
                self.store.record_daily_metric(
                    campaign.id,
                    date,
                    DailyDelta { opened: 1, ..DailyDelta::default() },
                );
            }
            WebhookKind::Clicked => {
                let occurred_at = event.occurred_at;
                self.store.upsert_activity(key, |a| {
                    a.clicked = true;
                    if a.first_clicked_at.is_none() {
                        a.first_clicked_at = Some(occurred_at);
                    }
                    a.click_count += 1;
                });
                if let Some(url) = &event.link_url {
                    self.store.insert_link_click(LinkClick {
                        id: Uuid::new_v4(),
                        workspace_id: campaign.workspace_id,
                        campaign_id: campaign.id,
                        contact_id: contact.id,
                        step_number: event.step_number,
                        url: url.clone(),
                        clicked_at: event.occurred_at,
                    });
                }
                self.store
                    .increment_campaign_metric(campaign.id, CampaignMetric::Clicked, 1);
                self.store.record_hourly_metric(
                    campaign.workspace_id,
                    campaign.id,
                    event.occurred_at,
                    HourlyField::Clicked,
                    1,
                );
            }
            WebhookKind::Replied => {
                let label = event.lead_category.as_deref().unwrap_or("");
                let (category, sentiment) = map_reply_category(label);
                let occurred_at = event.occurred_at;
                let reply_text = event.reply_text.clone();
                self.store.upsert_activity(key, |a| {
                    a.replied = true;
                    a.replied_at = Some(occurred_at);
                    if reply_text.is_some() {
                        a.reply_text = reply_text.clone();
                    }
                    a.reply_category = Some(category);
                    a.reply_sentiment = Some(sentiment);
                });
                self.store
                    .increment_campaign_metric(campaign.id, CampaignMetric::Replied, 1);
                self.store.record_hourly_metric(
                    campaign.workspace_id,
                    campaign.id,
                    event.occurred_at,
                    HourlyField::Replied,
                    1,
                );
                self.store.record_daily_metric(
                    campaign.id,
                    date,
                    DailyDelta { replied: 1, ..DailyDelta::default() },
                );
                if sentiment == ReplySentiment::Positive {
                    self.store.update_positive_reply_counts(campaign.id, date);
                }
                if category == ReplyCategory::MeetingRequest {
                    self.store
                        .increment_campaign_metric(campaign.id, CampaignMetric::Meetings, 1);
                }
                if let Some(body) = &event.reply_text {
                    if !body.is_empty() {
                        self.store.append_message_thread(MessageThread {
                            id: Uuid::new_v4(),
                            workspace_id: campaign.workspace_id,
                            campaign_id: campaign.id,
                            contact_id: contact.id,
                            body: body.clone(),
                            received_at: event.occurred_at,
                        });
                    }
                }
            }
            WebhookKind::Bounced => {
                let bounce_type = event.bounce_type.clone();
                let bounce_reason = event.bounce_reason.clone();
                self.store.upsert_activity(key, |a| {
                    a.bounced = true;
                    a.bounce_type = bounce_type.clone();
                    a.bounce_reason = bounce_reason.clone();
                });
                self.store.update_contact(contact.id, |c| {
                    c.email_status = EmailStatus::Bounced;
                });
                self.store
                    .increment_campaign_metric(campaign.id, CampaignMetric::Bounced, 1);
                self.store.record_hourly_metric(
                    campaign.workspace_id,
                    campaign.id,
                    event.occurred_at,
                    HourlyField::Bounced,
                    1,
                );
                self.store.record_daily_metric(
                    campaign.id,
                    date,
                    DailyDelta { bounced: 1, ..DailyDelta::default() },
                );
            }
            WebhookKind::Unsubscribed => {
                self.store.upsert_activity(key, |a| {
                    a.unsubscribed = true;
                });
                self.store.update_contact(contact.id, |c| {
                    c.do_not_email = true;
                });
            }
            WebhookKind::CategoryChanged => {
                let label = event.lead_category.as_deref().unwrap_or("");
                let (category, sentiment) = map_reply_category(label);
                let previous = self.store.get_activity(&key);
                let previous_sentiment = previous.as_ref().and_then(|a| a.reply_sentiment);
                let previous_category = previous.as_ref().and_then(|a| a.reply_category);
                self.store.upsert_activity(key, |a| {
                    a.reply_category = Some(category);
                    a.reply_sentiment = Some(sentiment);
                });
                // Only a flip INTO positive counts; re-asserting positive
                // must not double-count.
                if sentiment == ReplySentiment::Positive
                    && previous_sentiment != Some(ReplySentiment::Positive)
                {
                    self.store.update_positive_reply_counts(campaign.id, date);
                }
                // Same guard for meeting requests.
                if category == ReplyCategory::MeetingRequest
                    && previous_category != Some(ReplyCategory::MeetingRequest)
                {
                    self.store
                        .increment_campaign_metric(campaign.id, CampaignMetric::Meetings, 1);
                }
            }
        }
    }
}

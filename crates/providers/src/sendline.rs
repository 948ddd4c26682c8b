//! Sendline adapter.
//!
//! Endpoints: `GET /campaigns` (list), `GET /campaigns/{id}/analytics`
//! (stats), `GET /campaigns/{id}/sequences` (steps). Auth is a query-string
//! `api_key`; both lanes pace at the same fast interval, and 404s are real
//! errors on this platform.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use atlas_core::config::ProviderConfig;
use atlas_core::types::{
    ApiConnection, CampaignStatus, CampaignSummary, LifetimeCounters, Provider,
};
use atlas_core::{AtlasError, AtlasResult};

use crate::adapter::{date_field, first_u64, string_field, ContactPresence, ProviderAdapter, StepDraft};
use crate::client::{AuthVariant, ProviderClient, RequestOpts};
use crate::gate::Lane;
use crate::personalization::extract_variables;

pub struct SendlineAdapter {
    client: Arc<ProviderClient>,
    config: ProviderConfig,
}

impl SendlineAdapter {
    pub fn new(client: Arc<ProviderClient>, config: ProviderConfig) -> Self {
        Self { client, config }
    }

    fn opts<'a>(
        &self,
        api_key: &'a str,
        lane: Lane,
        allow_404: bool,
        deadline: Option<Instant>,
    ) -> RequestOpts<'a> {
        let spacing_ms = match lane {
            Lane::List => self.config.spacing_ms,
            Lane::Stats => self.config.stats_spacing_ms,
        };
        RequestOpts {
            retries: self.config.retries,
            allow_404,
            spacing: std::time::Duration::from_millis(spacing_ms),
            lane,
            auth: AuthVariant::QueryApiKey(api_key),
            backoff_step: std::time::Duration::from_secs(self.config.backoff_step_secs),
            deadline,
        }
    }
}

#[async_trait]
impl ProviderAdapter for SendlineAdapter {
    fn provider(&self) -> Provider {
        Provider::Sendline
    }

    async fn list_campaigns(
        &self,
        conn: &ApiConnection,
        deadline: Option<Instant>,
    ) -> AtlasResult<Vec<CampaignSummary>> {
        let url = format!("{}/campaigns", self.config.base_url);
        let response = self
            .client
            .get(
                Provider::Sendline,
                &url,
                &[],
                self.opts(&conn.api_key, Lane::List, false, deadline),
            )
            .await?
            .ok_or_else(|| AtlasError::DataShape("empty campaign list response".to_string()))?;

        let items = response
            .as_array()
            .cloned()
            .or_else(|| {
                response
                    .get("campaigns")
                    .and_then(Value::as_array)
                    .cloned()
            })
            .ok_or_else(|| {
                AtlasError::DataShape("campaign list is not an array".to_string())
            })?;

        let mut campaigns = Vec::with_capacity(items.len());
        for item in &items {
            let Some(platform_id) = string_field(item, &["id", "campaign_id"]) else {
                warn!(provider = "sendline", "Campaign entry without id, skipping");
                continue;
            };
            let status = string_field(item, &["status"])
                .map(|s| CampaignStatus::parse_lossy(&s))
                .unwrap_or(CampaignStatus::Unknown);
            campaigns.push(CampaignSummary {
                platform_id,
                name: string_field(item, &["name"]).unwrap_or_else(|| "Untitled".to_string()),
                status,
                created_at: date_field(item, &["created_at", "createdAt"]),
            });
        }
        Ok(campaigns)
    }

    async fn fetch_campaign_stats(
        &self,
        conn: &ApiConnection,
        campaign: &CampaignSummary,
        deadline: Option<Instant>,
    ) -> AtlasResult<Option<LifetimeCounters>> {
        let url = format!(
            "{}/campaigns/{}/analytics",
            self.config.base_url, campaign.platform_id
        );
        let Some(response) = self
            .client
            .get(
                Provider::Sendline,
                &url,
                &[],
                self.opts(&conn.api_key, Lane::Stats, false, deadline),
            )
            .await?
        else {
            return Ok(None);
        };

        let analytics = response.get("analytics").unwrap_or(&response);
        let counters = LifetimeCounters {
            sent: first_u64(analytics, &["sent_count", "unique_sent_count"]).unwrap_or(0),
            opened: first_u64(analytics, &["unique_open_count", "open_count"]).unwrap_or(0),
            clicked: first_u64(analytics, &["unique_click_count", "click_count"]).unwrap_or(0),
            replied: first_u64(analytics, &["reply_count"]).unwrap_or(0),
            bounced: first_u64(analytics, &["bounce_count"]).unwrap_or(0),
            interested: first_u64(analytics, &["interested_count"]).unwrap_or(0),
        };
        if first_u64(analytics, &["sent_count", "unique_sent_count"]).is_none() {
            warn!(
                provider = "sendline",
                campaign = %campaign.platform_id,
                "No recognizable counters in analytics response, defaulting to zero"
            );
        }
        Ok(Some(counters))
    }

    async fn fetch_steps(
        &self,
        conn: &ApiConnection,
        campaign: &CampaignSummary,
        deadline: Option<Instant>,
    ) -> AtlasResult<Vec<StepDraft>> {
        let url = format!(
            "{}/campaigns/{}/sequences",
            self.config.base_url, campaign.platform_id
        );
        let Some(response) = self
            .client
            .get(
                Provider::Sendline,
                &url,
                &[],
                self.opts(&conn.api_key, Lane::List, false, deadline),
            )
            .await?
        else {
            return Ok(Vec::new());
        };

        let items = response
            .as_array()
            .cloned()
            .or_else(|| {
                response
                    .get("sequences")
                    .and_then(Value::as_array)
                    .cloned()
            })
            .unwrap_or_default();

        let mut steps = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let step_number = first_u64(item, &["seq_number", "step_number"])
                .unwrap_or(index as u64 + 1) as u32;
            let subject = string_field(item, &["subject", "email_subject"]).unwrap_or_default();
            let body = string_field(item, &["body", "email_body"]).unwrap_or_default();
            let delay_days = first_u64(item, &["delay_days"])
                .or_else(|| {
                    item.get("seq_delay_details")
                        .and_then(|d| first_u64(d, &["delay_in_days"]))
                })
                .unwrap_or(0) as u32;
            let personalization_vars = extract_variables(&subject, &body);
            steps.push(StepDraft {
                step_number,
                name: string_field(item, &["name"])
                    .unwrap_or_else(|| format!("Step {step_number}")),
                subject,
                body,
                delay_days,
                personalization_vars,
            });
        }
        Ok(steps)
    }

    async fn search_contact(
        &self,
        conn: &ApiConnection,
        email: &str,
    ) -> AtlasResult<ContactPresence> {
        let url = format!("{}/leads", self.config.base_url);
        let Some(response) = self
            .client
            .get(
                Provider::Sendline,
                &url,
                &[("email", email.to_string())],
                self.opts(&conn.api_key, Lane::List, true, None),
            )
            .await?
        else {
            return Ok(ContactPresence::absent(Provider::Sendline));
        };

        let lead = response
            .get("lead")
            .or_else(|| response.get("data"))
            .unwrap_or(&response);
        if lead.is_null() || (lead.is_array() && lead.as_array().is_some_and(|a| a.is_empty())) {
            return Ok(ContactPresence::absent(Provider::Sendline));
        }
        let lead = if let Some(first) = lead.as_array().and_then(|a| a.first()) {
            first
        } else {
            lead
        };

        let snippets = lead
            .get("history")
            .or_else(|| lead.get("messages"))
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| string_field(m, &["message", "body", "text"]))
                    .take(5)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ContactPresence {
            provider: Provider::Sendline,
            found: true,
            campaign_name: string_field(lead, &["campaign_name"]),
            snippets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counter_priority() {
        let analytics = json!({
            "sent_count": 1000,
            "unique_sent_count": 900,
            "unique_open_count": 300,
            "open_count": 450,
            "unique_click_count": 40,
            "reply_count": 25,
            "bounce_count": 5
        });
        assert_eq!(
            first_u64(&analytics, &["sent_count", "unique_sent_count"]),
            Some(1000)
        );
        assert_eq!(
            first_u64(&analytics, &["unique_open_count", "open_count"]),
            Some(300)
        );
    }

    #[test]
    fn test_status_lowercased_directly() {
        assert_eq!(CampaignStatus::parse_lossy("ACTIVE"), CampaignStatus::Active);
        assert_eq!(CampaignStatus::parse_lossy("Paused"), CampaignStatus::Paused);
        assert_eq!(
            CampaignStatus::parse_lossy("SOMETHING_ELSE"),
            CampaignStatus::Unknown
        );
    }
}

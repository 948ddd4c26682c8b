//! Outflow adapter.
//!
//! The list-level endpoints (`GET /sequences?top=N&skip=M`,
//! `GET /sequences/{id}/steps`) and the v1 stats endpoint
//! (`GET /v1/campaigns?id={id}`) are separate API generations with different
//! pacing and different JSON shapes. Counter fields go by several names
//! depending on account age, so each metric is probed against an ordered
//! synonym list; the first entry is canonical and the rest are strictly
//! fallback. 404s on stats and steps are tolerated.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::warn;

use atlas_core::config::ProviderConfig;
use atlas_core::types::{
    ApiConnection, CampaignStatus, CampaignSummary, LifetimeCounters, Provider,
};
use atlas_core::AtlasResult;

use crate::adapter::{date_field, first_u64, string_field, ContactPresence, ProviderAdapter, StepDraft};
use crate::client::{AuthVariant, ProviderClient, RequestOpts};
use crate::gate::Lane;
use crate::personalization::extract_variables;

const SENT_KEYS: &[&str] = &[
    "deliveriesCount",
    "peopleContacted",
    "contactedPeople",
    "sentCount",
    "peopleInSequence",
    "contactCount",
];
const OPENED_KEYS: &[&str] = &["opensCount", "uniqueOpensCount", "peopleOpened", "openedCount"];
const CLICKED_KEYS: &[&str] = &["clicksCount", "uniqueClicksCount", "peopleClicked", "clickedCount"];
const REPLIED_KEYS: &[&str] = &["repliesCount", "uniqueRepliesCount", "peopleReplied", "repliedCount"];
const BOUNCED_KEYS: &[&str] = &["bouncesCount", "peopleBounced", "bouncedCount"];
const INTERESTED_KEYS: &[&str] = &["interestedCount", "peopleInterested", "positiveRepliesCount"];

/// Step types that represent an actual email touch.
const EMAIL_STEP_TYPES: &[&str] = &["email", "e-mail", "manual_email"];

pub struct OutflowAdapter {
    client: Arc<ProviderClient>,
    config: ProviderConfig,
}

impl OutflowAdapter {
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
            auth: AuthVariant::HeaderApiKey(api_key),
            backoff_step: std::time::Duration::from_secs(self.config.backoff_step_secs),
            deadline,
        }
    }
}

/// Outflow status labels → unified status. Unrecognized labels are
/// lower-cased and parsed lossily.
fn map_status(raw: &str) -> CampaignStatus {
    match raw {
        "Active" => CampaignStatus::Active,
        "Paused" => CampaignStatus::Paused,
        "Stopped" => CampaignStatus::Stopped,
        "Draft" | "New" => CampaignStatus::Draft,
        "Archived" => CampaignStatus::Archived,
        other => CampaignStatus::parse_lossy(other),
    }
}

/// Locate the array of steps inside a steps response. Accounts differ in
/// where the API nests them.
fn find_step_array(response: &Value) -> Option<&Vec<Value>> {
    if let Some(array) = response.as_array() {
        return Some(array);
    }
    for path in [
        &["steps"][..],
        &["emails"][..],
        &["items"][..],
        &["sequence", "emails"][..],
    ] {
        if let Some(array) = lookup_path(response, path).and_then(Value::as_array) {
            return Some(array);
        }
    }
    None
}

fn lookup_path<'a>(response: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = response;
    for key in path {
        node = node.get(key)?;
    }
    Some(node)
}

/// A step counts as an email step when its `type` is absent, empty, or one
/// of the known email kinds.
fn is_email_step(step: &Value) -> bool {
    match step.get("type").and_then(Value::as_str) {
        None => true,
        Some(kind) => {
            kind.is_empty() || EMAIL_STEP_TYPES.contains(&kind.to_ascii_lowercase().as_str())
        }
    }
}

/// Templates live under `.templates` or `.emails`; if neither exists the
/// step itself may carry subject/body.
fn step_template(step: &Value) -> Option<&Value> {
    for key in ["templates", "emails"] {
        if let Some(first) = step.get(key).and_then(Value::as_array).and_then(|a| a.first()) {
            return Some(first);
        }
    }
    if step.get("subject").is_some() || step.get("body").is_some() {
        return Some(step);
    }
    None
}

#[async_trait]
impl ProviderAdapter for OutflowAdapter {
    fn provider(&self) -> Provider {
        Provider::Outflow
    }

    async fn list_campaigns(
        &self,
        conn: &ApiConnection,
        deadline: Option<Instant>,
    ) -> AtlasResult<Vec<CampaignSummary>> {
        let url = format!("{}/sequences", self.config.base_url);
        let page_size = self.config.page_size;
        let mut campaigns = Vec::new();
        let mut skip = 0usize;

        loop {
            let query = [
                ("top", page_size.to_string()),
                ("skip", skip.to_string()),
            ];
            let Some(response) = self
                .client
                .get(
                    Provider::Outflow,
                    &url,
                    &query,
                    self.opts(&conn.api_key, Lane::List, false, deadline),
                )
                .await?
            else {
                break;
            };

            let items = response
                .as_array()
                .cloned()
                .or_else(|| {
                    ["sequences", "items", "data"]
                        .iter()
                        .find_map(|key| response.get(key).and_then(Value::as_array).cloned())
                })
                .unwrap_or_default();
            let page_len = items.len();

            for item in &items {
                let Some(platform_id) = string_field(item, &["id", "sequenceId"]) else {
                    warn!(provider = "outflow", "Sequence entry without id, skipping");
                    continue;
                };
                let status = string_field(item, &["status"])
                    .map(|s| map_status(&s))
                    .unwrap_or(CampaignStatus::Unknown);
                campaigns.push(CampaignSummary {
                    platform_id,
                    name: string_field(item, &["name"]).unwrap_or_else(|| "Untitled".to_string()),
                    status,
                    created_at: date_field(item, &["createdAt", "created_at"]),
                });
            }

            if page_len < page_size {
                break;
            }
            skip += page_size;
        }
        Ok(campaigns)
    }

    async fn fetch_campaign_stats(
        &self,
        conn: &ApiConnection,
        campaign: &CampaignSummary,
        deadline: Option<Instant>,
    ) -> AtlasResult<Option<LifetimeCounters>> {
        let url = format!("{}/v1/campaigns", self.config.base_url);
        let query = [("id", campaign.platform_id.clone())];
        let Some(response) = self
            .client
            .get(
                Provider::Outflow,
                &url,
                &query,
                self.opts(&conn.api_key, Lane::Stats, true, deadline),
            )
            .await?
        else {
            return Ok(None);
        };

        // The v1 endpoint wraps the object in `data` or returns a
        // single-element array depending on account generation.
        let mut stats = response.get("data").unwrap_or(&response);
        if let Some(first) = stats.as_array().and_then(|a| a.first()) {
            stats = first;
        }

        let counters = LifetimeCounters {
            sent: first_u64(stats, SENT_KEYS).unwrap_or(0),
            opened: first_u64(stats, OPENED_KEYS).unwrap_or(0),
            clicked: first_u64(stats, CLICKED_KEYS).unwrap_or(0),
            replied: first_u64(stats, REPLIED_KEYS).unwrap_or(0),
            bounced: first_u64(stats, BOUNCED_KEYS).unwrap_or(0),
            interested: first_u64(stats, INTERESTED_KEYS).unwrap_or(0),
        };
        if first_u64(stats, SENT_KEYS).is_none() {
            warn!(
                provider = "outflow",
                campaign = %campaign.platform_id,
                "No recognizable sent counter in stats response"
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
            "{}/sequences/{}/steps",
            self.config.base_url, campaign.platform_id
        );
        let Some(response) = self
            .client
            .get(
                Provider::Outflow,
                &url,
                &[],
                self.opts(&conn.api_key, Lane::List, true, deadline),
            )
            .await?
        else {
            return Ok(Vec::new());
        };

        let Some(raw_steps) = find_step_array(&response) else {
            warn!(
                provider = "outflow",
                campaign = %campaign.platform_id,
                "Steps response without a recognizable step array"
            );
            return Ok(Vec::new());
        };

        let mut steps = Vec::new();
        for (index, raw) in raw_steps.iter().enumerate() {
            if !is_email_step(raw) {
                continue;
            }
            let Some(template) = step_template(raw) else {
                continue;
            };
            let step_number = first_u64(raw, &["stepNumber", "step_number", "position"])
                .unwrap_or(index as u64 + 1) as u32;
            let subject = string_field(template, &["subject"]).unwrap_or_default();
            let body = string_field(template, &["body", "bodyHtml", "text"]).unwrap_or_default();
            let delay_days =
                first_u64(raw, &["delayDays", "delay_days", "delayInDays"]).unwrap_or(0) as u32;
            let personalization_vars = extract_variables(&subject, &body);
            steps.push(StepDraft {
                step_number,
                name: string_field(raw, &["name"])
                    .or_else(|| string_field(template, &["name"]))
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
        let url = format!("{}/people", self.config.base_url);
        let Some(response) = self
            .client
            .get(
                Provider::Outflow,
                &url,
                &[("email", email.to_string())],
                self.opts(&conn.api_key, Lane::List, true, None),
            )
            .await?
        else {
            return Ok(ContactPresence::absent(Provider::Outflow));
        };

        let person = response
            .get("people")
            .or_else(|| response.get("data"))
            .unwrap_or(&response);
        let person = if let Some(array) = person.as_array() {
            match array.first() {
                Some(first) => first,
                None => return Ok(ContactPresence::absent(Provider::Outflow)),
            }
        } else if person.is_null() {
            return Ok(ContactPresence::absent(Provider::Outflow));
        } else {
            person
        };

        let snippets = person
            .get("messages")
            .or_else(|| person.get("history"))
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(|m| string_field(m, &["body", "message", "text"]))
                    .take(5)
                    .collect()
            })
            .unwrap_or_default();

        Ok(ContactPresence {
            provider: Provider::Outflow,
            found: true,
            campaign_name: string_field(person, &["sequenceName", "campaign_name"]),
            snippets,
        })
    }
}

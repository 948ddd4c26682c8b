//! Uniform interface over the two outreach platforms.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use atlas_core::config::ProvidersConfig;
use atlas_core::types::{ApiConnection, CampaignSummary, LifetimeCounters, Provider};
use atlas_core::AtlasResult;

use crate::client::ProviderClient;
use crate::outflow::OutflowAdapter;
use crate::sendline::SendlineAdapter;

/// A sequence email as extracted from a provider, before local rows exist.
#[derive(Debug, Clone)]
pub struct StepDraft {
    pub step_number: u32,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub delay_days: u32,
    pub personalization_vars: Vec<String>,
}

/// Result of a per-provider contact lookup.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContactPresence {
    pub provider: Provider,
    pub found: bool,
    pub campaign_name: Option<String>,
    /// Most recent message-history snippets, newest first.
    pub snippets: Vec<String>,
}

impl ContactPresence {
    pub fn absent(provider: Provider) -> Self {
        Self {
            provider,
            found: false,
            campaign_name: None,
            snippets: Vec::new(),
        }
    }
}

/// Translate one provider's endpoints into the internal event stream.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Fetch the full campaign list, paginating as the provider requires.
    async fn list_campaigns(
        &self,
        conn: &ApiConnection,
        deadline: Option<Instant>,
    ) -> AtlasResult<Vec<CampaignSummary>>;

    /// Fetch lifetime counters for one campaign. `Ok(None)` means the
    /// provider has no stats for it (tolerated 404).
    async fn fetch_campaign_stats(
        &self,
        conn: &ApiConnection,
        campaign: &CampaignSummary,
        deadline: Option<Instant>,
    ) -> AtlasResult<Option<LifetimeCounters>>;

    /// Fetch the campaign's sequence steps.
    async fn fetch_steps(
        &self,
        conn: &ApiConnection,
        campaign: &CampaignSummary,
        deadline: Option<Instant>,
    ) -> AtlasResult<Vec<StepDraft>>;

    /// Look up a contact by email, returning presence and recent messages.
    async fn search_contact(
        &self,
        conn: &ApiConnection,
        email: &str,
    ) -> AtlasResult<ContactPresence>;
}

/// Hands out the adapter for a provider. The orchestrator depends on this
/// seam so tests can substitute scripted adapters.
pub trait AdapterFactory: Send + Sync {
    fn adapter(&self, provider: Provider) -> Arc<dyn ProviderAdapter>;
}

/// Production factory backed by the shared rate-limited client.
pub struct LiveAdapterFactory {
    sendline: Arc<SendlineAdapter>,
    outflow: Arc<OutflowAdapter>,
}

impl LiveAdapterFactory {
    pub fn new(client: Arc<ProviderClient>, config: &ProvidersConfig) -> Self {
        Self {
            sendline: Arc::new(SendlineAdapter::new(client.clone(), config.sendline.clone())),
            outflow: Arc::new(OutflowAdapter::new(client, config.outflow.clone())),
        }
    }
}

impl AdapterFactory for LiveAdapterFactory {
    fn adapter(&self, provider: Provider) -> Arc<dyn ProviderAdapter> {
        match provider {
            Provider::Sendline => self.sendline.clone(),
            Provider::Outflow => self.outflow.clone(),
        }
    }
}

// ─── JSON probing helpers ───────────────────────────────────────────────

/// First non-null numeric value among `keys`, in priority order.
pub(crate) fn first_u64(value: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|key| value.get(key).and_then(as_u64_lossy))
}

/// Accept integers, floats, and numeric strings; clamp negatives to zero.
pub(crate) fn as_u64_lossy(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    if let Some(f) = value.as_f64() {
        return Some(f.max(0.0) as u64);
    }
    value.as_str().and_then(|s| s.parse::<u64>().ok())
}

pub(crate) fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value.get(key).and_then(|v| {
            v.as_str()
                .map(str::to_string)
                .or_else(|| v.as_u64().map(|n| n.to_string()))
        })
    })
}

/// Parse a provider date: bare `YYYY-MM-DD` or an RFC 3339 timestamp.
pub(crate) fn date_field(value: &Value, keys: &[&str]) -> Option<chrono::NaiveDate> {
    string_field(value, keys).and_then(|raw| {
        let prefix = raw.get(..10).unwrap_or(&raw);
        chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
    })
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Providers ──────────────────────────────────────────────────────────

/// Outreach platforms the backplane ingests from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Primary platform ("Provider A"): query-string API key, fast pacing.
    Sendline,
    /// Secondary platform ("Provider B"): header API key, slow stats endpoint.
    Outflow,
}

impl Provider {
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Sendline => "Sendline",
            Provider::Outflow => "Outflow",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Sendline => "sendline",
            Provider::Outflow => "outflow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "sendline" => Some(Provider::Sendline),
            "outflow" => Some(Provider::Outflow),
            _ => None,
        }
    }
}

// ─── Workspaces & connections ───────────────────────────────────────────

/// Tenant boundary. Owns every other entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Per-workspace, per-provider credential and sync state.
/// At most one row per (workspace, provider).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConnection {
    pub workspace_id: Uuid,
    pub provider: Provider,
    pub api_key: String,
    pub is_active: bool,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_full_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sync_progress: SyncProgress,
}

impl ApiConnection {
    pub fn new(workspace_id: Uuid, provider: Provider, api_key: String) -> Self {
        Self {
            workspace_id,
            provider,
            api_key,
            is_active: true,
            sync_status: SyncStatus::Pending,
            last_sync_at: None,
            last_full_sync_at: None,
            sync_progress: SyncProgress::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    /// Stopped on the time budget; a continuation batch is enqueued.
    Partial,
    Success,
    CompletedWithErrors,
    /// Deliberate stop from the caller; continuations observe this and exit.
    Stopped,
    Error,
}

/// Resumable sync cursor persisted on the connection between batches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    #[serde(default)]
    pub batch_index: u32,
    #[serde(default)]
    pub campaign_index: usize,
    #[serde(default)]
    pub total_campaigns: usize,
    #[serde(default)]
    pub current_campaign_name: String,
    /// Campaign list snapshotted on first fetch so resumption preserves order.
    #[serde(default)]
    pub cached_campaign_list: Vec<CampaignSummary>,
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub heartbeat_at: Option<DateTime<Utc>>,
}

// ─── Campaigns ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Stopped,
    Draft,
    Archived,
    Unknown,
}

impl CampaignStatus {
    /// Parse a lower-cased provider status, mapping anything unrecognized to
    /// `Unknown`.
    pub fn parse_lossy(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "active" => CampaignStatus::Active,
            "paused" => CampaignStatus::Paused,
            "stopped" => CampaignStatus::Stopped,
            "draft" => CampaignStatus::Draft,
            "archived" => CampaignStatus::Archived,
            _ => CampaignStatus::Unknown,
        }
    }
}

/// A campaign as listed by a provider, before any local rows exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSummary {
    pub platform_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub created_at: Option<NaiveDate>,
}

/// Unified campaign row. Unique by (workspace, provider, platform_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub provider: Provider,
    pub platform_id: String,
    pub name: String,
    pub status: CampaignStatus,
    pub total_sent: u64,
    pub total_opened: u64,
    pub total_clicked: u64,
    pub total_replied: u64,
    pub total_bounced: u64,
    pub total_positive_replies: u64,
    pub total_meetings: u64,
    pub created_at: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

/// One email in a campaign's ordered cadence. Unique by (campaign, step_number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub campaign_id: Uuid,
    pub step_number: u32,
    pub name: String,
    pub subject: String,
    pub body: String,
    /// First 200 characters of the body.
    pub body_preview: String,
    pub delay_days: u32,
    pub personalization_vars: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Lifetime counters as reported by a provider for one campaign.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifetimeCounters {
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
    pub bounced: u64,
    pub interested: u64,
}

/// Last-observed lifetime counters per campaign, the delta baseline.
/// Unique by campaign. `baseline_*` is set exactly once and never overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignCumulative {
    pub campaign_id: Uuid,
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
    pub bounced: u64,
    pub interested: u64,
    pub baseline_sent: u64,
    pub baseline_opened: u64,
    pub baseline_clicked: u64,
    pub baseline_replied: u64,
    pub baseline_bounced: u64,
    pub first_synced_at: DateTime<Utc>,
    pub last_synced_at: DateTime<Utc>,
}

// ─── Metrics ────────────────────────────────────────────────────────────

/// Per-campaign per-calendar-date counts. Unique by (campaign, metric_date).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignDailyMetric {
    pub campaign_id: Uuid,
    pub metric_date: NaiveDate,
    pub sent_count: u64,
    pub opened_count: u64,
    pub clicked_count: u64,
    pub replied_count: u64,
    pub positive_count: u64,
    pub bounced_count: u64,
}

impl CampaignDailyMetric {
    pub fn new(campaign_id: Uuid, metric_date: NaiveDate) -> Self {
        Self {
            campaign_id,
            metric_date,
            ..Self::default()
        }
    }
}

/// Workspace rollup over the trailing window. Unique by
/// (workspace, provider, metric_date).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceDailyMetric {
    pub workspace_id: Uuid,
    pub provider: Provider,
    pub metric_date: NaiveDate,
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
    pub positive_replies: u64,
    pub bounced: u64,
    pub active_campaigns: u64,
}

/// Hour-of-week counter bucket. Unique by
/// (workspace, campaign, metric_date, day_of_week, hour_of_day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyMetric {
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub metric_date: NaiveDate,
    pub day_of_week: u8,
    pub hour_of_day: u8,
    pub emails_sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
    pub bounced: u64,
}

// ─── Contacts & activity ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Active,
    Bounced,
}

/// Per-workspace contact. Unique by (workspace, email). Survives campaign
/// deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub email: String,
    pub company_id: Option<Uuid>,
    pub email_status: EmailStatus,
    pub do_not_email: bool,
    pub created_at: DateTime<Utc>,
}

/// Company derived lazily from a contact's email domain. Unique by
/// (workspace, domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub domain: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Unified per-contact per-step activity record. Unique by
/// (workspace, campaign, contact, step_number). Flags are monotonic: a later
/// event never un-sets an earlier flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailActivity {
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub step_number: u32,
    pub sent: bool,
    pub opened: bool,
    pub clicked: bool,
    pub replied: bool,
    pub bounced: bool,
    pub unsubscribed: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub first_opened_at: Option<DateTime<Utc>>,
    pub first_clicked_at: Option<DateTime<Utc>>,
    pub replied_at: Option<DateTime<Utc>>,
    pub open_count: u64,
    pub click_count: u64,
    pub reply_text: Option<String>,
    pub reply_category: Option<ReplyCategory>,
    pub reply_sentiment: Option<ReplySentiment>,
    pub bounce_type: Option<String>,
    pub bounce_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl EmailActivity {
    pub fn new(workspace_id: Uuid, campaign_id: Uuid, contact_id: Uuid, step_number: u32) -> Self {
        Self {
            workspace_id,
            campaign_id,
            contact_id,
            step_number,
            sent: false,
            opened: false,
            clicked: false,
            replied: false,
            bounced: false,
            unsubscribed: false,
            sent_at: None,
            first_opened_at: None,
            first_clicked_at: None,
            replied_at: None,
            open_count: 0,
            click_count: 0,
            reply_text: None,
            reply_category: None,
            reply_sentiment: None,
            bounce_type: None,
            bounce_reason: None,
            updated_at: Utc::now(),
        }
    }
}

// ─── Webhook events & replies ───────────────────────────────────────────

/// Raw event log row. Unique by (provider, event_id); duplicate inserts are
/// idempotent no-ops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: Provider,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// Reply body captured from a webhook. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageThread {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkClick {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub step_number: u32,
    pub url: String,
    pub clicked_at: DateTime<Utc>,
}

// ─── Reply classification ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyCategory {
    Interested,
    MeetingRequest,
    NotInterested,
    OutOfOffice,
    Referral,
    Unsubscribe,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySentiment {
    Positive,
    Negative,
    Neutral,
}

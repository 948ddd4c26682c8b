//! In-memory persistence gateway backed by DashMap.
//!
//! Production: replace with PostgreSQL (sqlx) or similar ACID store.
//! This provides the same API surface for development and testing.
//!
//! Counter mutations happen ONLY inside the atomic RPCs here
//! (`increment_campaign_metric`, `record_daily_metric`,
//! `record_hourly_metric`, `update_positive_reply_counts`) — callers never
//! read-modify-write a counter. Each method holds a single entry lock for the
//! duration of the update, giving the same effect as
//! `INSERT ... ON CONFLICT DO UPDATE SET x = x + excluded.x`.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use atlas_core::types::{
    ApiConnection, Campaign, CampaignCumulative, CampaignDailyMetric, CampaignSummary, Company,
    Contact, EmailActivity, EmailStatus, HourlyMetric, LifetimeCounters, LinkClick, MessageThread,
    Provider, SequenceStep, WebhookEvent, Workspace, WorkspaceDailyMetric,
};

/// Consumer mailbox domains that never become a Company.
const PERSONAL_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "aol.com",
    "icloud.com",
    "proton.me",
    "protonmail.com",
    "gmx.com",
    "live.com",
    "msn.com",
];

/// Campaign lifetime counters addressable by the atomic increment RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignMetric {
    Sent,
    Opened,
    Clicked,
    Replied,
    Bounced,
    PositiveReplies,
    Meetings,
}

/// Per-field hourly counter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourlyField {
    EmailsSent,
    Opened,
    Clicked,
    Replied,
    Bounced,
}

/// Additive daily-metric delta. Zero fields leave the row untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DailyDelta {
    pub sent: u64,
    pub opened: u64,
    pub clicked: u64,
    pub replied: u64,
    pub positive: u64,
    pub bounced: u64,
}

impl DailyDelta {
    pub fn is_zero(&self) -> bool {
        self.sent == 0
            && self.opened == 0
            && self.clicked == 0
            && self.replied == 0
            && self.positive == 0
            && self.bounced == 0
    }
}

/// Conflict key of an [`EmailActivity`] row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActivityKey {
    pub workspace_id: Uuid,
    pub campaign_id: Uuid,
    pub contact_id: Uuid,
    pub step_number: u32,
}

/// Outcome of a uniqueness-guarded insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Thread-safe in-memory store for the unified outreach schema.
pub struct AtlasStore {
    workspaces: DashMap<Uuid, Workspace>,
    connections: DashMap<(Uuid, Provider), ApiConnection>,
    campaigns: DashMap<Uuid, Campaign>,
    campaign_index: DashMap<(Uuid, Provider, String), Uuid>,
    steps: DashMap<(Uuid, u32), SequenceStep>,
    cumulatives: DashMap<Uuid, CampaignCumulative>,
    daily_metrics: DashMap<(Uuid, NaiveDate), CampaignDailyMetric>,
    workspace_daily: DashMap<(Uuid, Provider, NaiveDate), WorkspaceDailyMetric>,
    hourly_metrics: DashMap<(Uuid, Uuid, NaiveDate, u8, u8), HourlyMetric>,
    contacts: DashMap<Uuid, Contact>,
    contact_index: DashMap<(Uuid, String), Uuid>,
    companies: DashMap<(Uuid, String), Company>,
    activities: DashMap<ActivityKey, EmailActivity>,
    webhook_events: DashMap<(Provider, String), WebhookEvent>,
    message_threads: DashMap<Uuid, Vec<MessageThread>>,
    link_clicks: DashMap<Uuid, Vec<LinkClick>>,
}

impl AtlasStore {
    pub fn new() -> Self {
        info!("Atlas store initialized (in-memory, development mode)");
        Self {
            workspaces: DashMap::new(),
            connections: DashMap::new(),
            campaigns: DashMap::new(),
            campaign_index: DashMap::new(),
            steps: DashMap::new(),
            cumulatives: DashMap::new(),
            daily_metrics: DashMap::new(),
            workspace_daily: DashMap::new(),
            hourly_metrics: DashMap::new(),
            contacts: DashMap::new(),
            contact_index: DashMap::new(),
            companies: DashMap::new(),
            activities: DashMap::new(),
            webhook_events: DashMap::new(),
            message_threads: DashMap::new(),
            link_clicks: DashMap::new(),
        }
    }

    // ─── Workspaces & connections ──────────────────────────────────────

    pub fn upsert_workspace(&self, workspace: Workspace) {
        self.workspaces.insert(workspace.id, workspace);
    }

    pub fn get_workspace(&self, id: Uuid) -> Option<Workspace> {
        self.workspaces.get(&id).map(|w| w.clone())
    }

    pub fn put_connection(&self, connection: ApiConnection) {
        self.connections
            .insert((connection.workspace_id, connection.provider), connection);
    }

    pub fn get_connection(&self, workspace_id: Uuid, provider: Provider) -> Option<ApiConnection> {
        self.connections
            .get(&(workspace_id, provider))
            .map(|c| c.clone())
    }

    /// Mutate the connection row in place. Returns false when no row exists.
    pub fn update_connection(
        &self,
        workspace_id: Uuid,
        provider: Provider,
        f: impl FnOnce(&mut ApiConnection),
    ) -> bool {
        match self.connections.get_mut(&(workspace_id, provider)) {
            Some(mut connection) => {
                f(&mut connection);
                true
            }
            None => false,
        }
    }

    // ─── Campaigns ─────────────────────────────────────────────────────

    /// Upsert on the (workspace, provider, platform_id) conflict key.
    /// Name/status/created_at follow the provider; cumulative totals are
    /// preserved across upserts.
    pub fn upsert_campaign(
        &self,
        workspace_id: Uuid,
        provider: Provider,
        summary: &CampaignSummary,
    ) -> Campaign {
        let key = (workspace_id, provider, summary.platform_id.clone());
        if let Some(id) = self.campaign_index.get(&key).map(|e| *e) {
            if let Some(mut campaign) = self.campaigns.get_mut(&id) {
                campaign.name = summary.name.clone();
                campaign.status = summary.status;
                if campaign.created_at.is_none() {
                    campaign.created_at = summary.created_at;
                }
                campaign.updated_at = Utc::now();
                return campaign.clone();
            }
        }
        let campaign = Campaign {
            id: Uuid::new_v4(),
            workspace_id,
            provider,
            platform_id: summary.platform_id.clone(),
            name: summary.name.clone(),
            status: summary.status,
            total_sent: 0,
            total_opened: 0,
            total_clicked: 0,
            total_replied: 0,
            total_bounced: 0,
            total_positive_replies: 0,
            total_meetings: 0,
            created_at: summary.created_at,
            updated_at: Utc::now(),
        };
        self.campaign_index.insert(key, campaign.id);
        self.campaigns.insert(campaign.id, campaign.clone());
        campaign
    }

    pub fn get_campaign(&self, id: Uuid) -> Option<Campaign> {
        self.campaigns.get(&id).map(|c| c.clone())
    }

    /// Resolve a campaign from its external id, across workspaces.
    pub fn find_campaign_by_platform(
        &self,
        provider: Provider,
        platform_id: &str,
    ) -> Option<Campaign> {
        self.campaign_index
            .iter()
            .find(|entry| entry.key().1 == provider && entry.key().2 == platform_id)
            .and_then(|entry| self.get_campaign(*entry.value()))
    }

    pub fn campaigns_for(&self, workspace_id: Uuid, provider: Provider) -> Vec<Campaign> {
        self.campaigns
            .iter()
            .filter(|c| c.workspace_id == workspace_id && c.provider == provider)
            .map(|c| c.clone())
            .collect()
    }

    /// Overwrite campaign lifetime totals from freshly-fetched provider
    /// counters (sync path).
    pub fn set_campaign_totals(&self, campaign_id: Uuid, counters: &LifetimeCounters) {
        if let Some(mut campaign) = self.campaigns.get_mut(&campaign_id) {
            campaign.total_sent = counters.sent;
            campaign.total_opened = counters.opened;
            campaign.total_clicked = counters.clicked;
            campaign.total_replied = counters.replied;
            campaign.total_bounced = counters.bounced;
            campaign.total_positive_replies = counters.interested;
            campaign.updated_at = Utc::now();
        }
    }

    /// Atomic `total_x = total_x + delta` (webhook path).
    pub fn increment_campaign_metric(
        &self,
        campaign_id: Uuid,
        metric: CampaignMetric,
        delta: u64,
    ) {
        if let Some(mut campaign) = self.campaigns.get_mut(&campaign_id) {
            let slot = match metric {
                CampaignMetric::Sent => &mut campaign.total_sent,
                CampaignMetric::Opened => &mut campaign.total_opened,
                CampaignMetric::Clicked => &mut campaign.total_clicked,
                CampaignMetric::Replied => &mut campaign.total_replied,
                CampaignMetric::Bounced => &mut campaign.total_bounced,
                CampaignMetric::PositiveReplies => &mut campaign.total_positive_replies,
                CampaignMetric::Meetings => &mut campaign.total_meetings,
            };
            *slot += delta;
            campaign.updated_at = Utc::now();
        }
    }

    // ─── Sequence steps ────────────────────────────────────────────────

    /// Upsert on the (campaign, step_number) conflict key.
    pub fn upsert_step(&self, step: SequenceStep) {
        self.steps.insert((step.campaign_id, step.step_number), step);
    }

    pub fn steps_for(&self, campaign_id: Uuid) -> Vec<SequenceStep> {
        let mut steps: Vec<SequenceStep> = self
            .steps
            .iter()
            .filter(|s| s.campaign_id == campaign_id)
            .map(|s| s.clone())
            .collect();
        steps.sort_by_key(|s| s.step_number);
        steps
    }

    // ─── Cumulatives ───────────────────────────────────────────────────

    pub fn get_cumulative(&self, campaign_id: Uuid) -> Option<CampaignCumulative> {
        self.cumulatives.get(&campaign_id).map(|c| c.clone())
    }

    pub fn put_cumulative(&self, cumulative: CampaignCumulative) {
        self.cumulatives.insert(cumulative.campaign_id, cumulative);
    }

    // ─── Daily metrics ─────────────────────────────────────────────────

    /// Atomic additive upsert on the (campaign, metric_date) conflict key.
    pub fn record_daily_metric(&self, campaign_id: Uuid, date: NaiveDate, delta: DailyDelta) {
        if delta.is_zero() {
            return;
        }
        let mut row = self
            .daily_metrics
            .entry((campaign_id, date))
            .or_insert_with(|| CampaignDailyMetric::new(campaign_id, date));
        row.sent_count += delta.sent;
        row.opened_count += delta.opened;
        row.clicked_count += delta.clicked;
        row.replied_count += delta.replied;
        row.positive_count += delta.positive;
        row.bounced_count += delta.bounced;
    }

    pub fn daily_metric(&self, campaign_id: Uuid, date: NaiveDate) -> Option<CampaignDailyMetric> {
        self.daily_metrics.get(&(campaign_id, date)).map(|m| m.clone())
    }

    pub fn daily_metrics_for_campaign(&self, campaign_id: Uuid) -> Vec<CampaignDailyMetric> {
        let mut rows: Vec<CampaignDailyMetric> = self
            .daily_metrics
            .iter()
            .filter(|m| m.campaign_id == campaign_id)
            .map(|m| m.clone())
            .collect();
        rows.sort_by_key(|m| m.metric_date);
        rows
    }

    /// Daily rows for all of a workspace's campaigns on one provider, dated
    /// on or after `cutoff`.
    pub fn daily_metrics_since(
        &self,
        workspace_id: Uuid,
        provider: Provider,
        cutoff: NaiveDate,
    ) -> Vec<CampaignDailyMetric> {
        let campaign_ids: std::collections::HashSet<Uuid> = self
            .campaigns_for(workspace_id, provider)
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.daily_metrics
            .iter()
            .filter(|m| m.metric_date >= cutoff && campaign_ids.contains(&m.campaign_id))
            .map(|m| m.clone())
            .collect()
    }

    // ─── Workspace rollups ─────────────────────────────────────────────

    pub fn put_workspace_daily(&self, row: WorkspaceDailyMetric) {
        self.workspace_daily
            .insert((row.workspace_id, row.provider, row.metric_date), row);
    }

    pub fn workspace_daily(
        &self,
        workspace_id: Uuid,
        provider: Provider,
        date: NaiveDate,
    ) -> Option<WorkspaceDailyMetric> {
        self.workspace_daily
            .get(&(workspace_id, provider, date))
            .map(|m| m.clone())
    }

    // ─── Hourly metrics ────────────────────────────────────────────────

    /// Atomic additive upsert on the (workspace, campaign, date, dow, hour)
    /// conflict key.
    pub fn record_hourly_metric(
        &self,
        workspace_id: Uuid,
        campaign_id: Uuid,
        at: DateTime<Utc>,
        field: HourlyField,
        delta: u64,
    ) {
        let date = at.date_naive();
        let day_of_week = at.weekday().num_days_from_monday() as u8;
        let hour_of_day = at.hour() as u8;
        let mut row = self
            .hourly_metrics
            .entry((workspace_id, campaign_id, date, day_of_week, hour_of_day))
            .or_insert_with(|| HourlyMetric {
                workspace_id,
                campaign_id,
                metric_date: date,
                day_of_week,
                hour_of_day,
                emails_sent: 0,
                opened: 0,
                clicked: 0,
                replied: 0,
                bounced: 0,
            });
        let slot = match field {
            HourlyField::EmailsSent => &mut row.emails_sent,
            HourlyField::Opened => &mut row.opened,
            HourlyField::Clicked => &mut row.clicked,
            HourlyField::Replied => &mut row.replied,
            HourlyField::Bounced => &mut row.bounced,
        };
        *slot += delta;
    }

    pub fn hourly_metric(
        &self,
        workspace_id: Uuid,
        campaign_id: Uuid,
        date: NaiveDate,
        day_of_week: u8,
        hour_of_day: u8,
    ) -> Option<HourlyMetric> {
        self.hourly_metrics
            .get(&(workspace_id, campaign_id, date, day_of_week, hour_of_day))
            .map(|m| m.clone())
    }

    // ─── Positive replies ──────────────────────────────────────────────

    /// Bump the campaign lifetime positive-reply counter and the daily
    /// positive bucket together.
    pub fn update_positive_reply_counts(&self, campaign_id: Uuid, date: NaiveDate) {
        self.increment_campaign_metric(campaign_id, CampaignMetric::PositiveReplies, 1);
        self.record_daily_metric(
            campaign_id,
            date,
            DailyDelta {
                positive: 1,
                ..DailyDelta::default()
            },
        );
    }

    // ─── Contacts & companies ──────────────────────────────────────────

    pub fn find_contact(&self, workspace_id: Uuid, email: &str) -> Option<Contact> {
        let email = email.to_lowercase();
        self.contact_index
            .get(&(workspace_id, email))
            .and_then(|id| self.contacts.get(&id).map(|c| c.clone()))
    }

    /// Fetch or create the contact for (workspace, email), lazily creating
    /// its Company from the email domain unless the domain is a personal
    /// mailbox provider.
    pub fn get_or_create_contact(&self, workspace_id: Uuid, email: &str) -> Contact {
        let email = email.to_lowercase();
        if let Some(existing) = self.find_contact(workspace_id, &email) {
            return existing;
        }

        let company_id = email
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .filter(|domain| !PERSONAL_DOMAINS.contains(domain))
            .map(|domain| self.get_or_create_company(workspace_id, domain).id);

        let contact = Contact {
            id: Uuid::new_v4(),
            workspace_id,
            email: email.clone(),
            company_id,
            email_status: EmailStatus::Active,
            do_not_email: false,
            created_at: Utc::now(),
        };
        self.contact_index
            .insert((workspace_id, email), contact.id);
        self.contacts.insert(contact.id, contact.clone());
        contact
    }

    fn get_or_create_company(&self, workspace_id: Uuid, domain: &str) -> Company {
        if let Some(existing) = self.companies.get(&(workspace_id, domain.to_string())) {
            return existing.clone();
        }
        let name = domain
            .split('.')
            .next()
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .unwrap_or_else(|| domain.to_string());
        let company = Company {
            id: Uuid::new_v4(),
            workspace_id,
            domain: domain.to_string(),
            name,
            created_at: Utc::now(),
        };
        self.companies
            .insert((workspace_id, domain.to_string()), company.clone());
        company
    }

    pub fn company_for_domain(&self, workspace_id: Uuid, domain: &str) -> Option<Company> {
        self.companies
            .get(&(workspace_id, domain.to_string()))
            .map(|c| c.clone())
    }

    /// Mutate a contact row in place. Returns false when no row exists.
    pub fn update_contact(&self, contact_id: Uuid, f: impl FnOnce(&mut Contact)) -> bool {
        match self.contacts.get_mut(&contact_id) {
            Some(mut contact) => {
                f(&mut contact);
                true
            }
            None => false,
        }
    }

    // ─── Email activity ────────────────────────────────────────────────

    /// Upsert on the (workspace, campaign, contact, step) conflict key and
    /// apply `f` to the row. Flag mutations are expected to be monotonic:
    /// handlers set flags, they never clear them.
    pub fn upsert_activity(
        &self,
        key: ActivityKey,
        f: impl FnOnce(&mut EmailActivity),
    ) -> EmailActivity {
        let mut row = self.activities.entry(key).or_insert_with(|| {
            EmailActivity::new(
                key.workspace_id,
                key.campaign_id,
                key.contact_id,
                key.step_number,
            )
        });
        f(&mut row);
        row.updated_at = Utc::now();
        row.clone()
    }

    pub fn get_activity(&self, key: &ActivityKey) -> Option<EmailActivity> {
        self.activities.get(key).map(|a| a.clone())
    }

    // ─── Webhook events ────────────────────────────────────────────────

    /// Insert on the (provider, event_id) conflict key. A duplicate is an
    /// idempotent no-op and the caller must skip downstream processing.
    pub fn insert_webhook_event(&self, event: WebhookEvent) -> InsertOutcome {
        let key = (event.provider, event.event_id.clone());
        let mut outcome = InsertOutcome::Duplicate;
        self.webhook_events.entry(key).or_insert_with(|| {
            outcome = InsertOutcome::Inserted;
            event
        });
        outcome
    }

    pub fn mark_event_processed(&self, provider: Provider, event_id: &str) {
        if let Some(mut event) = self
            .webhook_events
            .get_mut(&(provider, event_id.to_string()))
        {
            event.processed = true;
            event.processed_at = Some(Utc::now());
        }
    }

    pub fn get_webhook_event(&self, provider: Provider, event_id: &str) -> Option<WebhookEvent> {
        self.webhook_events
            .get(&(provider, event_id.to_string()))
            .map(|e| e.clone())
    }

    pub fn unprocessed_webhook_events(&self, provider: Provider) -> Vec<WebhookEvent> {
        self.webhook_events
            .iter()
            .filter(|e| e.provider == provider && !e.processed)
            .map(|e| e.clone())
            .collect()
    }

    // ─── Message threads & link clicks ─────────────────────────────────

    pub fn append_message_thread(&self, thread: MessageThread) {
        self.message_threads
            .entry(thread.contact_id)
            .or_default()
            .push(thread);
    }

    pub fn threads_for_contact(&self, contact_id: Uuid) -> Vec<MessageThread> {
        self.message_threads
            .get(&contact_id)
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    pub fn insert_link_click(&self, click: LinkClick) {
        self.link_clicks
            .entry(click.contact_id)
            .or_default()
            .push(click);
    }

    pub fn clicks_for_contact(&self, contact_id: Uuid) -> Vec<LinkClick> {
        self.link_clicks
            .get(&contact_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    // ─── Reset ─────────────────────────────────────────────────────────

    /// Delete all campaign-scoped rows for (workspace, provider): daily
    /// metrics, cumulatives, steps, activities, and the campaigns
    /// themselves. Contacts and the raw webhook event log survive.
    pub fn reset_provider_data(&self, workspace_id: Uuid, provider: Provider) {
        let campaign_ids: Vec<Uuid> = self
            .campaigns_for(workspace_id, provider)
            .into_iter()
            .map(|c| c.id)
            .collect();
        let id_set: std::collections::HashSet<Uuid> = campaign_ids.iter().copied().collect();

        self.daily_metrics.retain(|_, m| !id_set.contains(&m.campaign_id));
        self.hourly_metrics.retain(|_, m| !id_set.contains(&m.campaign_id));
        self.steps.retain(|(campaign_id, _), _| !id_set.contains(campaign_id));
        self.activities.retain(|key, _| !id_set.contains(&key.campaign_id));
        for id in &campaign_ids {
            self.cumulatives.remove(id);
            self.campaigns.remove(id);
        }
        self.campaign_index
            .retain(|(ws, p, _), _| !(*ws == workspace_id && *p == provider));
        self.workspace_daily
            .retain(|(ws, p, _), _| !(*ws == workspace_id && *p == provider));

        info!(
            workspace_id = %workspace_id,
            provider = provider.as_str(),
            campaigns = campaign_ids.len(),
            "Provider data reset"
        );
    }
}

impl Default for AtlasStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::types::CampaignStatus;

    fn summary(platform_id: &str) -> CampaignSummary {
        CampaignSummary {
            platform_id: platform_id.to_string(),
            name: format!("Campaign {platform_id}"),
            status: CampaignStatus::Active,
            created_at: NaiveDate::from_ymd_opt(2025, 1, 1),
        }
    }

    #[test]
    fn test_campaign_upsert_conflict_key() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();

        let first = store.upsert_campaign(workspace, Provider::Sendline, &summary("42"));
        let mut renamed = summary("42");
        renamed.name = "Renamed".to_string();
        let second = store.upsert_campaign(workspace, Provider::Sendline, &renamed);

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Renamed");

        // Same platform id on the other provider is a distinct campaign.
        let other = store.upsert_campaign(workspace, Provider::Outflow, &summary("42"));
        assert_ne!(first.id, other.id);
    }

    #[test]
    fn test_increment_preserved_across_upsert() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let campaign = store.upsert_campaign(workspace, Provider::Sendline, &summary("7"));

        store.increment_campaign_metric(campaign.id, CampaignMetric::Sent, 3);
        store.upsert_campaign(workspace, Provider::Sendline, &summary("7"));

        assert_eq!(store.get_campaign(campaign.id).unwrap().total_sent, 3);
    }

    #[test]
    fn test_daily_metric_additive_upsert() {
        let store = AtlasStore::new();
        let campaign_id = Uuid::new_v4();
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();

        store.record_daily_metric(
            campaign_id,
            date,
            DailyDelta {
                sent: 100,
                opened: 30,
                ..DailyDelta::default()
            },
        );
        store.record_daily_metric(
            campaign_id,
            date,
            DailyDelta {
                sent: 10,
                replied: 3,
                ..DailyDelta::default()
            },
        );

        let row = store.daily_metric(campaign_id, date).unwrap();
        assert_eq!(row.sent_count, 110);
        assert_eq!(row.opened_count, 30);
        assert_eq!(row.replied_count, 3);
    }

    #[test]
    fn test_webhook_event_dedupe() {
        let store = AtlasStore::new();
        let event = WebhookEvent {
            provider: Provider::Sendline,
            event_id: "evt-777".to_string(),
            event_type: "EMAIL_OPEN".to_string(),
            payload: serde_json::json!({}),
            processed: false,
            processed_at: None,
            received_at: Utc::now(),
        };

        assert_eq!(store.insert_webhook_event(event.clone()), InsertOutcome::Inserted);
        assert_eq!(store.insert_webhook_event(event), InsertOutcome::Duplicate);
    }

    #[test]
    fn test_contact_company_lazy_creation() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();

        let corporate = store.get_or_create_contact(workspace, "Jo@Acme.com");
        assert_eq!(corporate.email, "jo@acme.com");
        assert!(corporate.company_id.is_some());
        assert_eq!(
            store.company_for_domain(workspace, "acme.com").unwrap().name,
            "Acme"
        );

        let personal = store.get_or_create_contact(workspace, "jo@gmail.com");
        assert!(personal.company_id.is_none());

        // Same email resolves to the same contact.
        let again = store.get_or_create_contact(workspace, "jo@acme.com");
        assert_eq!(corporate.id, again.id);
    }

    #[test]
    fn test_hourly_metric_bucketing() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let campaign = Uuid::new_v4();
        let at = DateTime::parse_from_rfc3339("2025-03-12T14:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        store.record_hourly_metric(workspace, campaign, at, HourlyField::EmailsSent, 1);
        store.record_hourly_metric(workspace, campaign, at, HourlyField::EmailsSent, 1);

        // 2025-03-12 is a Wednesday.
        let row = store
            .hourly_metric(workspace, campaign, at.date_naive(), 2, 14)
            .unwrap();
        assert_eq!(row.emails_sent, 2);
    }

    #[test]
    fn test_reset_scoped_to_provider() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let a = store.upsert_campaign(workspace, Provider::Sendline, &summary("1"));
        let b = store.upsert_campaign(workspace, Provider::Outflow, &summary("2"));
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        store.record_daily_metric(a.id, date, DailyDelta { sent: 5, ..DailyDelta::default() });
        store.record_daily_metric(b.id, date, DailyDelta { sent: 7, ..DailyDelta::default() });
        let contact = store.get_or_create_contact(workspace, "kept@acme.com");

        store.reset_provider_data(workspace, Provider::Sendline);

        assert!(store.get_campaign(a.id).is_none());
        assert!(store.daily_metric(a.id, date).is_none());
        assert!(store.get_campaign(b.id).is_some());
        assert_eq!(store.daily_metric(b.id, date).unwrap().sent_count, 7);
        // Contacts survive a reset.
        assert!(store.find_contact(workspace, &contact.email).is_some());
    }

    #[test]
    fn test_activity_flags_monotonic_usage() {
        let store = AtlasStore::new();
        let key = ActivityKey {
            workspace_id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            contact_id: Uuid::new_v4(),
            step_number: 1,
        };

        store.upsert_activity(key, |a| {
            a.sent = true;
            a.sent_at = Some(Utc::now());
        });
        let row = store.upsert_activity(key, |a| {
            a.opened = true;
            a.open_count += 1;
        });

        assert!(row.sent);
        assert!(row.opened);
        assert_eq!(row.open_count, 1);
    }
}

//! Drives the complete refresh of a (workspace, provider) pair under a
//! wall-clock time budget.
//!
//! The control flow is a persisted cursor, not a coroutine: when the budget
//! runs out mid-list, the cursor (`SyncProgress`) is written back to the
//! connection row and a self-continuation is enqueued. Only one orchestrator
//! drives a given (workspace, provider) at a time, which gives the delta
//! engine its single-writer-per-campaign invariant.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use atlas_core::types::{Provider, SequenceStep, SyncProgress, SyncStatus};
use atlas_core::{AppConfig, AtlasError, AtlasResult};
use atlas_providers::AdapterFactory;
use atlas_store::AtlasStore;

use crate::aggregator::aggregate_workspace_daily;
use crate::continuation::Continuation;
use crate::delta::compute_delta;

/// Progress heartbeat cadence, in campaigns.
const HEARTBEAT_EVERY: usize = 5;
/// A syncing connection with a heartbeat older than this is considered
/// abandoned and may be re-driven.
const STALE_HEARTBEAT_SECS: i64 = 120;
const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Destructive: delete all provider-scoped rows before syncing.
    pub reset: bool,
    /// Resume index override; wins over the persisted cursor.
    pub continue_at: Option<usize>,
    /// Set on self-continuations authenticated with the service credential.
    pub internal: bool,
    pub batch_number: u32,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// False when the batch stopped on the time budget and a continuation
    /// was enqueued.
    pub complete: bool,
    pub status: SyncStatus,
    pub progress: SyncProgress,
    pub duration_ms: u64,
}

pub struct SyncOrchestrator {
    store: Arc<AtlasStore>,
    adapters: Arc<dyn AdapterFactory>,
    config: AppConfig,
    continuation: Continuation,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<AtlasStore>, adapters: Arc<dyn AdapterFactory>, config: AppConfig) -> Self {
        let continuation = Continuation::new(&config);
        Self {
            store,
            adapters,
            config,
            continuation,
        }
    }

    /// Run one sync batch for (workspace, provider).
    pub async fn run_sync(
        &self,
        workspace_id: Uuid,
        provider: Provider,
        opts: SyncOptions,
    ) -> AtlasResult<SyncOutcome> {
        let started = Instant::now();
        let provider_cfg = self.config.provider(provider).clone();

        let connection = self
            .store
            .get_connection(workspace_id, provider)
            .ok_or_else(|| {
                AtlasError::MissingConnection(format!(
                    "no {} connection for workspace {workspace_id}",
                    provider.as_str()
                ))
            })?;
        if !connection.is_active {
            return Err(AtlasError::MissingConnection(format!(
                "{} connection for workspace {workspace_id} is disabled",
                provider.as_str()
            )));
        }
        if connection.api_key.is_empty() {
            self.persist_error(workspace_id, provider, "missing API key");
            return Err(AtlasError::Sync("missing API key".to_string()));
        }

        // A deliberate stop halts the continuation chain.
        if opts.internal && connection.sync_status == SyncStatus::Stopped {
            info!(
                workspace_id = %workspace_id,
                provider = provider.as_str(),
                "Sync stopped by operator; continuation exits"
            );
            return Ok(SyncOutcome {
                complete: true,
                status: SyncStatus::Stopped,
                progress: connection.sync_progress,
                duration_ms: 0,
            });
        }

        // One orchestrator per (workspace, provider): a live run returns its
        // progress snapshot instead of being re-driven.
        if connection.sync_status == SyncStatus::Syncing {
            let heartbeat_fresh = connection
                .sync_progress
                .heartbeat_at
                .is_some_and(|hb| (Utc::now() - hb).num_seconds() < STALE_HEARTBEAT_SECS);
            if heartbeat_fresh {
                debug!(
                    workspace_id = %workspace_id,
                    provider = provider.as_str(),
                    "Sync already in progress, returning snapshot"
                );
                return Ok(SyncOutcome {
                    complete: false,
                    status: SyncStatus::Syncing,
                    progress: connection.sync_progress,
                    duration_ms: 0,
                });
            }
            warn!(
                workspace_id = %workspace_id,
                provider = provider.as_str(),
                "Stale syncing heartbeat, taking over"
            );
        }

        if opts.batch_number > provider_cfg.max_batches {
            let message = format!(
                "sync exceeded the {}-batch cap for {}",
                provider_cfg.max_batches,
                provider.display_name()
            );
            self.persist_error(workspace_id, provider, &message);
            return Err(AtlasError::Sync(message));
        }

        if opts.reset {
            self.store.reset_provider_data(workspace_id, provider);
            self.store.update_connection(workspace_id, provider, |c| {
                c.sync_progress = SyncProgress::default();
            });
        }

        self.store.update_connection(workspace_id, provider, |c| {
            c.sync_status = SyncStatus::Syncing;
            c.sync_progress.step = "starting".to_string();
            c.sync_progress.batch_index = opts.batch_number;
            c.sync_progress.heartbeat_at = Some(Utc::now());
        });

        let adapter = self.adapters.adapter(provider);
        let deadline = started + Duration::from_secs(provider_cfg.deadline_secs);

        let mut progress = self
            .store
            .get_connection(workspace_id, provider)
            .map(|c| c.sync_progress)
            .unwrap_or_default();

        if progress.cached_campaign_list.is_empty() {
            let list = match adapter.list_campaigns(&connection, Some(deadline)).await {
                Ok(list) => list,
                Err(e) => {
                    let message = format!("campaign list fetch failed: {e}");
                    self.persist_error(workspace_id, provider, &message);
                    return Err(AtlasError::Sync(message));
                }
            };
            info!(
                workspace_id = %workspace_id,
                provider = provider.as_str(),
                campaigns = list.len(),
                "Campaign list snapshotted"
            );
            progress.total_campaigns = list.len();
            progress.cached_campaign_list = list;
            progress.campaign_index = 0;
            progress.errors.clear();
            progress.step = "campaigns_cached".to_string();
            self.persist_progress(workspace_id, provider, &progress);
        }

        if let Some(continue_at) = opts.continue_at {
            progress.campaign_index = continue_at;
        }
        let start_index = progress.campaign_index;
        let campaigns = progress.cached_campaign_list.clone();
        let today = Utc::now().date_naive();
        progress.step = "syncing_campaigns".to_string();

        for index in start_index..campaigns.len() {
            if Instant::now() >= deadline {
                return self.pause_batch(
                    workspace_id,
                    provider,
                    progress,
                    index,
                    opts.batch_number,
                    started,
                    &provider_cfg,
                );
            }

            let summary = &campaigns[index];
            progress.current_campaign_name = summary.name.clone();
            if index % HEARTBEAT_EVERY == 0 {
                progress.heartbeat_at = Some(Utc::now());
                self.persist_progress(workspace_id, provider, &progress);
            }

            let campaign = self.store.upsert_campaign(workspace_id, provider, summary);

            match adapter
                .fetch_campaign_stats(&connection, summary, Some(deadline))
                .await
            {
                Ok(Some(counters)) => {
                    self.store.set_campaign_totals(campaign.id, &counters);
                    let prior = self.store.get_cumulative(campaign.id);
                    let outcome = compute_delta(
                        campaign.id,
                        &counters,
                        prior.as_ref(),
                        campaign.created_at,
                        today,
                        Utc::now(),
                    );
                    self.store.put_cumulative(outcome.cumulative);
                    if let Some((date, delta)) = outcome.daily {
                        self.store.record_daily_metric(campaign.id, date, delta);
                    }
                    metrics::counter!("sync.campaigns.synced").increment(1);
                }
                Ok(None) => {
                    debug!(campaign = %summary.platform_id, "No stats for campaign");
                }
                Err(AtlasError::DeadlineExceeded) => {
                    return self.pause_batch(
                        workspace_id,
                        provider,
                        progress,
                        index,
                        opts.batch_number,
                        started,
                        &provider_cfg,
                    );
                }
                Err(e) => {
                    warn!(campaign = %summary.name, error = %e, "Stats fetch failed");
                    progress.errors.push(format!("{}: stats: {e}", summary.name));
                    metrics::counter!("sync.campaigns.errors").increment(1);
                }
            }

            match adapter
                .fetch_steps(&connection, summary, Some(deadline))
                .await
            {
                Ok(steps) => {
                    for draft in steps {
                        let body_preview: String =
                            draft.body.chars().take(BODY_PREVIEW_CHARS).collect();
                        self.store.upsert_step(SequenceStep {
                            campaign_id: campaign.id,
                            step_number: draft.step_number,
                            name: draft.name,
                            subject: draft.subject,
                            body: draft.body,
                            body_preview,
                            delay_days: draft.delay_days,
                            personalization_vars: draft.personalization_vars,
                            updated_at: Utc::now(),
                        });
                    }
                }
                Err(AtlasError::DeadlineExceeded) => {
                    return self.pause_batch(
                        workspace_id,
                        provider,
                        progress,
                        index,
                        opts.batch_number,
                        started,
                        &provider_cfg,
                    );
                }
                Err(e) => {
                    warn!(campaign = %summary.name, error = %e, "Steps fetch failed");
                    progress.errors.push(format!("{}: steps: {e}", summary.name));
                }
            }

            progress.campaign_index = index + 1;
        }

        aggregate_workspace_daily(&self.store, workspace_id, provider, today);

        let status = if progress.errors.is_empty() {
            SyncStatus::Success
        } else {
            SyncStatus::CompletedWithErrors
        };
        progress.step = "completed".to_string();
        progress.current_campaign_name.clear();
        // Drop the snapshot so the next logical sync re-fetches the list.
        progress.cached_campaign_list.clear();
        progress.campaign_index = 0;
        progress.heartbeat_at = Some(Utc::now());

        let now = Utc::now();
        self.store.update_connection(workspace_id, provider, |c| {
            c.sync_status = status;
            c.last_sync_at = Some(now);
            c.last_full_sync_at = Some(now);
            c.sync_progress = progress.clone();
        });

        self.continuation.fire_analysis_hooks(workspace_id);

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            workspace_id = %workspace_id,
            provider = provider.as_str(),
            campaigns = progress.total_campaigns,
            errors = progress.errors.len(),
            duration_ms,
            "Sync completed"
        );
        Ok(SyncOutcome {
            complete: true,
            status,
            progress,
            duration_ms,
        })
    }

    /// Persist the cursor, flip to `partial`, and enqueue the next batch.
    #[allow(clippy::too_many_arguments)]
    fn pause_batch(
        &self,
        workspace_id: Uuid,
        provider: Provider,
        mut progress: SyncProgress,
        resume_index: usize,
        batch_number: u32,
        started: Instant,
        provider_cfg: &atlas_core::config::ProviderConfig,
    ) -> AtlasResult<SyncOutcome> {
        progress.campaign_index = resume_index;
        progress.step = "paused_time_budget".to_string();
        progress.heartbeat_at = Some(Utc::now());
        let duration_ms = started.elapsed().as_millis() as u64;

        // An operator stop that landed mid-batch wins over the pause.
        let stopped = self
            .store
            .get_connection(workspace_id, provider)
            .map(|c| c.sync_status == SyncStatus::Stopped)
            .unwrap_or(false);
        if stopped {
            self.store.update_connection(workspace_id, provider, |c| {
                c.sync_progress = progress.clone();
                c.sync_status = SyncStatus::Stopped;
            });
            return Ok(SyncOutcome {
                complete: true,
                status: SyncStatus::Stopped,
                progress,
                duration_ms,
            });
        }

        let next_batch = batch_number + 1;
        if next_batch > provider_cfg.max_batches {
            let message = format!(
                "sync exceeded the {}-batch cap for {}",
                provider_cfg.max_batches,
                provider.display_name()
            );
            progress.errors.push(message.clone());
            self.store.update_connection(workspace_id, provider, |c| {
                c.sync_status = SyncStatus::Error;
                c.sync_progress = progress.clone();
            });
            return Err(AtlasError::Sync(message));
        }

        self.store.update_connection(workspace_id, provider, |c| {
            c.sync_status = SyncStatus::Partial;
            c.sync_progress = progress.clone();
        });
        info!(
            workspace_id = %workspace_id,
            provider = provider.as_str(),
            resume_index,
            next_batch,
            duration_ms,
            "Time budget exhausted, continuation enqueued"
        );
        self.continuation
            .enqueue_next_batch(workspace_id, provider, next_batch);

        Ok(SyncOutcome {
            complete: false,
            status: SyncStatus::Partial,
            progress,
            duration_ms,
        })
    }

    fn persist_progress(&self, workspace_id: Uuid, provider: Provider, progress: &SyncProgress) {
        self.store.update_connection(workspace_id, provider, |c| {
            c.sync_progress = progress.clone();
        });
    }

    fn persist_error(&self, workspace_id: Uuid, provider: Provider, message: &str) {
        self.store.update_connection(workspace_id, provider, |c| {
            c.sync_status = SyncStatus::Error;
            c.sync_progress.errors.push(message.to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use parking_lot::Mutex;

    use atlas_core::types::{
        ApiConnection, CampaignStatus, CampaignSummary, LifetimeCounters,
    };
    use atlas_providers::{ContactPresence, ProviderAdapter, StepDraft};

    struct MockAdapter {
        provider: Provider,
        campaigns: Vec<CampaignSummary>,
        stats: Mutex<HashMap<String, LifetimeCounters>>,
        steps: HashMap<String, Vec<StepDraft>>,
        fail_stats: HashSet<String>,
        stats_delay: Duration,
        stats_calls: Mutex<HashMap<String, u32>>,
        list_calls: Mutex<u32>,
    }

    impl MockAdapter {
        fn new(provider: Provider, campaigns: Vec<CampaignSummary>) -> Self {
            Self {
                provider,
                campaigns,
                stats: Mutex::new(HashMap::new()),
                steps: HashMap::new(),
                fail_stats: HashSet::new(),
                stats_delay: Duration::ZERO,
                stats_calls: Mutex::new(HashMap::new()),
                list_calls: Mutex::new(0),
            }
        }

        fn set_stats(&self, platform_id: &str, counters: LifetimeCounters) {
            self.stats.lock().insert(platform_id.to_string(), counters);
        }

        fn stats_call_count(&self, platform_id: &str) -> u32 {
            self.stats_calls.lock().get(platform_id).copied().unwrap_or(0)
        }

        fn total_stats_calls(&self) -> u32 {
            self.stats_calls.lock().values().sum()
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn list_campaigns(
            &self,
            _conn: &ApiConnection,
            _deadline: Option<Instant>,
        ) -> AtlasResult<Vec<CampaignSummary>> {
            *self.list_calls.lock() += 1;
            Ok(self.campaigns.clone())
        }

        async fn fetch_campaign_stats(
            &self,
            _conn: &ApiConnection,
            campaign: &CampaignSummary,
            _deadline: Option<Instant>,
        ) -> AtlasResult<Option<LifetimeCounters>> {
            if !self.stats_delay.is_zero() {
                tokio::time::sleep(self.stats_delay).await;
            }
            if self.fail_stats.contains(&campaign.platform_id) {
                return Err(AtlasError::Provider("scripted failure".to_string()));
            }
            *self
                .stats_calls
                .lock()
                .entry(campaign.platform_id.clone())
                .or_insert(0) += 1;
            Ok(self.stats.lock().get(&campaign.platform_id).copied())
        }

        async fn fetch_steps(
            &self,
            _conn: &ApiConnection,
            campaign: &CampaignSummary,
            _deadline: Option<Instant>,
        ) -> AtlasResult<Vec<StepDraft>> {
            Ok(self.steps.get(&campaign.platform_id).cloned().unwrap_or_default())
        }

        async fn search_contact(
            &self,
            _conn: &ApiConnection,
            _email: &str,
        ) -> AtlasResult<ContactPresence> {
            Ok(ContactPresence::absent(self.provider))
        }
    }

    struct MockFactory(Arc<MockAdapter>);

    impl AdapterFactory for MockFactory {
        fn adapter(&self, _provider: Provider) -> Arc<dyn ProviderAdapter> {
            self.0.clone()
        }
    }

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        // No live continuations or hooks from tests.
        config.api.self_url = String::new();
        config.hooks.enabled = false;
        config
    }

    fn summary(platform_id: &str, name: &str, created: Option<NaiveDate>) -> CampaignSummary {
        CampaignSummary {
            platform_id: platform_id.to_string(),
            name: name.to_string(),
            status: CampaignStatus::Active,
            created_at: created,
        }
    }

    fn seeded_store(provider: Provider) -> (Arc<AtlasStore>, Uuid) {
        let store = Arc::new(AtlasStore::new());
        let workspace_id = Uuid::new_v4();
        store.put_connection(ApiConnection::new(
            workspace_id,
            provider,
            "test-key".to_string(),
        ));
        (store, workspace_id)
    }

    fn orchestrator(store: Arc<AtlasStore>, adapter: Arc<MockAdapter>) -> SyncOrchestrator {
        SyncOrchestrator::new(store, Arc::new(MockFactory(adapter)), test_config())
    }

    #[tokio::test]
    async fn test_first_sync_single_campaign() {
        let created = Utc::now().date_naive() - chrono::Duration::days(10);
        let (store, workspace) = seeded_store(Provider::Sendline);
        let mut adapter = MockAdapter::new(
            Provider::Sendline,
            vec![summary("42", "Outreach Q1", Some(created))],
        );
        let long_body = format!("Hi {{{{first_name}}}}, {}", "x".repeat(400));
        adapter.steps.insert(
            "42".to_string(),
            vec![StepDraft {
                step_number: 1,
                name: "Step 1".to_string(),
                subject: "Quick question".to_string(),
                body: long_body,
                delay_days: 0,
                personalization_vars: vec!["first_name".to_string()],
            }],
        );
        let adapter = Arc::new(adapter);
        adapter.set_stats(
            "42",
            LifetimeCounters {
                sent: 1000,
                opened: 300,
                clicked: 40,
                replied: 25,
                bounced: 5,
                interested: 0,
            },
        );

        let orch = orchestrator(store.clone(), adapter.clone());
        let outcome = orch
            .run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.status, SyncStatus::Success);

        let campaign = store
            .find_campaign_by_platform(Provider::Sendline, "42")
            .unwrap();
        assert_eq!(campaign.name, "Outreach Q1");
        assert_eq!(campaign.total_sent, 1000);
        assert_eq!(campaign.total_opened, 300);

        let cumulative = store.get_cumulative(campaign.id).unwrap();
        assert_eq!(cumulative.sent, 1000);
        assert_eq!(cumulative.baseline_sent, 1000);

        // Baseline daily row dated at campaign creation.
        let daily = store.daily_metric(campaign.id, created).unwrap();
        assert_eq!(daily.sent_count, 1000);
        assert_eq!(daily.opened_count, 300);
        assert_eq!(daily.clicked_count, 40);
        assert_eq!(daily.replied_count, 25);
        assert_eq!(daily.bounced_count, 5);

        // Workspace rollup covers the baseline date.
        let rollup = store
            .workspace_daily(workspace, Provider::Sendline, created)
            .unwrap();
        assert_eq!(rollup.sent, 1000);
        assert_eq!(rollup.active_campaigns, 1);

        // Step row with preview and extracted variables.
        let steps = store.steps_for(campaign.id);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].body_preview.chars().count(), 200);
        assert_eq!(steps[0].personalization_vars, vec!["first_name"]);

        let connection = store.get_connection(workspace, Provider::Sendline).unwrap();
        assert_eq!(connection.sync_status, SyncStatus::Success);
        assert!(connection.last_full_sync_at.is_some());
    }

    #[tokio::test]
    async fn test_second_sync_writes_daily_deltas() {
        let created = Utc::now().date_naive() - chrono::Duration::days(10);
        let today = Utc::now().date_naive();
        let (store, workspace) = seeded_store(Provider::Sendline);
        let adapter = Arc::new(MockAdapter::new(
            Provider::Sendline,
            vec![summary("42", "Outreach Q1", Some(created))],
        ));
        adapter.set_stats(
            "42",
            LifetimeCounters {
                sent: 1000,
                opened: 300,
                clicked: 40,
                replied: 25,
                bounced: 5,
                interested: 0,
            },
        );
        let orch = orchestrator(store.clone(), adapter.clone());
        orch.run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        adapter.set_stats(
            "42",
            LifetimeCounters {
                sent: 1100,
                opened: 330,
                clicked: 40,
                replied: 28,
                bounced: 5,
                interested: 0,
            },
        );
        orch.run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        let campaign = store
            .find_campaign_by_platform(Provider::Sendline, "42")
            .unwrap();
        let cumulative = store.get_cumulative(campaign.id).unwrap();
        assert_eq!(cumulative.sent, 1100);
        assert_eq!(cumulative.baseline_sent, 1000);

        let daily = store.daily_metric(campaign.id, today).unwrap();
        assert_eq!(daily.sent_count, 100);
        assert_eq!(daily.opened_count, 30);
        assert_eq!(daily.replied_count, 3);
        assert_eq!(daily.clicked_count, 0);
        assert_eq!(daily.bounced_count, 0);

        let rollup = store
            .workspace_daily(workspace, Provider::Sendline, today)
            .unwrap();
        assert_eq!(rollup.sent, 100);
    }

    #[tokio::test]
    async fn test_counter_regression_produces_no_negative_rows() {
        let today = Utc::now().date_naive();
        let (store, workspace) = seeded_store(Provider::Sendline);
        let adapter = Arc::new(MockAdapter::new(
            Provider::Sendline,
            vec![summary("42", "Outreach Q1", None)],
        ));
        adapter.set_stats(
            "42",
            LifetimeCounters { sent: 1100, opened: 330, clicked: 40, replied: 28, bounced: 5, interested: 0 },
        );
        let orch = orchestrator(store.clone(), adapter.clone());
        orch.run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        // Provider anomaly: sent regresses to 900.
        adapter.set_stats(
            "42",
            LifetimeCounters { sent: 900, opened: 330, clicked: 40, replied: 28, bounced: 5, interested: 0 },
        );
        orch.run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        let campaign = store
            .find_campaign_by_platform(Provider::Sendline, "42")
            .unwrap();
        // Cumulative follows the provider; the baseline daily row (dated
        // today, since there was no creation date) is unchanged.
        let cumulative = store.get_cumulative(campaign.id).unwrap();
        assert_eq!(cumulative.sent, 900);
        let daily = store.daily_metric(campaign.id, today).unwrap();
        assert_eq!(daily.sent_count, 1100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_budget_resumption_equals_unbroken_run() {
        let campaigns: Vec<CampaignSummary> = (0..120)
            .map(|i| summary(&i.to_string(), &format!("Campaign {i}"), None))
            .collect();

        // Interrupted path: 2 s of virtual time per stats call against the
        // 50 s Sendline budget, so each batch covers ~25 campaigns.
        let (store, workspace) = seeded_store(Provider::Sendline);
        let mut adapter = MockAdapter::new(Provider::Sendline, campaigns.clone());
        adapter.stats_delay = Duration::from_secs(2);
        let adapter = Arc::new(adapter);
        for i in 0..120u64 {
            adapter.set_stats(
                &i.to_string(),
                LifetimeCounters { sent: i + 1, opened: i, clicked: 0, replied: 0, bounced: 0, interested: 0 },
            );
        }
        let orch = orchestrator(store.clone(), adapter.clone());

        let mut batch = 0u32;
        let mut outcome = orch
            .run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();
        while !outcome.complete {
            batch += 1;
            assert!(batch < 20, "sync did not converge");
            outcome = orch
                .run_sync(
                    workspace,
                    Provider::Sendline,
                    SyncOptions {
                        internal: true,
                        batch_number: batch,
                        ..SyncOptions::default()
                    },
                )
                .await
                .unwrap();
        }

        assert!(outcome.progress.batch_index >= 2);
        assert_eq!(outcome.status, SyncStatus::Success);
        // The cached list was fetched exactly once and every campaign's
        // stats exactly once — no double processing across batches.
        assert_eq!(*adapter.list_calls.lock(), 1);
        for i in 0..120 {
            assert_eq!(adapter.stats_call_count(&i.to_string()), 1, "campaign {i}");
        }

        // Unbroken path for comparison.
        let (control_store, control_ws) = seeded_store(Provider::Sendline);
        let control_adapter = Arc::new(MockAdapter::new(Provider::Sendline, campaigns));
        for i in 0..120u64 {
            control_adapter.set_stats(
                &i.to_string(),
                LifetimeCounters { sent: i + 1, opened: i, clicked: 0, replied: 0, bounced: 0, interested: 0 },
            );
        }
        let control = orchestrator(control_store.clone(), control_adapter.clone());
        let control_outcome = control
            .run_sync(control_ws, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();
        assert!(control_outcome.complete);

        let sum =
            |s: &AtlasStore, ws: Uuid| -> (usize, u64) {
                let campaigns = s.campaigns_for(ws, Provider::Sendline);
                let total: u64 = campaigns
                    .iter()
                    .filter_map(|c| s.get_cumulative(c.id))
                    .map(|c| c.sent)
                    .sum();
                (campaigns.len(), total)
            };
        assert_eq!(sum(&store, workspace), sum(&control_store, control_ws));
    }

    #[tokio::test]
    async fn test_continue_at_overrides_cursor() {
        let campaigns: Vec<CampaignSummary> = (0..10)
            .map(|i| summary(&i.to_string(), &format!("Campaign {i}"), None))
            .collect();
        let (store, workspace) = seeded_store(Provider::Sendline);
        let adapter = Arc::new(MockAdapter::new(Provider::Sendline, campaigns));
        for i in 0..10u64 {
            adapter.set_stats(
                &i.to_string(),
                LifetimeCounters { sent: 1, opened: 0, clicked: 0, replied: 0, bounced: 0, interested: 0 },
            );
        }
        let orch = orchestrator(store.clone(), adapter.clone());

        orch.run_sync(
            workspace,
            Provider::Sendline,
            SyncOptions {
                continue_at: Some(6),
                ..SyncOptions::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(adapter.total_stats_calls(), 4);
        assert_eq!(adapter.stats_call_count("5"), 0);
        assert_eq!(adapter.stats_call_count("6"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_start_returns_snapshot() {
        let (store, workspace) = seeded_store(Provider::Sendline);
        store.update_connection(workspace, Provider::Sendline, |c| {
            c.sync_status = SyncStatus::Syncing;
            c.sync_progress.heartbeat_at = Some(Utc::now());
            c.sync_progress.current_campaign_name = "Mid-flight".to_string();
        });
        let adapter = Arc::new(MockAdapter::new(
            Provider::Sendline,
            vec![summary("1", "One", None)],
        ));
        let orch = orchestrator(store, adapter.clone());

        let outcome = orch
            .run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        assert!(!outcome.complete);
        assert_eq!(outcome.status, SyncStatus::Syncing);
        assert_eq!(outcome.progress.current_campaign_name, "Mid-flight");
        assert_eq!(*adapter.list_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_stopped_connection_halts_continuation() {
        let (store, workspace) = seeded_store(Provider::Sendline);
        store.update_connection(workspace, Provider::Sendline, |c| {
            c.sync_status = SyncStatus::Stopped;
        });
        let adapter = Arc::new(MockAdapter::new(
            Provider::Sendline,
            vec![summary("1", "One", None)],
        ));
        let orch = orchestrator(store, adapter.clone());

        let outcome = orch
            .run_sync(
                workspace,
                Provider::Sendline,
                SyncOptions {
                    internal: true,
                    batch_number: 3,
                    ..SyncOptions::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.status, SyncStatus::Stopped);
        assert_eq!(*adapter.list_calls.lock(), 0);
    }

    #[tokio::test]
    async fn test_batch_cap_exceeded_is_fatal() {
        let (store, workspace) = seeded_store(Provider::Sendline);
        let adapter = Arc::new(MockAdapter::new(Provider::Sendline, Vec::new()));
        let orch = orchestrator(store.clone(), adapter);

        let err = orch
            .run_sync(
                workspace,
                Provider::Sendline,
                SyncOptions {
                    internal: true,
                    batch_number: 101,
                    ..SyncOptions::default()
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AtlasError::Sync(_)));
        let connection = store.get_connection(workspace, Provider::Sendline).unwrap();
        assert_eq!(connection.sync_status, SyncStatus::Error);
        assert!(!connection.sync_progress.errors.is_empty());
    }

    #[tokio::test]
    async fn test_campaign_errors_accumulate_without_aborting() {
        let (store, workspace) = seeded_store(Provider::Sendline);
        let mut adapter = MockAdapter::new(
            Provider::Sendline,
            vec![summary("good", "Good", None), summary("bad", "Bad", None)],
        );
        adapter.fail_stats.insert("bad".to_string());
        let adapter = Arc::new(adapter);
        adapter.set_stats(
            "good",
            LifetimeCounters { sent: 10, opened: 1, clicked: 0, replied: 0, bounced: 0, interested: 0 },
        );
        let orch = orchestrator(store.clone(), adapter);

        let outcome = orch
            .run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();

        assert!(outcome.complete);
        assert_eq!(outcome.status, SyncStatus::CompletedWithErrors);
        assert_eq!(outcome.progress.errors.len(), 1);

        // The healthy campaign still synced fully.
        let good = store
            .find_campaign_by_platform(Provider::Sendline, "good")
            .unwrap();
        assert_eq!(store.get_cumulative(good.id).unwrap().sent, 10);
    }

    #[tokio::test]
    async fn test_reset_clears_provider_rows() {
        let (store, workspace) = seeded_store(Provider::Sendline);
        let adapter = Arc::new(MockAdapter::new(
            Provider::Sendline,
            vec![summary("42", "Outreach Q1", None)],
        ));
        adapter.set_stats(
            "42",
            LifetimeCounters { sent: 100, opened: 0, clicked: 0, replied: 0, bounced: 0, interested: 0 },
        );
        let orch = orchestrator(store.clone(), adapter.clone());
        orch.run_sync(workspace, Provider::Sendline, SyncOptions::default())
            .await
            .unwrap();
        let before = store
            .find_campaign_by_platform(Provider::Sendline, "42")
            .unwrap();

        orch.run_sync(
            workspace,
            Provider::Sendline,
            SyncOptions {
                reset: true,
                ..SyncOptions::default()
            },
        )
        .await
        .unwrap();

        // The old row tree is gone; the resync created a fresh campaign.
        assert!(store.get_campaign(before.id).is_none());
        let after = store
            .find_campaign_by_platform(Provider::Sendline, "42")
            .unwrap();
        assert_ne!(before.id, after.id);
        assert_eq!(store.get_cumulative(after.id).unwrap().baseline_sent, 100);
    }
}

//! Rolls per-campaign daily metrics into per-workspace per-provider per-day
//! rows over the trailing 90 calendar days.
//!
//! A pure recompute from `CampaignDailyMetric` joined with campaign
//! provider/status at the moment it runs. It upserts rollup rows only; it
//! never touches cumulatives.

use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use atlas_core::types::{Provider, WorkspaceDailyMetric};
use atlas_store::AtlasStore;

const TRAILING_DAYS: i64 = 90;

/// Recompute and upsert the workspace rollup for (workspace, provider).
/// Returns the number of dates written.
pub fn aggregate_workspace_daily(
    store: &AtlasStore,
    workspace_id: Uuid,
    provider: Provider,
    today: NaiveDate,
) -> usize {
    let cutoff = today - Duration::days(TRAILING_DAYS);
    let rows = store.daily_metrics_since(workspace_id, provider, cutoff);

    let mut by_date: BTreeMap<NaiveDate, (WorkspaceDailyMetric, HashSet<Uuid>)> = BTreeMap::new();
    for row in rows {
        let (rollup, campaign_ids) = by_date.entry(row.metric_date).or_insert_with(|| {
            (
                WorkspaceDailyMetric {
                    workspace_id,
                    provider,
                    metric_date: row.metric_date,
                    sent: 0,
                    opened: 0,
                    clicked: 0,
                    replied: 0,
                    positive_replies: 0,
                    bounced: 0,
                    active_campaigns: 0,
                },
                HashSet::new(),
            )
        });
        rollup.sent += row.sent_count;
        rollup.opened += row.opened_count;
        rollup.clicked += row.clicked_count;
        rollup.replied += row.replied_count;
        rollup.positive_replies += row.positive_count;
        rollup.bounced += row.bounced_count;
        campaign_ids.insert(row.campaign_id);
    }

    let dates = by_date.len();
    for (_, (mut rollup, campaign_ids)) in by_date {
        rollup.active_campaigns = campaign_ids.len() as u64;
        store.put_workspace_daily(rollup);
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::types::{CampaignStatus, CampaignSummary};
    use atlas_store::DailyDelta;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_campaign(store: &AtlasStore, workspace: Uuid, provider: Provider, id: &str) -> Uuid {
        store
            .upsert_campaign(
                workspace,
                provider,
                &CampaignSummary {
                    platform_id: id.to_string(),
                    name: format!("Campaign {id}"),
                    status: CampaignStatus::Active,
                    created_at: None,
                },
            )
            .id
    }

    #[test]
    fn test_rollup_sums_across_campaigns() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let today = date(2025, 3, 15);

        let c1 = seeded_campaign(&store, workspace, Provider::Sendline, "1");
        let c2 = seeded_campaign(&store, workspace, Provider::Sendline, "2");
        store.record_daily_metric(c1, today, DailyDelta { sent: 100, opened: 30, ..DailyDelta::default() });
        store.record_daily_metric(c2, today, DailyDelta { sent: 50, replied: 4, ..DailyDelta::default() });

        let written = aggregate_workspace_daily(&store, workspace, Provider::Sendline, today);
        assert_eq!(written, 1);

        let rollup = store
            .workspace_daily(workspace, Provider::Sendline, today)
            .unwrap();
        assert_eq!(rollup.sent, 150);
        assert_eq!(rollup.opened, 30);
        assert_eq!(rollup.replied, 4);
        assert_eq!(rollup.active_campaigns, 2);
    }

    #[test]
    fn test_rollup_scoped_to_provider() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let today = date(2025, 3, 15);

        let sendline = seeded_campaign(&store, workspace, Provider::Sendline, "1");
        let outflow = seeded_campaign(&store, workspace, Provider::Outflow, "1");
        store.record_daily_metric(sendline, today, DailyDelta { sent: 10, ..DailyDelta::default() });
        store.record_daily_metric(outflow, today, DailyDelta { sent: 99, ..DailyDelta::default() });

        aggregate_workspace_daily(&store, workspace, Provider::Sendline, today);

        let rollup = store
            .workspace_daily(workspace, Provider::Sendline, today)
            .unwrap();
        assert_eq!(rollup.sent, 10);
        assert!(store
            .workspace_daily(workspace, Provider::Outflow, today)
            .is_none());
    }

    #[test]
    fn test_rows_outside_trailing_window_excluded() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let today = date(2025, 6, 1);

        let campaign = seeded_campaign(&store, workspace, Provider::Sendline, "1");
        store.record_daily_metric(
            campaign,
            date(2025, 1, 1),
            DailyDelta { sent: 1000, ..DailyDelta::default() },
        );
        store.record_daily_metric(
            campaign,
            date(2025, 5, 20),
            DailyDelta { sent: 5, ..DailyDelta::default() },
        );

        aggregate_workspace_daily(&store, workspace, Provider::Sendline, today);

        assert!(store
            .workspace_daily(workspace, Provider::Sendline, date(2025, 1, 1))
            .is_none());
        assert_eq!(
            store
                .workspace_daily(workspace, Provider::Sendline, date(2025, 5, 20))
                .unwrap()
                .sent,
            5
        );
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let store = AtlasStore::new();
        let workspace = Uuid::new_v4();
        let today = date(2025, 3, 15);
        let campaign = seeded_campaign(&store, workspace, Provider::Sendline, "1");
        store.record_daily_metric(campaign, today, DailyDelta { sent: 7, ..DailyDelta::default() });

        aggregate_workspace_daily(&store, workspace, Provider::Sendline, today);
        aggregate_workspace_daily(&store, workspace, Provider::Sendline, today);

        assert_eq!(
            store
                .workspace_daily(workspace, Provider::Sendline, today)
                .unwrap()
                .sent,
            7
        );
    }
}

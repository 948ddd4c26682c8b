//! Turns (prior cumulative, fresh lifetime counters) into (new cumulative,
//! optional daily row). Pure function; the orchestrator persists the result.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;
use uuid::Uuid;

use atlas_core::types::{CampaignCumulative, LifetimeCounters};
use atlas_store::DailyDelta;

#[derive(Debug, Clone)]
pub struct DeltaOutcome {
    pub cumulative: CampaignCumulative,
    /// At most one daily row per sync: the baseline bucket on first
    /// observation, today's deltas afterwards.
    pub daily: Option<(NaiveDate, DailyDelta)>,
}

/// Compute the cumulative update and daily delta for one campaign.
///
/// First observation with `sent > 0` synthesizes a single baseline row dated
/// at campaign creation (today when the provider reports no creation date),
/// carrying the full lifetime totals. This is a deliberate single historical
/// bucket, not per-day reconstruction.
///
/// Afterwards each metric's delta is clamped at zero, so a provider counter
/// reset never produces a negative daily row. The cumulative itself is
/// overwritten with whatever the provider reported — after a regression,
/// future deltas re-grow from the smaller baseline.
pub fn compute_delta(
    campaign_id: Uuid,
    counters: &LifetimeCounters,
    prior: Option<&CampaignCumulative>,
    campaign_created: Option<NaiveDate>,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> DeltaOutcome {
    match prior {
        None => {
            let cumulative = CampaignCumulative {
                campaign_id,
                sent: counters.sent,
                opened: counters.opened,
                clicked: counters.clicked,
                replied: counters.replied,
                bounced: counters.bounced,
                interested: counters.interested,
                baseline_sent: counters.sent,
                baseline_opened: counters.opened,
                baseline_clicked: counters.clicked,
                baseline_replied: counters.replied,
                baseline_bounced: counters.bounced,
                first_synced_at: now,
                last_synced_at: now,
            };
            let daily = (counters.sent > 0).then(|| {
                (
                    campaign_created.unwrap_or(today),
                    DailyDelta {
                        sent: counters.sent,
                        opened: counters.opened,
                        clicked: counters.clicked,
                        replied: counters.replied,
                        positive: counters.interested,
                        bounced: counters.bounced,
                    },
                )
            });
            DeltaOutcome { cumulative, daily }
        }
        Some(prior) => {
            if counters.sent < prior.sent
                || counters.opened < prior.opened
                || counters.replied < prior.replied
            {
                warn!(
                    campaign_id = %campaign_id,
                    prior_sent = prior.sent,
                    new_sent = counters.sent,
                    "Provider counters regressed; clamping daily deltas at zero"
                );
            }

            let delta = DailyDelta {
                sent: counters.sent.saturating_sub(prior.sent),
                opened: counters.opened.saturating_sub(prior.opened),
                clicked: counters.clicked.saturating_sub(prior.clicked),
                replied: counters.replied.saturating_sub(prior.replied),
                positive: counters.interested.saturating_sub(prior.interested),
                bounced: counters.bounced.saturating_sub(prior.bounced),
            };

            let cumulative = CampaignCumulative {
                campaign_id,
                sent: counters.sent,
                opened: counters.opened,
                clicked: counters.clicked,
                replied: counters.replied,
                bounced: counters.bounced,
                interested: counters.interested,
                // The baseline is set on first observation and never moves.
                baseline_sent: prior.baseline_sent,
                baseline_opened: prior.baseline_opened,
                baseline_clicked: prior.baseline_clicked,
                baseline_replied: prior.baseline_replied,
                baseline_bounced: prior.baseline_bounced,
                first_synced_at: prior.first_synced_at,
                last_synced_at: now,
            };

            let daily = (delta.sent > 0 || delta.opened > 0 || delta.replied > 0)
                .then_some((today, delta));
            DeltaOutcome { cumulative, daily }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(sent: u64, opened: u64, clicked: u64, replied: u64, bounced: u64) -> LifetimeCounters {
        LifetimeCounters {
            sent,
            opened,
            clicked,
            replied,
            bounced,
            interested: 0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_sync_baseline_row() {
        let campaign_id = Uuid::new_v4();
        let now = Utc::now();
        let outcome = compute_delta(
            campaign_id,
            &counters(1000, 300, 40, 25, 5),
            None,
            Some(date(2025, 1, 1)),
            date(2025, 3, 15),
            now,
        );

        assert_eq!(outcome.cumulative.sent, 1000);
        assert_eq!(outcome.cumulative.baseline_sent, 1000);
        assert_eq!(outcome.cumulative.first_synced_at, now);

        let (metric_date, delta) = outcome.daily.expect("baseline row expected");
        assert_eq!(metric_date, date(2025, 1, 1));
        assert_eq!(delta.sent, 1000);
        assert_eq!(delta.opened, 300);
        assert_eq!(delta.clicked, 40);
        assert_eq!(delta.replied, 25);
        assert_eq!(delta.bounced, 5);
    }

    #[test]
    fn test_first_sync_missing_creation_date_falls_back_to_today() {
        let outcome = compute_delta(
            Uuid::new_v4(),
            &counters(10, 0, 0, 0, 0),
            None,
            None,
            date(2025, 3, 15),
            Utc::now(),
        );
        assert_eq!(outcome.daily.expect("row expected").0, date(2025, 3, 15));
    }

    #[test]
    fn test_first_sync_zero_sent_produces_no_daily() {
        let outcome = compute_delta(
            Uuid::new_v4(),
            &counters(0, 0, 0, 0, 0),
            None,
            Some(date(2025, 1, 1)),
            date(2025, 3, 15),
            Utc::now(),
        );
        assert!(outcome.daily.is_none());
    }

    #[test]
    fn test_second_sync_emits_positive_deltas() {
        let campaign_id = Uuid::new_v4();
        let first = compute_delta(
            campaign_id,
            &counters(1000, 300, 40, 25, 5),
            None,
            Some(date(2025, 1, 1)),
            date(2025, 3, 15),
            Utc::now(),
        );

        let outcome = compute_delta(
            campaign_id,
            &counters(1100, 330, 40, 28, 5),
            Some(&first.cumulative),
            Some(date(2025, 1, 1)),
            date(2025, 3, 16),
            Utc::now(),
        );

        let (metric_date, delta) = outcome.daily.expect("delta row expected");
        assert_eq!(metric_date, date(2025, 3, 16));
        assert_eq!(delta.sent, 100);
        assert_eq!(delta.opened, 30);
        assert_eq!(delta.replied, 3);
        assert_eq!(delta.clicked, 0);
        assert_eq!(delta.bounced, 0);
        // Baseline survives subsequent syncs untouched.
        assert_eq!(outcome.cumulative.baseline_sent, 1000);
        assert_eq!(outcome.cumulative.sent, 1100);
    }

    #[test]
    fn test_no_movement_means_no_daily_row() {
        let campaign_id = Uuid::new_v4();
        let first = compute_delta(
            campaign_id,
            &counters(1000, 300, 40, 25, 5),
            None,
            None,
            date(2025, 3, 15),
            Utc::now(),
        );
        let outcome = compute_delta(
            campaign_id,
            &counters(1000, 300, 40, 25, 5),
            Some(&first.cumulative),
            None,
            date(2025, 3, 16),
            Utc::now(),
        );
        assert!(outcome.daily.is_none());
    }

    #[test]
    fn test_counter_regression_clamps_and_overwrites() {
        let campaign_id = Uuid::new_v4();
        let first = compute_delta(
            campaign_id,
            &counters(1100, 330, 40, 28, 5),
            None,
            None,
            date(2025, 3, 15),
            Utc::now(),
        );

        // Provider anomaly: sent drops to 900.
        let outcome = compute_delta(
            campaign_id,
            &counters(900, 330, 40, 28, 5),
            Some(&first.cumulative),
            None,
            date(2025, 3, 16),
            Utc::now(),
        );

        // No negative daily row: every delta clamps to zero.
        assert!(outcome.daily.is_none());
        // The cumulative follows the provider, so future deltas re-grow from
        // the regressed value.
        assert_eq!(outcome.cumulative.sent, 900);
        assert_eq!(outcome.cumulative.baseline_sent, 1100);
    }

    #[test]
    fn test_click_only_movement_suppresses_daily() {
        // Only sent/opened/replied deltas gate the daily row.
        let campaign_id = Uuid::new_v4();
        let first = compute_delta(
            campaign_id,
            &counters(100, 10, 5, 2, 0),
            None,
            None,
            date(2025, 3, 15),
            Utc::now(),
        );
        let outcome = compute_delta(
            campaign_id,
            &counters(100, 10, 9, 2, 0),
            Some(&first.cumulative),
            None,
            date(2025, 3, 16),
            Utc::now(),
        );
        assert!(outcome.daily.is_none());
    }
}

//! Fire-and-forget self-invocation and downstream analysis hooks.
//!
//! When a batch stops on its time budget, the orchestrator enqueues the next
//! batch by POSTing back to this service with the internal flag and the
//! service credential. The outer request completes first; delivery failures
//! are logged, never surfaced.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use atlas_core::types::Provider;
use atlas_core::AppConfig;

/// Analysis functions triggered after a completed sync.
const ANALYSIS_HOOKS: &[&str] = &["classify-replies", "backfill-features", "compute-patterns"];

pub struct Continuation {
    http: reqwest::Client,
    self_url: String,
    service_token: String,
    hooks_enabled: bool,
}

impl Continuation {
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            http,
            self_url: config.api.self_url.trim_end_matches('/').to_string(),
            service_token: config.api.service_token.clone(),
            hooks_enabled: config.hooks.enabled,
        }
    }

    /// Enqueue the next sync batch. Returns immediately.
    pub fn enqueue_next_batch(&self, workspace_id: Uuid, provider: Provider, batch_number: u32) {
        if self.self_url.is_empty() {
            debug!("Self URL unset, not enqueuing continuation");
            return;
        }
        let url = format!("{}/functions/email-sync", self.self_url);
        let body = json!({
            "workspace_id": workspace_id,
            "platform": provider.as_str(),
            "batch_number": batch_number,
            "internal_continuation": true,
        });
        let request = self
            .http
            .post(&url)
            .bearer_auth(&self.service_token)
            .json(&body);
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = response.status().as_u16(), "Continuation enqueue rejected");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Continuation enqueue failed");
                }
            }
        });
        metrics::counter!("sync.continuations").increment(1);
    }

    /// Trigger the downstream analysis functions after a completed run.
    pub fn fire_analysis_hooks(&self, workspace_id: Uuid) {
        if !self.hooks_enabled || self.self_url.is_empty() {
            return;
        }
        for hook in ANALYSIS_HOOKS {
            let url = format!("{}/functions/{hook}", self.self_url);
            let request = self
                .http
                .post(&url)
                .bearer_auth(&self.service_token)
                .json(&json!({ "workspace_id": workspace_id }));
            let hook = *hook;
            tokio::spawn(async move {
                if let Err(e) = request.send().await {
                    debug!(hook, error = %e, "Analysis hook delivery failed");
                }
            });
        }
    }
}

//! Per-provider request pacing.
//!
//! One slot per (provider, lane): the slot holds the next instant a request
//! may be issued at. Acquiring reserves the slot time and sleeps until it
//! arrives, so concurrent callers against the same provider are serialized
//! at the configured spacing.

use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use atlas_core::types::Provider;
use atlas_core::{AtlasError, AtlasResult};

/// Endpoint family a request belongs to. Providers may pace list-level and
/// stats endpoints differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    List,
    Stats,
}

/// Process-wide pacing gate, keyed by (provider, lane).
pub struct RateGate {
    slots: DashMap<(Provider, Lane), Mutex<Instant>>,
}

impl RateGate {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Wait for the next request slot for `provider`/`lane`.
    ///
    /// If the slot would only become available after `deadline`, the call
    /// aborts with `DeadlineExceeded` and the slot is NOT consumed — the next
    /// caller inherits the original slot time.
    pub async fn acquire(
        &self,
        provider: Provider,
        lane: Lane,
        spacing: Duration,
        deadline: Option<Instant>,
    ) -> AtlasResult<()> {
        let wait_until = {
            let slot = self
                .slots
                .entry((provider, lane))
                .or_insert_with(|| Mutex::new(Instant::now()));
            let mut next_allowed = slot.lock();
            let at = (*next_allowed).max(Instant::now());
            if let Some(deadline) = deadline {
                if at > deadline {
                    return Err(AtlasError::DeadlineExceeded);
                }
            }
            *next_allowed = at + spacing;
            at
        };
        tokio::time::sleep_until(wait_until).await;
        Ok(())
    }
}

impl Default for RateGate {
    fn default() -> Self {
        Self::new()
    }
}

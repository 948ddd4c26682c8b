//! Rate-limited HTTP client shared by both provider adapters.
//!
//! Every attempt passes through the [`RateGate`] first, so retries respect
//! provider pacing too. Responses are classified into success, transient
//! (429/5xx/network — retried with backoff) and permanent (other 4xx).

use std::time::Duration;

use rand::Rng;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use atlas_core::types::Provider;
use atlas_core::{AtlasError, AtlasResult};

use crate::gate::{Lane, RateGate};

/// How the API key travels on the wire.
#[derive(Clone, Copy)]
pub enum AuthVariant<'a> {
    /// Sendline: `?api_key=...` query parameter.
    QueryApiKey(&'a str),
    /// Outflow: `x-api-key` header.
    HeaderApiKey(&'a str),
}

pub struct RequestOpts<'a> {
    pub retries: u32,
    pub allow_404: bool,
    pub spacing: Duration,
    pub lane: Lane,
    pub auth: AuthVariant<'a>,
    /// Sleep `attempt * backoff_step` after an HTTP 429.
    pub backoff_step: Duration,
    pub deadline: Option<Instant>,
}

pub struct ProviderClient {
    http: reqwest::Client,
    gate: RateGate,
}

impl ProviderClient {
    pub fn new() -> AtlasResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AtlasError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            gate: RateGate::new(),
        })
    }

    /// Issue a request against a provider endpoint.
    ///
    /// Returns `Ok(None)` for a 404 when `allow_404` is set; otherwise the
    /// parsed JSON body.
    pub async fn request(
        &self,
        provider: Provider,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        opts: RequestOpts<'_>,
    ) -> AtlasResult<Option<Value>> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.gate
                .acquire(provider, opts.lane, opts.spacing, opts.deadline)
                .await?;

            let mut req = self.http.request(method.clone(), url);
            match opts.auth {
                AuthVariant::QueryApiKey(key) => {
                    req = req.query(&[("api_key", key)]);
                }
                AuthVariant::HeaderApiKey(key) => {
                    req = req.header("x-api-key", key);
                }
            }
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(body) = body {
                req = req.json(body);
            }

            let response = match req.send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt >= opts.retries {
                        return Err(AtlasError::Provider(format!(
                            "{} request to {url} failed after {attempt} attempts: {e}",
                            provider.display_name()
                        )));
                    }
                    warn!(
                        provider = provider.as_str(),
                        url, attempt, error = %e, "Transport error, retrying"
                    );
                    tokio::time::sleep(retry_delay(attempt)).await;
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let json = response.json::<Value>().await.map_err(|e| {
                    AtlasError::DataShape(format!("non-JSON response from {url}: {e}"))
                })?;
                return Ok(Some(json));
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt >= opts.retries {
                    return Err(AtlasError::Provider(format!(
                        "{} rate limited after {attempt} attempts: {url}",
                        provider.display_name()
                    )));
                }
                let backoff = opts.backoff_step * attempt;
                warn!(
                    provider = provider.as_str(),
                    url,
                    attempt,
                    backoff_secs = backoff.as_secs(),
                    "HTTP 429, backing off"
                );
                metrics::counter!("provider.rate_limited").increment(1);
                tokio::time::sleep(backoff).await;
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                if opts.allow_404 {
                    debug!(provider = provider.as_str(), url, "404 tolerated");
                    return Ok(None);
                }
                return Err(AtlasError::Provider(format!("404 from {url}")));
            }

            if status.is_server_error() {
                if attempt >= opts.retries {
                    return Err(AtlasError::Provider(format!(
                        "{} returned {status} after {attempt} attempts: {url}",
                        provider.display_name()
                    )));
                }
                warn!(
                    provider = provider.as_str(),
                    url, attempt, status = status.as_u16(), "Server error, retrying"
                );
                tokio::time::sleep(retry_delay(attempt)).await;
                continue;
            }

            // Remaining 4xx: permanent.
            return Err(AtlasError::Provider(format!("{status} from {url}")));
        }
    }

    pub async fn get(
        &self,
        provider: Provider,
        url: &str,
        query: &[(&str, String)],
        opts: RequestOpts<'_>,
    ) -> AtlasResult<Option<Value>> {
        self.request(provider, Method::GET, url, query, None, opts).await
    }
}

/// Linear backoff with jitter for transport/5xx retries.
fn retry_delay(attempt: u32) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..250);
    Duration::from_secs(attempt as u64) + Duration::from_millis(jitter_ms)
}

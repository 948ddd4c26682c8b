use serde::Deserialize;

use crate::types::Provider;

/// Root application configuration. Loaded from environment variables with
/// the prefix `OUTREACH_ATLAS__`; a handful of legacy variable names
/// (`SUPABASE_URL`, `PROVIDER_A_WEBHOOK_SECRET`, ...) are honored as
/// overrides for deployments that still set them.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Base URL this instance is reachable at; self-continuations POST here.
    #[serde(default = "default_self_url")]
    pub self_url: String,
    /// Bearer credential for internal continuations and downstream hooks.
    /// Empty disables auth (development mode).
    #[serde(default)]
    pub service_token: String,
    /// Bearer credential accepted from external callers. Empty disables auth.
    #[serde(default)]
    pub anon_token: String,
}

/// Pacing, budget, and retry knobs for one provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Minimum spacing between list-level calls, in milliseconds.
    pub spacing_ms: u64,
    /// Minimum spacing between stats calls, in milliseconds.
    pub stats_spacing_ms: u64,
    /// Backoff step after HTTP 429: sleep `attempt * backoff_step_secs`.
    pub backoff_step_secs: u64,
    /// Wall-clock budget for one sync batch, in seconds.
    pub deadline_secs: u64,
    /// Hard cap on self-continuations per logical sync.
    pub max_batches: u32,
    pub page_size: usize,
    pub retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_sendline_config")]
    pub sendline: ProviderConfig,
    #[serde(default = "default_outflow_config")]
    pub outflow: ProviderConfig,
}

/// Signature encoding used by a provider's webhook headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    Hex,
    Base64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSecretConfig {
    /// HMAC secret. Unset accepts unsigned requests with a warning
    /// (development mode).
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_signature_encoding")]
    pub encoding: SignatureEncoding,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default = "default_webhook_secret_config")]
    pub sendline: WebhookSecretConfig,
    #[serde(default = "default_webhook_secret_config")]
    pub outflow: WebhookSecretConfig,
}

/// Backing store credentials. The in-memory gateway ignores these; they are
/// carried for parity with hosted deployments.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub service_key: String,
    #[serde(default)]
    pub anon_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Downstream analysis hooks fired after a completed sync.
#[derive(Debug, Clone, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_hooks_enabled")]
    pub enabled: bool,
}

// Default functions
fn default_node_id() -> String {
    "atlas-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_self_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_signature_encoding() -> SignatureEncoding {
    SignatureEncoding::Hex
}
fn default_hooks_enabled() -> bool {
    true
}
fn default_webhook_secret_config() -> WebhookSecretConfig {
    WebhookSecretConfig {
        secret: None,
        encoding: default_signature_encoding(),
    }
}
fn default_sendline_config() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://api.sendline.io".to_string(),
        spacing_ms: 250,
        stats_spacing_ms: 250,
        backoff_step_secs: 2,
        deadline_secs: 50,
        max_batches: 100,
        page_size: 100,
        retries: 3,
    }
}
fn default_outflow_config() -> ProviderConfig {
    ProviderConfig {
        base_url: "https://api.outflow.io".to_string(),
        spacing_ms: 3_000,
        stats_spacing_ms: 10_500,
        backoff_step_secs: 10,
        deadline_secs: 55,
        max_batches: 250,
        page_size: 100,
        retries: 3,
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            self_url: default_self_url(),
            service_token: String::new(),
            anon_token: String::new(),
        }
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            sendline: default_sendline_config(),
            outflow: default_outflow_config(),
        }
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            sendline: default_webhook_secret_config(),
            outflow: default_webhook_secret_config(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            enabled: default_hooks_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            providers: ProvidersConfig::default(),
            webhooks: WebhooksConfig::default(),
            store: StoreConfig::default(),
            metrics: MetricsConfig::default(),
            hooks: HooksConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables, then apply legacy
    /// variable-name overrides.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("OUTREACH_ATLAS")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        let mut app: AppConfig = config.try_deserialize()?;
        app.apply_legacy_env();
        Ok(app)
    }

    /// Honor the legacy environment variable names still used by existing
    /// deployments.
    fn apply_legacy_env(&mut self) {
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.store.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_ROLE_KEY") {
            self.store.service_key = key.clone();
            if self.api.service_token.is_empty() {
                self.api.service_token = key;
            }
        }
        if let Ok(key) = std::env::var("SUPABASE_ANON_KEY") {
            self.store.anon_key = key.clone();
            if self.api.anon_token.is_empty() {
                self.api.anon_token = key;
            }
        }
        if let Ok(secret) = std::env::var("PROVIDER_A_WEBHOOK_SECRET") {
            self.webhooks.sendline.secret = Some(secret);
        }
        if let Ok(secret) = std::env::var("PROVIDER_B_WEBHOOK_SECRET") {
            self.webhooks.outflow.secret = Some(secret);
        }
    }

    pub fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Sendline => &self.providers.sendline,
            Provider::Outflow => &self.providers.outflow,
        }
    }

    pub fn webhook_secret(&self, provider: Provider) -> &WebhookSecretConfig {
        match provider {
            Provider::Sendline => &self.webhooks.sendline,
            Provider::Outflow => &self.webhooks.outflow,
        }
    }
}

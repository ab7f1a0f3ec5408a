use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the indexer client
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Video indexer account configuration
    pub account: AccountConfig,
    /// HTTP client configuration
    #[serde(default)]
    pub http: HttpConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Video indexer account configuration
///
/// The subscription key is sent only to `api_url`'s origin.
#[derive(Clone, Deserialize)]
pub struct AccountConfig {
    /// Base API url
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Account region (e.g. "trial", "westus2")
    #[serde(default = "default_location")]
    pub location: String,
    /// Account id
    pub account_id: String,
    /// API management subscription key
    pub subscription_key: String,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("api_url", &self.api_url)
            .field("location", &self.location)
            .field("account_id", &self.account_id)
            .field("subscription_key", &"<redacted>")
            .finish()
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds (uploads may take a long time)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

// Default value functions
fn default_service_name() -> String {
    "indexer-client".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_url() -> String {
    "https://api.videoindexer.ai".to_string()
}

fn default_location() -> String {
    "trial".to_string()
}

fn default_request_timeout_secs() -> u64 {
    86_400 // one day
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("indexer-client/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "indexer-client")?
            .set_default("service.log_level", "info")?
            .add_source(config::File::with_name("config/indexer").required(false))
            .add_source(config::File::with_name("/etc/indexer/indexer").required(false))
            // INDEXER__ACCOUNT__SUBSCRIPTION_KEY -> account.subscription_key
            .add_source(
                config::Environment::with_prefix("INDEXER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get whole-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.http.request_timeout_secs)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.http.connect_timeout_secs)
    }
}

impl AccountConfig {
    /// Build an account configuration against the default API url
    pub fn new(
        location: impl Into<String>,
        account_id: impl Into<String>,
        subscription_key: impl Into<String>,
    ) -> Self {
        Self {
            api_url: default_api_url(),
            location: location.into(),
            account_id: account_id.into(),
            subscription_key: subscription_key.into(),
        }
    }

    /// Point the account at a different API host
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    /// `api_url` with any trailing slash removed, whether it came from a
    /// file, the environment or [`AccountConfig::with_api_url`]
    fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// `{api}/Auth/{location}/Accounts/{account}`
    pub(crate) fn auth_root(&self) -> String {
        format!(
            "{}/Auth/{}/Accounts/{}",
            self.api_base(), self.location, self.account_id
        )
    }

    /// `{api}/{location}/Accounts/{account}`
    pub(crate) fn account_root(&self) -> String {
        format!(
            "{}/{}/Accounts/{}",
            self.api_base(), self.location, self.account_id
        )
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

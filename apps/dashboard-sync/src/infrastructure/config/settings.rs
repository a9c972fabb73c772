//! Dashboard Configuration Settings
//!
//! Configuration types for the sync service, loaded from environment
//! variables once at startup.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use crate::domain::format::DecimalSettings;

/// REST API settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSettings {
    /// Base URL of the REST API, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Event feed connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Websocket URL of the event feed.
    pub url: String,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Capacity of the live event broadcast channel.
    pub event_channel_capacity: usize,
}

impl FeedSettings {
    /// Settings for a URL with default tuning.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
            event_channel_capacity: 1_024,
        }
    }
}

/// Widget refresh settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSettings {
    /// Interval between polls, measured from the end of the previous fetch.
    pub poll_interval: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    /// REST API settings.
    pub api: ApiSettings,
    /// Event feed settings.
    pub feed: FeedSettings,
    /// Refresh settings.
    pub refresh: RefreshSettings,
    /// Display precision.
    pub decimals: DecimalSettings,
    /// Symbols whose BBO and last-sale widgets are mounted.
    pub symbols: Vec<String>,
    /// Server port settings.
    pub server: ServerSettings,
    /// Directory for table exports written on shutdown.
    pub export_dir: Option<PathBuf>,
}

static GLOBAL: OnceLock<DashboardConfig> = OnceLock::new();

impl DashboardConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, empty or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing, empty or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let base_url = env.required("DASHBOARD_API_URL")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "DASHBOARD_API_URL".to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }

        let feed_url = env.required("DASHBOARD_FEED_URL")?;
        if !(feed_url.starts_with("ws://") || feed_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue {
                key: "DASHBOARD_FEED_URL".to_string(),
                reason: "expected a ws(s) URL".to_string(),
            });
        }

        let api = ApiSettings {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: env.duration_secs(
                "DASHBOARD_REQUEST_TIMEOUT_SECS",
                Duration::from_secs(10),
            ),
        };

        let defaults = FeedSettings::new(feed_url);
        let feed = FeedSettings {
            reconnect_delay_initial: env.duration_millis(
                "DASHBOARD_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "DASHBOARD_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "DASHBOARD_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "DASHBOARD_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            event_channel_capacity: env
                .parse(
                    "DASHBOARD_EVENT_CHANNEL_CAPACITY",
                    defaults.event_channel_capacity,
                )
                .max(1),
            ..defaults
        };

        let refresh = RefreshSettings {
            poll_interval: env.duration_secs(
                "DASHBOARD_POLL_INTERVAL_SECS",
                RefreshSettings::default().poll_interval,
            ),
        };

        let decimal_defaults = DecimalSettings::default();
        let decimals = DecimalSettings {
            price: env.parse("DASHBOARD_PRICE_DECIMALS", decimal_defaults.price),
            quantity: env.parse("DASHBOARD_QUANTITY_DECIMALS", decimal_defaults.quantity),
            percent: env.parse("DASHBOARD_PERCENT_DECIMALS", decimal_defaults.percent),
        };

        let symbols = env
            .get("DASHBOARD_SYMBOLS")
            .map(|raw| parse_symbols(&raw))
            .unwrap_or_default();

        let server = ServerSettings {
            health_port: env.parse(
                "DASHBOARD_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let export_dir = env.get("DASHBOARD_EXPORT_DIR").map(PathBuf::from);

        Ok(Self {
            api,
            feed,
            refresh,
            decimals,
            symbols,
            server,
            export_dir,
        })
    }

    /// Install the process-wide configuration.
    ///
    /// The first call wins; later calls return the already installed value.
    pub fn init_global(config: Self) -> &'static Self {
        GLOBAL.get_or_init(|| config)
    }

    /// The process-wide configuration, if installed.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL.get()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unusable value.
    #[error("environment variable {key} is invalid: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Split a comma separated symbol list, normalizing case and dropping blanks.
fn parse_symbols(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for symbol in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let symbol = symbol.to_uppercase();
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value.to_string())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    pub email: String,
    pub password: String,
    pub home_id: i64,
    /// IANA timezone name forwarded to the cloud API for day bucketing.
    pub timezone: String,
    /// Fixed offset used locally to decide which calendar day is "today".
    #[serde(default)]
    pub utc_offset_hours: i8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            window_hours: default_window_hours(),
        }
    }
}

/// Durable statistics store. Optional: without it the service still polls
/// and publishes snapshots, it just skips reconciliation.
#[derive(Debug, Clone, Deserialize)]
pub struct StatisticsConfig {
    pub uri: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_bind_addr")]
    pub bind_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_http_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub cloud: CloudConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    pub statistics: Option<StatisticsConfig>,
    #[serde(default)]
    pub http: HttpConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_auth_base_url() -> String {
    "https://api.homewizardeasyonline.com".to_string()
}

fn default_api_base_url() -> String {
    "https://homes.api.homewizard.com".to_string()
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_window_hours() -> i64 {
    48
}

fn default_http_bind_addr() -> String {
    "127.0.0.1:8088".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path =
            env::var("WATERMETER_CONFIG").unwrap_or_else(|_| "watermeter-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&contents)?;
        Ok(cfg)
    }
}

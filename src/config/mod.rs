//! Configuration management for skywatch
//!
//! Loads from optional TOML/YAML files + environment variables via .env.
//! Every knob has a default so an empty environment still produces a
//! runnable (if credential-less) configuration.

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::types::ProviderId;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub influx: InfluxConfig,
    pub stations: StationsConfig,
    pub checkwx: CheckWxConfig,
    pub yrno: YrNoConfig,
    pub netatmo: NetatmoConfig,
    pub energy: EnergyConfig,
    pub vatsim: VatsimConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    /// Store hostname (scheme-less)
    pub host: String,
    pub port: u16,
    /// API token; empty means unauthenticated local dev store
    pub token: String,
    pub org: String,
    pub bucket: String,
}

impl InfluxConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationsConfig {
    /// ICAO stations polled every slow tick
    pub icao: Vec<String>,
    /// Station used by the read API's merged /weather/current view
    pub default_station: String,
    /// METAR provider priority, highest first
    pub provider_priority: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckWxConfig {
    /// X-API-Key value; empty disables nothing, the upstream just rejects
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct YrNoConfig {
    pub latitude: String,
    pub longitude: String,
    /// met.no requires an identifying User-Agent
    pub user_agent: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetatmoConfig {
    pub client_id: String,
    pub client_secret: String,
    /// On-disk token cache written after every refresh
    pub token_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnergyConfig {
    /// Price region, e.g. NO2 (south-west Norway)
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VatsimConfig {
    pub datafeed_url: String,
    pub metar_url: String,
    /// Fast-cycle retry ceiling for the datafeed
    pub max_retries: u32,
    /// First backoff delay; doubles per attempt
    pub initial_backoff_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Slow cycle: METAR + forecast + sensor + prices
    pub slow_interval_secs: u64,
    /// Fast cycle: traffic census
    pub fast_interval_secs: u64,
    /// Deadline applied to every outbound request
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Config::builder()
            // Influx defaults
            .set_default("influx.host", "influxdb")?
            .set_default("influx.port", 8086)?
            .set_default("influx.token", "")?
            .set_default("influx.org", "myorg")?
            .set_default("influx.bucket", "weather")?
            // Stations defaults
            .set_default("stations.icao", vec!["ENZV", "KJFK", "ENGM", "KLAX"])?
            .set_default("stations.default_station", "ENZV")?
            .set_default(
                "stations.provider_priority",
                vec!["FAA", "CheckWX", "VATSIM"],
            )?
            // Provider defaults
            .set_default("checkwx.api_key", "")?
            .set_default("yrno.latitude", "58.9959")?
            .set_default("yrno.longitude", "5.6799")?
            .set_default("yrno.user_agent", "skywatch/0.5 github.com/skywatch")?
            .set_default("netatmo.client_id", "")?
            .set_default("netatmo.client_secret", "")?
            .set_default("netatmo.token_path", "/app/tokens/netatmo_tokens.json")?
            .set_default("energy.region", "NO2")?
            .set_default(
                "vatsim.datafeed_url",
                "https://data.vatsim.net/v3/vatsim-data.json",
            )?
            .set_default("vatsim.metar_url", "https://metar.vatsim.net/metar.php")?
            .set_default("vatsim.max_retries", 5)?
            .set_default("vatsim.initial_backoff_secs", 5)?
            // Scheduler defaults
            .set_default("scheduler.slow_interval_secs", 300)?
            .set_default("scheduler.fast_interval_secs", 30)?
            .set_default("scheduler.http_timeout_secs", 10)?
            // API defaults
            .set_default("api.enabled", true)?
            .set_default("api.port", 8080)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (SKYWATCH_*)
            .add_source(Environment::with_prefix("SKYWATCH").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Resolve the configured priority strings into provider ids,
    /// preserving order.
    pub fn provider_priority(&self) -> Result<Vec<ProviderId>> {
        let mut priority = Vec::with_capacity(self.stations.provider_priority.len());
        for name in &self.stations.provider_priority {
            match ProviderId::parse(name) {
                Some(id) => priority.push(id),
                None => bail!("Unknown METAR provider in priority list: {}", name),
            }
        }
        if priority.is_empty() {
            bail!("METAR provider priority list must not be empty");
        }
        Ok(priority)
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "stations={:?} priority={:?} slow={}s fast={}s bucket={} api={}",
            self.stations.icao,
            self.stations.provider_priority,
            self.scheduler.slow_interval_secs,
            self.scheduler.fast_interval_secs,
            self.influx.bucket,
            self.api.enabled
        )
    }

    /// Validate numeric ranges and required strings
    pub fn validate(&self) -> Result<()> {
        if self.stations.icao.is_empty() {
            bail!("At least one ICAO station must be configured");
        }
        if self.scheduler.slow_interval_secs == 0 || self.scheduler.fast_interval_secs == 0 {
            bail!("Polling intervals must be greater than zero");
        }
        if self.scheduler.http_timeout_secs == 0 {
            bail!("HTTP timeout must be greater than zero");
        }
        if self.vatsim.max_retries == 0 || self.vatsim.max_retries > 10 {
            bail!("vatsim.max_retries must be between 1 and 10");
        }
        if self.influx.host.is_empty() {
            bail!("influx.host must not be empty");
        }
        self.provider_priority()?;
        Ok(())
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

#[cfg(test)]
impl AppConfig {
    /// Fully-populated configuration for tests, independent of the
    /// environment.
    pub(crate) fn sample() -> Self {
        Self {
            influx: InfluxConfig {
                host: "influxdb".into(),
                port: 8086,
                token: "".into(),
                org: "myorg".into(),
                bucket: "weather".into(),
            },
            stations: StationsConfig {
                icao: vec!["ENZV".into(), "KJFK".into()],
                default_station: "ENZV".into(),
                provider_priority: vec!["FAA".into(), "CheckWX".into(), "VATSIM".into()],
            },
            checkwx: CheckWxConfig { api_key: "".into() },
            yrno: YrNoConfig {
                latitude: "58.9959".into(),
                longitude: "5.6799".into(),
                user_agent: "test".into(),
            },
            netatmo: NetatmoConfig {
                client_id: "".into(),
                client_secret: "".into(),
                token_path: "/tmp/tokens.json".into(),
            },
            energy: EnergyConfig {
                region: "NO2".into(),
            },
            vatsim: VatsimConfig {
                datafeed_url: "https://data.vatsim.net/v3/vatsim-data.json".into(),
                metar_url: "https://metar.vatsim.net/metar.php".into(),
                max_retries: 5,
                initial_backoff_secs: 5,
            },
            scheduler: SchedulerConfig {
                slow_interval_secs: 300,
                fast_interval_secs: 30,
                http_timeout_secs: 10,
            },
            api: ApiConfig {
                enabled: true,
                port: 8080,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig::sample()
    }

    #[test]
    fn test_priority_resolution_preserves_order() {
        let cfg = sample();
        let priority = cfg.provider_priority().unwrap();
        assert_eq!(
            priority,
            vec![ProviderId::Faa, ProviderId::CheckWx, ProviderId::Vatsim]
        );
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let mut cfg = sample();
        cfg.stations.provider_priority = vec!["NOAA".into()];
        assert!(cfg.provider_priority().is_err());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_ranges() {
        let mut cfg = sample();
        cfg.vatsim.max_retries = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = sample();
        cfg.scheduler.fast_interval_secs = 0;
        assert!(cfg.validate().is_err());

        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_influx_base_url() {
        let cfg = sample();
        assert_eq!(cfg.influx.base_url(), "http://influxdb:8086");
    }
}

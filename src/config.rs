use anyhow::{bail, Result};
use figment::{providers::{Env, Format, Toml}, Figment};
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::cache::{PeakSettings, DEFAULT_MAX_WIDTH};
use crate::coordinator::RefreshSettings;
use crate::forecast::TIBBER_ENDPOINT;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    #[validate(nested)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    #[validate(nested)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}
impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub staleness_minutes: i64,
    pub provider_timeout_seconds: u64,
    pub poll_interval_minutes: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { staleness_minutes: 120, provider_timeout_seconds: 10, poll_interval_minutes: 15 }
    }
}

impl RefreshConfig {
    pub fn settings(&self) -> RefreshSettings {
        RefreshSettings {
            staleness: chrono::Duration::minutes(self.staleness_minutes),
            provider_timeout: Duration::from_secs(self.provider_timeout_seconds),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProvidersConfig {
    #[validate(nested)]
    pub tibber: Option<TibberConfig>,
    #[validate(nested)]
    pub forecast_solar: Option<ForecastSolarConfig>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TibberConfig {
    #[validate(length(min = 1))]
    pub token: String,
    #[serde(default = "default_tibber_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ForecastSolarConfig {
    #[validate(length(min = 1))]
    pub urls: Vec<String>,
    /// Summed watts a bucket must exceed to count as "solar power available"
    pub watt_threshold: f64,
    /// Price reported for such a bucket
    pub price: f64,
    /// UTC offset of the timestamps in the responses, `+02:00` style;
    /// system local time when absent
    pub utc_offset: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SensorsConfig {
    #[serde(default)]
    #[validate(nested)]
    pub peak: Vec<PeakSensorConfig>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PeakSensorConfig {
    #[validate(length(min = 1))]
    pub name: String,
    pub threshold: Option<f64>,
    #[validate(range(min = 1))]
    pub distance: Option<usize>,
    #[serde(default = "default_max_width")]
    #[validate(range(min = 1.0))]
    pub max_width: f64,
    #[validate(range(min = 2))]
    pub lookup_window: Option<usize>,
    pub prominence: Option<f64>,
    #[serde(default)]
    pub trough: bool,
}

impl PeakSensorConfig {
    pub fn settings(&self) -> PeakSettings {
        PeakSettings {
            threshold: self.threshold,
            distance: self.distance,
            max_width: self.max_width,
            lookup_window: self.lookup_window,
            prominence: self.prominence,
            troughs: self.trough,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticsConfig {
    pub snapshot_dir: Option<PathBuf>,
}

fn default_request_timeout() -> u64 { 30 }
fn default_tibber_endpoint() -> String { TIBBER_ENDPOINT.to_string() }
fn default_max_width() -> f64 { DEFAULT_MAX_WIDTH }

impl Config {
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("POWER_FORECAST__").split("__"));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        let mut seen = HashSet::new();
        for sensor in &cfg.sensors.peak {
            if !seen.insert(sensor.name.as_str()) {
                bail!("duplicate peak sensor name: {}", sensor.name);
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config> {
        Config::from_figment(Figment::from(Toml::string(toml)))
    }

    const MINIMAL: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8080
    "#;

    #[test]
    fn test_defaults() {
        let cfg = parse(MINIMAL).unwrap();
        let refresh = cfg.refresh.settings();
        assert_eq!(refresh.staleness, chrono::Duration::hours(2));
        assert_eq!(refresh.provider_timeout, Duration::from_secs(10));
        assert_eq!(cfg.refresh.poll_interval(), Duration::from_secs(900));
        assert_eq!(cfg.server.request_timeout_secs, 30);
        assert!(cfg.providers.tibber.is_none());
        assert!(cfg.sensors.peak.is_empty());
    }

    #[test]
    fn test_full_config() {
        let cfg = parse(&format!(
            r#"{MINIMAL}
            [providers.tibber]
            token = "abc"

            [providers.forecast_solar]
            urls = ["https://api.forecast.solar/estimate/52/12/37/0/5.67"]
            watt_threshold = 2500.0
            price = 0.0

            [[sensors.peak]]
            name = "evening_peak"
            distance = 8

            [[sensors.peak]]
            name = "night_valley"
            trough = true
            max_width = 6.0
            lookup_window = 24
            "#
        ))
        .unwrap();

        let tibber = cfg.providers.tibber.unwrap();
        assert_eq!(tibber.endpoint, TIBBER_ENDPOINT);
        assert_eq!(cfg.providers.forecast_solar.unwrap().watt_threshold, 2500.0);

        let peak = cfg.sensors.peak[0].settings();
        assert_eq!(peak.distance, Some(8));
        assert_eq!(peak.max_width, DEFAULT_MAX_WIDTH);
        assert!(!peak.troughs);

        let valley = cfg.sensors.peak[1].settings();
        assert!(valley.troughs);
        assert_eq!(valley.lookup_window, Some(24));
    }

    #[test]
    fn test_rejects_tiny_lookup_window() {
        let err = parse(&format!(
            "{MINIMAL}\n[[sensors.peak]]\nname = \"p\"\nlookup_window = 1\n"
        ));
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_zero_distance() {
        let err = parse(&format!("{MINIMAL}\n[[sensors.peak]]\nname = \"p\"\ndistance = 0\n"));
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_duplicate_sensor_names() {
        let err = parse(&format!(
            "{MINIMAL}\n[[sensors.peak]]\nname = \"p\"\n[[sensors.peak]]\nname = \"p\"\n"
        ))
        .unwrap_err();
        assert_eq!(err.to_string(), "duplicate peak sensor name: p");
    }
}

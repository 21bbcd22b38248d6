use anyhow::{Context, Result};
use chrono::FixedOffset;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{LowestPriceCache, PeakCache, PriceLevelCache};
use crate::config::Config;
use crate::coordinator::RefreshCoordinator;
use crate::diagnostics::SnapshotDumper;
use crate::forecast::{ForecastProvider, ForecastSolarProvider, TibberProvider};
use crate::sensor::Sensor;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub coordinator: Arc<RefreshCoordinator>,
    pub sensors: Arc<Sensors>,
}

/// Every sensor the service exposes
pub struct Sensors {
    pub lowest_price: Sensor<f64>,
    pub price_level: Sensor<usize>,
    pub peaks: BTreeMap<String, Sensor<f64>>,
}

impl Sensors {
    /// Refresh at most once, then read every sensor at the current bucket
    pub async fn poll_all(&self, coordinator: &RefreshCoordinator) {
        if let Err(e) = coordinator.ensure_fresh().await {
            warn!(provider = e.provider(), error = %e, "refresh failed, serving cached values");
        }

        let bucket = self.lowest_price.current_bucket();
        let lowest = self.lowest_price.read_at(bucket);
        let level = self.price_level.read_at(bucket);
        debug!(%bucket, lowest_price = ?lowest.value, price_level = ?level.value, "price sensors polled");
        for (name, sensor) in &self.peaks {
            let reading = sensor.read_at(bucket);
            debug!(sensor = %name, value = ?reading.value, "peak sensor polled");
        }
    }
}

impl AppState {
    pub fn new(cfg: Config) -> Result<Self> {
        let providers = build_providers(&cfg)?;
        let coordinator = RefreshCoordinator::new(providers, cfg.refresh.settings())?;
        Ok(Self::with_coordinator(cfg, coordinator))
    }

    /// Register the caches and sensors the configuration asks for
    pub fn with_coordinator(cfg: Config, coordinator: RefreshCoordinator) -> Self {
        let coordinator = Arc::new(coordinator);

        if let Some(dir) = &cfg.diagnostics.snapshot_dir {
            info!(dir = %dir.display(), "snapshot dumps enabled");
            coordinator.register_observer(Arc::new(SnapshotDumper::new(dir)));
        }

        let lowest = LowestPriceCache::new();
        coordinator.register_cache_builder(Arc::new(lowest.clone()));
        let levels = PriceLevelCache::new();
        coordinator.register_cache_builder(Arc::new(levels.clone()));

        let mut peaks = BTreeMap::new();
        for sensor in &cfg.sensors.peak {
            let cache = PeakCache::new(sensor.name.clone(), sensor.settings());
            coordinator.register_cache_builder(Arc::new(cache.clone()));
            peaks.insert(
                sensor.name.clone(),
                Sensor::new(sensor.name.clone(), coordinator.clone(), cache.handle()).with_fallback(0.0),
            );
        }

        let sensors = Sensors {
            lowest_price: Sensor::new("lowest_price", coordinator.clone(), lowest.handle()),
            price_level: Sensor::new("price_level", coordinator.clone(), levels.handle()),
            peaks,
        };

        Self {
            cfg: Arc::new(cfg),
            coordinator,
            sensors: Arc::new(sensors),
        }
    }
}

pub fn build_providers(cfg: &Config) -> Result<Vec<Arc<dyn ForecastProvider>>> {
    let timeout = Duration::from_secs(cfg.refresh.provider_timeout_seconds);
    let mut providers: Vec<Arc<dyn ForecastProvider>> = Vec::new();

    if let Some(tibber) = &cfg.providers.tibber {
        providers.push(Arc::new(TibberProvider::new(
            tibber.endpoint.clone(),
            tibber.token.clone(),
            timeout,
        )?));
    }

    if let Some(solar) = &cfg.providers.forecast_solar {
        let mut provider =
            ForecastSolarProvider::new(solar.urls.clone(), solar.watt_threshold, solar.price, timeout)?;
        if let Some(offset) = &solar.utc_offset {
            let offset: FixedOffset = offset
                .parse()
                .with_context(|| format!("invalid forecast_solar utc_offset {offset:?}"))?;
            provider = provider.with_offset(offset);
        }
        providers.push(Arc::new(provider));
    }

    Ok(providers)
}

pub fn spawn_refresh_loop(state: AppState) -> JoinHandle<()> {
    let every = state.cfg.refresh.poll_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            state.sensors.poll_all(&state.coordinator).await;
            if !state.coordinator.is_fresh() {
                warn!(last_refresh = ?state.coordinator.last_refresh(), "forecast data is stale");
            }
        }
    })
}

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::controller::AppState;

/// Refresh state and cache sizes, without triggering a refresh
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub timestamp: DateTime<Utc>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub fresh: bool,
    pub snapshot_buckets: usize,
    pub caches: BTreeMap<String, usize>,
}

pub async fn get_status(State(st): State<AppState>) -> Json<ServiceStatus> {
    let sensors = &st.sensors;
    let mut caches = BTreeMap::new();
    caches.insert(sensors.lowest_price.name().to_string(), sensors.lowest_price.cached_buckets());
    caches.insert(sensors.price_level.name().to_string(), sensors.price_level.cached_buckets());
    for (name, sensor) in &sensors.peaks {
        caches.insert(name.clone(), sensor.cached_buckets());
    }

    Json(ServiceStatus {
        timestamp: st.coordinator.now(),
        last_refresh: st.coordinator.last_refresh(),
        fresh: st.coordinator.is_fresh(),
        snapshot_buckets: st.coordinator.snapshot().len(),
        caches,
    })
}

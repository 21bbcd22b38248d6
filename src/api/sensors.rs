use axum::{
    extract::{Path, State},
    Json,
};

use super::error::ApiError;
use crate::controller::AppState;
use crate::sensor::SensorReading;

/// GET /api/v1/sensors/lowest-price
pub async fn lowest_price(State(st): State<AppState>) -> Json<SensorReading<f64>> {
    Json(st.sensors.lowest_price.poll().await)
}

/// GET /api/v1/sensors/price-level
pub async fn price_level(State(st): State<AppState>) -> Json<SensorReading<usize>> {
    Json(st.sensors.price_level.poll().await)
}

/// GET /api/v1/sensors/peaks/:name
pub async fn peak(
    State(st): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SensorReading<f64>>, ApiError> {
    let sensor = st
        .sensors
        .peaks
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(format!("peak sensor {name}")))?;
    Ok(Json(sensor.poll().await))
}

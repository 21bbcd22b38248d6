use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{Coverage, ForecastProvider};
use crate::domain::{Bucket, ForecastEntry};
use crate::error::ProviderError;

const NAME: &str = "forecast_solar";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// forecast.solar client turning expected PV output into "cheap" slots.
///
/// Watts from all configured planes are summed per bucket; every bucket
/// above `watt_threshold` is reported at the fixed `price`, all others are
/// left out. Output is therefore partial by nature.
#[derive(Clone)]
pub struct ForecastSolarProvider {
    urls: Vec<String>,
    watt_threshold: f64,
    price: f64,
    offset: Option<FixedOffset>,
    client: reqwest::Client,
}

impl ForecastSolarProvider {
    pub fn new(urls: Vec<String>, watt_threshold: f64, price: f64, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("power-forecast/0.2"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            urls,
            watt_threshold,
            price,
            offset: None,
            client,
        })
    }

    /// Interpret the API's naive timestamps in `offset` instead of the host's local zone
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = Some(offset);
        self
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
        match self.offset {
            Some(offset) => offset.from_local_datetime(&naive).single(),
            None => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.fixed_offset()),
        }
    }

    async fn fetch_watts(&self, url: &str) -> Result<BTreeMap<String, f64>, ProviderError> {
        let http = |source| ProviderError::Http {
            provider: NAME,
            source,
        };
        let body: Value = self
            .client
            .get(url)
            .send()
            .await
            .map_err(http)?
            .json()
            .await
            .map_err(http)?;

        let has_result = body
            .get("result")
            .map(|r| r.as_object().is_some_and(|o| !o.is_empty()))
            .unwrap_or(false);
        if !has_result {
            let message = body.get("message").cloned().unwrap_or(Value::Null);
            return Err(ProviderError::Upstream {
                provider: NAME,
                payload: message.to_string(),
            });
        }

        let response: SolarResponse =
            serde_json::from_value(body).map_err(|e| ProviderError::Malformed {
                provider: NAME,
                reason: e.to_string(),
            })?;
        Ok(response.result.watts)
    }

    /// Add one plane's readings to `watts_by_bucket`.
    ///
    /// A reading describes the interval since the previous timestamp, so it
    /// is credited to every bucket from the previous reading up to, but not
    /// including, its own bucket.
    fn accumulate(
        &self,
        readings: &BTreeMap<String, f64>,
        watts_by_bucket: &mut BTreeMap<Bucket, f64>,
    ) -> Result<(), ProviderError> {
        let mut previous: Option<Bucket> = None;
        for (time, watts) in readings {
            let naive = NaiveDateTime::parse_from_str(time, TIME_FORMAT).map_err(|e| {
                ProviderError::Malformed {
                    provider: NAME,
                    reason: format!("timestamp {time:?}: {e}"),
                }
            })?;
            let instant = self.localize(naive).ok_or_else(|| ProviderError::Malformed {
                provider: NAME,
                reason: format!("timestamp {time:?} does not exist in the local zone"),
            })?;
            let current = Bucket::containing(instant);

            if let Some(mut slot) = previous {
                while slot < current {
                    *watts_by_bucket.entry(slot).or_insert(0.0) += watts;
                    slot = slot.next();
                }
            }
            previous = Some(current);
        }
        Ok(())
    }
}

#[async_trait]
impl ForecastProvider for ForecastSolarProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn coverage(&self) -> Coverage {
        Coverage::Partial
    }

    async fn get_forecast(&self) -> Result<Vec<ForecastEntry>, ProviderError> {
        let mut watts_by_bucket = BTreeMap::new();
        for url in &self.urls {
            let readings = self.fetch_watts(url).await?;
            self.accumulate(&readings, &mut watts_by_bucket)?;
        }

        Ok(watts_by_bucket
            .into_iter()
            .filter(|(_, watts)| *watts > self.watt_threshold)
            .map(|(bucket, _)| ForecastEntry::new(self.price, bucket.start()))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct SolarResponse {
    result: SolarResult,
}

#[derive(Debug, Deserialize)]
struct SolarResult {
    watts: BTreeMap<String, f64>,
}

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{Coverage, ForecastProvider};
use crate::domain::ForecastEntry;
use crate::error::ProviderError;

pub const TIBBER_ENDPOINT: &str = "https://api.tibber.com/v1-beta/gql";

const NAME: &str = "tibber";

const PRICE_QUERY: &str = r#"{
  viewer {
    homes {
      currentSubscription {
        priceInfo {
          today { total startsAt }
          tomorrow { total startsAt }
        }
      }
    }
  }
}"#;

/// Tibber GraphQL client for today's and tomorrow's spot prices.
///
/// Tibber publishes every slot of the day, so its output covers the whole
/// horizon.
#[derive(Clone)]
pub struct TibberProvider {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl TibberProvider {
    pub fn new(endpoint: String, token: String, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("power-forecast/0.2"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            endpoint,
            token,
            client,
        })
    }

    fn parse(&self, body: Value) -> Result<Vec<ForecastEntry>, ProviderError> {
        for key in ["errors", "error"] {
            if let Some(payload) = body.get(key) {
                return Err(ProviderError::Upstream {
                    provider: NAME,
                    payload: payload.to_string(),
                });
            }
        }

        let response: TibberResponse =
            serde_json::from_value(body).map_err(|e| ProviderError::Malformed {
                provider: NAME,
                reason: e.to_string(),
            })?;
        let price_info = response
            .data
            .viewer
            .homes
            .into_iter()
            .next()
            .and_then(|home| home.current_subscription)
            .map(|subscription| subscription.price_info)
            .ok_or_else(|| ProviderError::Malformed {
                provider: NAME,
                reason: "no home with an active subscription".to_string(),
            })?;

        Ok(price_info
            .today
            .into_iter()
            .chain(price_info.tomorrow)
            .map(|p| ForecastEntry::new(p.total, p.starts_at))
            .collect())
    }
}

#[async_trait]
impl ForecastProvider for TibberProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    fn coverage(&self) -> Coverage {
        Coverage::FullHorizon
    }

    async fn get_forecast(&self) -> Result<Vec<ForecastEntry>, ProviderError> {
        let http = |source| ProviderError::Http {
            provider: NAME,
            source,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": PRICE_QUERY }))
            .send()
            .await
            .map_err(http)?;
        let status = resp.status();
        let text = resp.text().await.map_err(http)?;

        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(ProviderError::Upstream {
                    provider: NAME,
                    payload: format!("HTTP {status}: {text}"),
                })
            }
            Err(e) => {
                return Err(ProviderError::Malformed {
                    provider: NAME,
                    reason: e.to_string(),
                })
            }
        };
        self.parse(body)
    }
}

#[derive(Debug, Deserialize)]
struct TibberResponse {
    data: TibberData,
}

#[derive(Debug, Deserialize)]
struct TibberData {
    viewer: TibberViewer,
}

#[derive(Debug, Deserialize)]
struct TibberViewer {
    homes: Vec<TibberHome>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TibberHome {
    current_subscription: Option<TibberSubscription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TibberSubscription {
    price_info: TibberPriceInfo,
}

#[derive(Debug, Deserialize)]
struct TibberPriceInfo {
    #[serde(default)]
    today: Vec<TibberPrice>,
    #[serde(default)]
    tomorrow: Vec<TibberPrice>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TibberPrice {
    total: f64,
    starts_at: DateTime<FixedOffset>,
}

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::analysis::PeakError;

/// Failure reported by a forecast provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} responded with: {payload}")]
    Upstream {
        provider: &'static str,
        payload: String,
    },

    #[error("{provider} returned a malformed response: {reason}")]
    Malformed {
        provider: &'static str,
        reason: String,
    },
}

/// Reason a refresh cycle was aborted.
///
/// Cloneable so every caller that joined an in-flight cycle receives the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("provider {provider} failed: {source}")]
    Provider {
        provider: &'static str,
        #[source]
        source: Arc<ProviderError>,
    },

    #[error("provider {provider} did not answer within {timeout:?}")]
    Timeout {
        provider: &'static str,
        timeout: Duration,
    },
}

impl RefreshError {
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Provider { provider, .. } | Self::Timeout { provider, .. } => provider,
        }
    }
}

/// Startup configuration that cannot produce a working coordinator
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no forecast providers configured")]
    NoProviders,

    #[error("needs at least one provider that covers the whole horizon, like Tibber")]
    NoFullHorizonProvider,
}

/// Failure of a single cache builder; isolated from the other builders
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("peak cache {cache}: {source}")]
    Peak {
        cache: String,
        #[source]
        source: PeakError,
    },
}

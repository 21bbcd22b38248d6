use async_trait::async_trait;

use crate::domain::ForecastEntry;
use crate::error::ProviderError;

/// How much of the rolling horizon a provider's output describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// Every slot of the horizon has a value; gaps are resolution artifacts
    /// and get filled before merging.
    FullHorizon,
    /// Only some slots are reported; a missing slot means "no forecast"
    /// and must stay missing.
    Partial,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    /// Short identifier used in logs and errors
    fn name(&self) -> &'static str;

    fn coverage(&self) -> Coverage;

    /// Entries for the visible horizon, sorted by instant but not
    /// necessarily bucket-aligned or gap-free.
    async fn get_forecast(&self) -> Result<Vec<ForecastEntry>, ProviderError>;
}

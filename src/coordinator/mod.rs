pub mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::CacheBuilder;
use crate::diagnostics::SnapshotObserver;
use crate::error::{ConfigurationError, RefreshError};
use crate::forecast::{aggregate, AggregatedMap, Coverage, ForecastProvider, ProviderOutput};

/// Refresh policy
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    /// How long a successful refresh stays valid
    pub staleness: chrono::Duration,
    /// Per-provider deadline within one cycle
    pub provider_timeout: Duration,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            staleness: chrono::Duration::hours(2),
            provider_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
}

/// What `ensure_fresh` ended up doing for its caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Data was fresh, nothing fetched
    AlreadyFresh,
    /// This call ran a successful cycle
    Refreshed,
    /// Another caller's cycle completed while this one waited
    Joined,
}

#[derive(Default)]
struct CycleState {
    last_failure: Option<RefreshError>,
}

/// Owns the providers and the refresh cycle.
///
/// A cycle fetches every provider, aggregates the results into one
/// snapshot and hands that snapshot to every registered cache builder.
/// Only a cycle that got through all of that advances `last_refresh`.
pub struct RefreshCoordinator {
    providers: Vec<Arc<dyn ForecastProvider>>,
    builders: RwLock<Vec<Arc<dyn CacheBuilder>>>,
    observers: RwLock<Vec<Arc<dyn SnapshotObserver>>>,
    settings: RefreshSettings,
    clock: Arc<dyn Clock>,
    last_refresh: RwLock<Option<DateTime<Utc>>>,
    snapshot: RwLock<Arc<AggregatedMap>>,
    completed_cycles: AtomicU64,
    in_flight: Mutex<CycleState>,
}

impl RefreshCoordinator {
    pub fn new(
        providers: Vec<Arc<dyn ForecastProvider>>,
        settings: RefreshSettings,
    ) -> Result<Self, ConfigurationError> {
        Self::with_clock(providers, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        providers: Vec<Arc<dyn ForecastProvider>>,
        settings: RefreshSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigurationError> {
        if providers.is_empty() {
            return Err(ConfigurationError::NoProviders);
        }
        if !providers
            .iter()
            .any(|p| p.coverage() == Coverage::FullHorizon)
        {
            return Err(ConfigurationError::NoFullHorizonProvider);
        }

        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        info!(
            providers = ?names,
            staleness_minutes = settings.staleness.num_minutes(),
            timeout_secs = settings.provider_timeout.as_secs(),
            "refresh coordinator ready"
        );

        Ok(Self {
            providers,
            builders: RwLock::new(Vec::new()),
            observers: RwLock::new(Vec::new()),
            settings,
            clock,
            last_refresh: RwLock::new(None),
            snapshot: RwLock::new(Arc::new(AggregatedMap::new())),
            completed_cycles: AtomicU64::new(0),
            in_flight: Mutex::new(CycleState::default()),
        })
    }

    /// Add a builder; it runs on every later cycle, after those registered before it
    pub fn register_cache_builder(&self, builder: Arc<dyn CacheBuilder>) {
        debug!(builder = builder.name(), "cache builder registered");
        self.builders.write().push(builder);
    }

    pub fn register_observer(&self, observer: Arc<dyn SnapshotObserver>) {
        self.observers.write().push(observer);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_refresh.read()
    }

    pub fn freshness(&self) -> Freshness {
        match self.last_refresh() {
            Some(at) if self.clock.now() - at <= self.settings.staleness => Freshness::Fresh,
            _ => Freshness::Stale,
        }
    }

    pub fn is_fresh(&self) -> bool {
        self.freshness() == Freshness::Fresh
    }

    /// Latest aggregated snapshot, empty before the first successful cycle
    pub fn snapshot(&self) -> Arc<AggregatedMap> {
        Arc::clone(&self.snapshot.read())
    }

    pub fn builder_names(&self) -> Vec<String> {
        self.builders
            .read()
            .iter()
            .map(|b| b.name().to_string())
            .collect()
    }

    /// Make sure the derived caches are no older than the staleness window.
    ///
    /// Callers arriving while a cycle is running wait for it and share its
    /// result instead of fetching again. A failed cycle leaves every cache
    /// and `last_refresh` as they were, so the next call retries.
    pub async fn ensure_fresh(&self) -> Result<RefreshOutcome, RefreshError> {
        if self.is_fresh() {
            return Ok(RefreshOutcome::AlreadyFresh);
        }

        let seen = self.completed_cycles.load(Ordering::Acquire);
        let mut cycle = self.in_flight.lock().await;
        if self.completed_cycles.load(Ordering::Acquire) != seen {
            return match &cycle.last_failure {
                None => Ok(RefreshOutcome::Joined),
                Some(e) => Err(e.clone()),
            };
        }
        if self.is_fresh() {
            return Ok(RefreshOutcome::AlreadyFresh);
        }

        let result = self.run_cycle().await;
        cycle.last_failure = result.as_ref().err().cloned();
        self.completed_cycles.fetch_add(1, Ordering::Release);
        result.map(|()| RefreshOutcome::Refreshed)
    }

    async fn run_cycle(&self) -> Result<(), RefreshError> {
        info!(providers = self.providers.len(), "refreshing forecasts");
        match self.fetch_all().await {
            Ok(outputs) => {
                let snapshot = self.publish(&outputs);
                self.notify_observers(snapshot).await;
                Ok(())
            }
            Err(e) => {
                warn!(provider = e.provider(), error = %e, "refresh aborted, keeping previous caches");
                Err(e)
            }
        }
    }

    async fn fetch_all(&self) -> Result<Vec<ProviderOutput>, RefreshError> {
        let timeout = self.settings.provider_timeout;
        let fetches = self.providers.iter().map(|provider| async move {
            let name = provider.name();
            match tokio::time::timeout(timeout, provider.get_forecast()).await {
                Ok(Ok(entries)) => {
                    debug!(provider = name, entries = entries.len(), "forecast received");
                    Ok(ProviderOutput::new(provider.coverage(), entries))
                }
                Ok(Err(e)) => Err(RefreshError::Provider {
                    provider: name,
                    source: Arc::new(e),
                }),
                Err(_) => Err(RefreshError::Timeout {
                    provider: name,
                    timeout,
                }),
            }
        });
        futures::future::try_join_all(fetches).await
    }

    /// Aggregate and fan out. Runs without suspension points so a cancelled
    /// caller can never leave a half-published cycle behind.
    fn publish(&self, outputs: &[ProviderOutput]) -> Arc<AggregatedMap> {
        let snapshot = Arc::new(aggregate(outputs));

        let builders = self.builders.read().clone();
        let mut failed = 0;
        for builder in &builders {
            if let Err(e) = builder.build(&snapshot) {
                failed += 1;
                error!(builder = builder.name(), error = %e, "cache builder failed");
            }
        }

        *self.snapshot.write() = Arc::clone(&snapshot);
        *self.last_refresh.write() = Some(self.clock.now());
        info!(
            buckets = snapshot.len(),
            entries = snapshot.entry_count(),
            builders = builders.len(),
            failed_builders = failed,
            "forecast caches refreshed"
        );
        snapshot
    }

    /// Observers may block on I/O, so they run on the blocking pool once the
    /// caches are already published.
    async fn notify_observers(&self, snapshot: Arc<AggregatedMap>) {
        let observers = self.observers.read().clone();
        if observers.is_empty() {
            return;
        }
        let notified = tokio::task::spawn_blocking(move || {
            for observer in &observers {
                observer.on_snapshot(&snapshot);
            }
        })
        .await;
        if let Err(e) = notified {
            error!(error = %e, "snapshot observer panicked");
        }
    }
}

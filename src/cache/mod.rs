pub mod handle;
pub mod lowest_price;
pub mod peaks;
pub mod price_level;

pub use handle::*;
pub use lowest_price::*;
pub use peaks::*;
pub use price_level::*;

use crate::error::BuildError;
use crate::forecast::AggregatedMap;

/// Consumer of each freshly aggregated snapshot.
///
/// Called synchronously once per successful refresh cycle; the builder
/// reduces the snapshot to its own view and publishes it through its own
/// [`CacheHandle`].
pub trait CacheBuilder: Send + Sync {
    fn name(&self) -> &str;

    fn build(&self, snapshot: &AggregatedMap) -> Result<(), BuildError>;
}

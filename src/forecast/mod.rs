pub mod aggregator;
pub mod forecast_solar;
pub mod provider;
pub mod tibber;

pub use aggregator::*;
pub use forecast_solar::*;
pub use provider::*;
pub use tibber::*;

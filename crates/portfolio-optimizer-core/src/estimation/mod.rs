pub mod metrics;
pub mod series;
pub mod statistics;

pub use series::PriceSeries;
pub use statistics::{estimate_statistics, MarketEstimates};

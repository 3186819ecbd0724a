pub mod data;
pub mod error;
pub mod estimation;
pub(crate) mod linalg;
pub mod optimization;
pub mod request;
pub mod types;

pub use error::{ErrorCategory, OptimizerError};
pub use request::{optimize_from_prices, optimize_portfolio, PortfolioRequest, PortfolioResponse};
pub use types::*;

/// Standard result type for all optimizer operations
pub type OptimizerResult<T> = Result<T, OptimizerError>;

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{ApiResult, OptimizerError};

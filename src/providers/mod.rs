//! Provider adapters.
//!
//! - [`traits`]: the [`ProviderAdapter`] contract
//! - [`truncation`]: deterministic truncation check run by `invoke`
//! - [`retry`]: [`RetryingAdapter`] decorator
//! - [`latency`]: EWMA latency tracking
//! - [`serverless`], [`gateway`], [`local`]: reqwest-based backends

pub mod gateway;
mod http;
pub mod latency;
pub mod local;
pub mod retry;
pub mod serverless;
pub mod traits;
pub mod truncation;

pub use gateway::GatewayAdapter;
pub use http::DEFAULT_REQUEST_TIMEOUT;
pub use latency::{LatencyTable, ProviderLatency};
pub use local::LocalAdapter;
pub use retry::{RetryConfig, RetryingAdapter};
pub use serverless::ServerlessAdapter;
pub use traits::{AdapterResult, ProviderAdapter};

//! Public types for the Hermod API.

mod failure;
mod request;
mod response;

pub use failure::{FailureKind, Health, ProviderFailure};
pub use request::Request;
pub use response::{FinishReason, ProviderResponse, RoutedResponse, Usage};

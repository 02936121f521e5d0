//! Configuration subsystem.
//!
//! - [`document`]: typed, validated configuration structures and the
//!   persisted JSON layout.
//! - [`store`]: the live [`ConfigStore`] every other component reads
//!   through, with validated setters, persistence and change observers.

pub mod document;
pub mod store;

pub use document::{
    CachingPolicy, ConfigDocument, GlobalCaching, ModelConfig, ProviderConfig, SystemPolicy,
};
pub use store::{ConfigChange, ConfigObserver, ConfigStore};

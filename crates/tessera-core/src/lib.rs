//! tessera-core — shared building blocks for the Tessera operator.
//!
//! - [`config`]: `tessera.toml` operator configuration
//! - [`timeouts`]: global deadline policy for outbound calls
//! - [`features`]: static feature table and per-process overrides
//! - [`interval`]: requeue interval arithmetic for control loops

pub mod config;
pub mod features;
pub mod interval;
pub mod timeouts;

pub use config::OperatorConfig;
pub use features::{Feature, FeatureSet};
pub use interval::Interval;
pub use timeouts::{Timeout, TimeoutError, Timeouts};

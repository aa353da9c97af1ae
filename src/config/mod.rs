//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and loading
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup checks that report every problem at once

mod defaults;
mod types;
mod validation;

pub use types::{BridgeConfig, Config, ConfigError, DatabaseConfig, IrcConfig, TimingConfig};
pub use validation::{ValidationError, validate};

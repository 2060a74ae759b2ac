//! Shared configuration and error taxonomy for the casebridge workspace.

pub mod config;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use errors::{ChatStage, RelayError};

#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod logging;
pub mod server;

use serde::Deserialize;

pub use loader::Overrides;
pub use logging::*;
pub use server::*;

/// Top-level Keel configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener and pipeline configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

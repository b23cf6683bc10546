use std::path::PathBuf;

use serde::Deserialize;

/// Listener and request pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Base directory; relative paths elsewhere resolve against it
    #[serde(default = "default_home_dir")]
    pub home_dir: PathBuf,
    /// Bind host. When unset the server binds every interface and
    /// announces the machine's own address.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: bool,
    #[serde(default = "default_true")]
    pub compression: bool,
    /// Install the standard failure rules
    #[serde(default = "default_true")]
    pub default_failure_mappers: bool,
    /// Path prefix under which application routes are mounted
    #[serde(default = "default_service_path")]
    pub service_path: String,
    #[serde(default)]
    pub static_files: Option<StaticFilesConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            host: None,
            port: default_port(),
            cors: false,
            compression: true,
            default_failure_mappers: true,
            service_path: default_service_path(),
            static_files: None,
        }
    }
}

/// Static file mount
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticFilesConfig {
    /// Directory to serve, absolute or relative to the home directory
    pub dir: PathBuf,
    /// Mount path
    #[serde(default = "default_static_path")]
    pub path: String,
}

fn default_home_dir() -> PathBuf {
    PathBuf::from(".")
}

const fn default_port() -> u16 {
    8080
}

const fn default_true() -> bool {
    true
}

fn default_service_path() -> String {
    "/".to_string()
}

fn default_static_path() -> String {
    "/".to_string()
}

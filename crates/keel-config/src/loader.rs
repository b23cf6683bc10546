use std::path::{Path, PathBuf};

use crate::Config;

/// Development configuration, preferred when present
const DEV_CONFIG: &str = "etc/devconfig.toml";
const CONFIG: &str = "etc/config.toml";

/// Values supplied on the command line or through the environment
///
/// Every `Some` field wins over the file value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub home_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors: Option<bool>,
    pub compression: Option<bool>,
    pub log_filter: Option<String>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `${VAR}` placeholders, then deserializes and
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, a referenced variable is
    /// unset, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded =
            crate::env::expand_env(&raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Find and load the configuration belonging to a home directory
    ///
    /// Uses `etc/devconfig.toml` when it exists, then `etc/config.toml`, and
    /// falls back to defaults when neither is present. A loaded file that
    /// does not set `home_dir` inherits `home`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be loaded
    pub fn discover(home: &Path) -> anyhow::Result<Self> {
        let candidate = [DEV_CONFIG, CONFIG]
            .iter()
            .map(|relative| home.join(relative))
            .find(|path| path.is_file());

        let Some(path) = candidate else {
            tracing::debug!(home = %home.display(), "no config file found, using defaults");
            let mut config = Self::default();
            config.server.home_dir = home.to_path_buf();
            return Ok(config);
        };

        tracing::debug!(path = %path.display(), "loading config");
        let mut config = Self::load(&path)?;
        if config.server.home_dir == Path::new(".") {
            config.server.home_dir = home.to_path_buf();
        }
        Ok(config)
    }

    /// Apply command-line and environment overrides on top of file values
    #[must_use]
    pub fn apply_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(home_dir) = overrides.home_dir {
            self.server.home_dir = home_dir;
        }
        if let Some(host) = overrides.host {
            self.server.host = Some(host);
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(cors) = overrides.cors {
            self.server.cors = cors;
        }
        if let Some(compression) = overrides.compression {
            self.server.compression = compression;
        }
        if let Some(filter) = overrides.log_filter {
            self.logging.filter = filter;
        }
        self
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a mount path is not absolute or the static
    /// directory is empty
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_mount_path("server.service_path", &self.server.service_path)?;

        if let Some(ref static_files) = self.server.static_files {
            if static_files.dir.as_os_str().is_empty() {
                anyhow::bail!("server.static_files.dir must not be empty");
            }
            validate_mount_path("server.static_files.path", &static_files.path)?;
        }

        if let Some(ref host) = self.server.host
            && host.trim().is_empty()
        {
            anyhow::bail!("server.host must not be blank when set");
        }

        Ok(())
    }
}

fn validate_mount_path(key: &str, path: &str) -> anyhow::Result<()> {
    if !path.starts_with('/') {
        anyhow::bail!("{key} must start with '/': {path:?}");
    }
    if path.contains('*') || path.contains('{') {
        anyhow::bail!("{key} must be a literal path: {path:?}");
    }
    Ok(())
}

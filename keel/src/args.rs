use std::path::PathBuf;

use clap::Parser;
use keel_config::Overrides;

/// Keel demo server
#[derive(Debug, Parser)]
#[command(name = "keel", about = "JSON service scaffold with uniform failure envelopes")]
pub struct Args {
    /// Path to a configuration file; discovered under the home directory when omitted
    #[arg(short, long, env = "KEEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Home directory for configuration, logs and relative static paths
    #[arg(long, env = "KEEL_HOME")]
    pub home: Option<PathBuf>,

    /// Override the bind host
    #[arg(long, env = "KEEL_HOST")]
    pub host: Option<String>,

    /// Override the listen port
    #[arg(short, long, env = "KEEL_PORT")]
    pub port: Option<u16>,

    /// Enable or disable CORS headers
    #[arg(long, env = "KEEL_CORS")]
    pub cors: Option<bool>,

    /// Enable or disable response compression
    #[arg(long, env = "KEEL_COMPRESSION")]
    pub compression: Option<bool>,

    /// Log filter directives, e.g. `info,keel::request=warn`
    #[arg(long, env = "KEEL_LOG")]
    pub log_filter: Option<String>,
}

impl Args {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            home_dir: self.home.clone(),
            host: self.host.clone(),
            port: self.port,
            cors: self.cors,
            compression: self.compression,
            log_filter: self.log_filter.clone(),
        }
    }
}

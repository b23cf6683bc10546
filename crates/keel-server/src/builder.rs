use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::response::Response;
use http::header::SERVER;
use keel_config::{Config, LoggingConfig};
use keel_core::{Registry, Rule};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::codec::{SharedCodec, default_codec, encode_json};
use crate::failure::{classify_failures, not_allowed, not_found, panic_response};
use crate::request_log::{NcsaRequestLog, RequestLog, RequestLogState, log_requests};
use crate::{Composition, Server, StaticMount, address, cors, static_files};

/// Server assembly
///
/// Collects options, then [`Builder::build`] consumes it and freezes the
/// result into a [`Server`].
pub struct Builder {
    home_dir: PathBuf,
    host: Option<String>,
    port: u16,
    cors: bool,
    compression: bool,
    default_failure_mappers: bool,
    failure_rules: Vec<Rule>,
    static_files: Option<StaticMount>,
    service_path: String,
    request_log: Option<Arc<dyn RequestLog>>,
    codec: Option<SharedCodec>,
    routers: Vec<Router>,
    logging: LoggingConfig,
    stop_at_shutdown: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from("."),
            host: None,
            port: 8080,
            cors: false,
            compression: true,
            default_failure_mappers: true,
            failure_rules: Vec::new(),
            static_files: None,
            service_path: "/".to_owned(),
            request_log: None,
            codec: None,
            routers: Vec::new(),
            logging: LoggingConfig::default(),
            stop_at_shutdown: true,
        }
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder preset from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let server = &config.server;
        let mut builder = Self::new()
            .home_dir(&server.home_dir)
            .port(server.port)
            .cors(server.cors)
            .compression(server.compression)
            .default_failure_mappers(server.default_failure_mappers)
            .service_path(&server.service_path)
            .logging(config.logging.clone());

        if let Some(ref host) = server.host {
            builder = builder.host(host);
        }
        if let Some(ref files) = server.static_files {
            builder = builder.static_files(&files.dir, &files.path);
        }
        builder
    }

    #[must_use]
    pub fn home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = dir.into();
        self
    }

    /// Host to bind and announce; defaults to every interface, announced
    /// as the machine's own address
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub const fn cors(mut self, enabled: bool) -> Self {
        self.cors = enabled;
        self
    }

    #[must_use]
    pub const fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Install the standard failure rules; when off, only caller rules and
    /// the catch-all remain
    #[must_use]
    pub const fn default_failure_mappers(mut self, enabled: bool) -> Self {
        self.default_failure_mappers = enabled;
        self
    }

    /// Add a failure rule, evaluated after the standard ones
    #[must_use]
    pub fn failure_rule(mut self, rule: Rule) -> Self {
        self.failure_rules.push(rule);
        self
    }

    /// Serve `dir` at `path`; relative directories resolve against the home directory
    #[must_use]
    pub fn static_files(mut self, dir: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        self.static_files = Some(StaticMount {
            dir: dir.into(),
            path: path.into(),
        });
        self
    }

    /// Prefix for every registered route
    #[must_use]
    pub fn service_path(mut self, path: impl Into<String>) -> Self {
        self.service_path = path.into();
        self
    }

    /// Replace the default access log
    #[must_use]
    pub fn request_log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.request_log = Some(log);
        self
    }

    /// Replace the default JSON codec
    #[must_use]
    pub fn codec(mut self, codec: SharedCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Register application routes
    #[must_use]
    pub fn register(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    #[must_use]
    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Stop when the process receives SIGINT or SIGTERM
    #[must_use]
    pub const fn stop_at_shutdown(mut self, enabled: bool) -> Self {
        self.stop_at_shutdown = enabled;
        self
    }

    /// Assemble the server
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be resolved, logging
    /// cannot be initialized, a mount path is invalid, or the host does not
    /// resolve
    pub fn build(self) -> anyhow::Result<Server> {
        let service_path = normalize_mount("service path", &self.service_path)?;

        // Home directory and logging
        let home_dir = std::path::absolute(&self.home_dir)
            .map_err(|e| anyhow::anyhow!("failed to resolve home directory {}: {e}", self.home_dir.display()))?;
        let log_guard = keel_telemetry::init(&home_dir, &self.logging)?;

        // Failure rules
        let base = if self.default_failure_mappers {
            Registry::standard()
        } else {
            Registry::fallback_only()
        };
        let registry = Arc::new(self.failure_rules.into_iter().fold(base, Registry::with_rule));

        // Codec
        let custom_codec = self.codec.is_some();
        let codec = self.codec.unwrap_or_else(default_codec);

        // Address
        let binding = address::resolve(self.host.as_deref(), self.port)?;
        let public_uri = address::public_uri(&binding.public_host, self.port, &service_path)?;

        // Application routes
        let api = self
            .routers
            .into_iter()
            .fold(Router::new(), |api, router| api.merge(router))
            .method_not_allowed_fallback(not_allowed);
        let mut app = if service_path == "/" {
            api
        } else {
            Router::new().nest(&service_path, api)
        };

        // Static files
        let static_mount = match self.static_files {
            Some(mount) => {
                let path = normalize_mount("static path", &mount.path)?;
                if path != "/" && path == service_path {
                    anyhow::bail!("static path {path} collides with the service path");
                }
                let dir = static_files::resolve_dir(&home_dir, &mount.dir);
                if !dir.is_dir() {
                    tracing::warn!(dir = %dir.display(), "static directory does not exist");
                }
                Some(StaticMount { dir, path })
            }
            None => None,
        };
        match static_mount {
            Some(ref mount) if mount.path == "/" => {
                app = static_files::mount(app, &mount.dir, &mount.path);
            }
            Some(ref mount) => {
                app = static_files::mount(app.fallback(not_found), &mount.dir, &mount.path);
            }
            None => app = app.fallback(not_found),
        }

        // Request log
        let custom_request_log = self.request_log.is_some();
        let request_log = self
            .request_log
            .unwrap_or_else(|| Arc::new(NcsaRequestLog::new()));
        let log_state = RequestLogState::new(request_log);

        let composition = Composition {
            failure_rules: registry.rule_names(),
            cors: self.cors,
            compression: self.compression,
            custom_codec,
            service_path,
            static_mount,
            request_log_ignores: log_state.ignore_paths(),
            custom_request_log,
            stop_at_shutdown: self.stop_at_shutdown,
        };

        // Layers, innermost first
        app = app
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(axum::middleware::from_fn_with_state(registry, classify_failures))
            .layer(axum::middleware::from_fn_with_state(codec, encode_json));
        if self.cors {
            app = app.layer(axum::middleware::from_fn(cors::cors_middleware));
        }
        if self.compression {
            app = app.layer(CompressionLayer::new());
        }
        app = app
            .layer(TraceLayer::new_for_http().on_failure(()))
            .layer(axum::middleware::from_fn_with_state(log_state, log_requests))
            .layer(axum::middleware::map_response(strip_server_header));

        tracing::info!(uri = %public_uri, home = %home_dir.display(), "server assembled");

        Ok(Server::new(app, binding.bind, public_uri, composition, log_guard))
    }
}

async fn strip_server_header(mut response: Response) -> Response {
    response.headers_mut().remove(SERVER);
    response
}

/// Mount paths start with `/` and carry no trailing slash (except the root)
fn normalize_mount(what: &str, path: &str) -> anyhow::Result<String> {
    if !path.starts_with('/') {
        anyhow::bail!("{what} must start with '/': {path:?}");
    }
    let trimmed = path.trim_end_matches('/');
    Ok(if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    })
}

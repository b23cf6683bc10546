//! HTTP server assembly for Keel
//!
//! [`Server::builder`] wires application routes together with the failure
//! classification layer, the JSON codec and the optional cross-cutting
//! filters (CORS, compression, static files, access log) into one listener.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod address;
mod builder;
mod codec;
mod cors;
mod extract;
mod failure;
mod request_log;
mod shutdown;
mod static_files;

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::Router;
use keel_telemetry::LogGuard;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use url::Url;

pub use builder::Builder;
pub use codec::{DefaultCodec, EncodeError, Json, JsonCodec, SharedCodec, default_codec};
pub use extract::{Form, Path, Query};
pub use failure::{HandlerError, HandlerResult, PanicError, RaisedFailure, classify_failures};
pub use request_log::{DEFAULT_IGNORE_PATHS, NcsaRequestLog, RequestEntry, RequestLog};

/// Static directory and the path it is served under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticMount {
    pub dir: PathBuf,
    pub path: String,
}

/// Frozen description of what a built server does
///
/// Two builders with the same options produce equal compositions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    /// Failure rule names in evaluation order, catch-all last
    pub failure_rules: Vec<&'static str>,
    pub cors: bool,
    pub compression: bool,
    pub custom_codec: bool,
    pub service_path: String,
    pub static_mount: Option<StaticMount>,
    pub request_log_ignores: Vec<String>,
    pub custom_request_log: bool,
    pub stop_at_shutdown: bool,
}

/// Assembled server
pub struct Server {
    router: Router,
    bind_address: SocketAddr,
    local_address: Option<SocketAddr>,
    public_uri: Url,
    composition: Composition,
    shutdown: CancellationToken,
    task: Option<JoinHandle<std::io::Result<()>>>,
    _log_guard: LogGuard,
}

/// Cloneable remote control for a running [`Server`]
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shutdown: CancellationToken,
    task: Option<AbortHandle>,
}

impl ServerHandle {
    /// Stop accepting connections and let in-flight requests finish
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Halt the listener immediately
    ///
    /// Dispatch this from a task that is not serving a request on the same
    /// server.
    pub fn stop_now(&self) {
        self.shutdown.cancel();
        if let Some(ref task) = self.task {
            task.abort();
        }
    }
}

impl Server {
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn new(
        router: Router,
        bind_address: SocketAddr,
        public_uri: Url,
        composition: Composition,
        log_guard: LogGuard,
    ) -> Self {
        Self {
            router,
            bind_address,
            local_address: None,
            public_uri,
            composition,
            shutdown: CancellationToken::new(),
            task: None,
            _log_guard: log_guard,
        }
    }

    pub const fn composition(&self) -> &Composition {
        &self.composition
    }

    /// Address the listener binds to
    pub const fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Bound address, once started
    pub const fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    /// Externally reachable URI; carries the bound port once started
    pub const fn public_uri(&self) -> &Url {
        &self.public_uri
    }

    /// Begin accepting connections
    ///
    /// # Errors
    ///
    /// Returns an error if the server is already running or the listener
    /// cannot be bound
    pub async fn start(&mut self) -> anyhow::Result<SocketAddr> {
        if self.task.is_some() {
            anyhow::bail!("server already started");
        }

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind {}: {e}", self.bind_address))?;
        let local_addr = listener.local_addr()?;
        self.local_address = Some(local_addr);
        let _ = self.public_uri.set_port(Some(local_addr.port()));

        tracing::info!(%local_addr, uri = %self.public_uri, "server listening");

        let service = self
            .router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>();
        let shutdown = self.shutdown.clone();
        self.task = Some(tokio::spawn(async move {
            axum::serve(listener, service)
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    tracing::info!("graceful shutdown initiated");
                })
                .await
        }));

        if self.composition.stop_at_shutdown {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    () = shutdown::shutdown_signal() => shutdown.cancel(),
                    () = shutdown.cancelled() => {}
                }
            });
        }

        Ok(local_addr)
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
            task: self.task.as_ref().map(JoinHandle::abort_handle),
        }
    }

    /// Halt the listener immediately
    pub fn stop_now(&self) {
        self.handle().stop_now();
    }

    /// Wait until the server stops
    ///
    /// # Errors
    ///
    /// Returns an error if serving failed
    pub async fn wait(&mut self) -> anyhow::Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        match task.await {
            Ok(result) => result.map_err(|e| anyhow::anyhow!("server failed: {e}")),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(anyhow::anyhow!("server task failed: {e}")),
        }
    }

    /// Start and run until shutdown
    ///
    /// # Errors
    ///
    /// Returns an error if binding or serving fails
    pub async fn serve(mut self) -> anyhow::Result<()> {
        self.start().await?;
        self.wait().await?;
        tracing::info!("server stopped");
        Ok(())
    }

    /// The fully layered router, without a listener
    pub fn into_router(mut self) -> Router {
        std::mem::take(&mut self.router)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

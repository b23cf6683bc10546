//! Access logging
//!
//! One line per request, written after the response is produced. Paths
//! matching an ignore pattern are skipped; patterns are globs matched
//! against the request path without its leading `/`.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use axum::body::HttpBody;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::header::{CONTENT_LENGTH, REFERER, USER_AGENT};
use http::{Method, StatusCode, Version};
use jiff::Zoned;

/// Static asset paths the default log leaves out
pub const DEFAULT_IGNORE_PATHS: &[&str] = &[
    "images/**",
    "img/**",
    "**/*.css",
    "**/*.jpg",
    "**/*.JPG",
    "**/*.gif",
    "**/*.GIF",
    "**/*.ico",
    "**/*.ICO",
    "**/*.js",
];

const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Everything known about a finished request
#[derive(Debug, Clone)]
pub struct RequestEntry {
    pub remote: Option<SocketAddr>,
    pub method: Method,
    /// Path and query as received
    pub target: String,
    pub version: Version,
    pub status: StatusCode,
    /// Body size when known up front
    pub bytes: Option<u64>,
    pub referer: Option<String>,
    pub user_agent: Option<String>,
    pub received: Zoned,
}

/// Sink for finished requests
pub trait RequestLog: Send + Sync + 'static {
    fn log(&self, entry: &RequestEntry);

    /// Glob patterns of paths that are not logged
    fn ignore_paths(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Extended NCSA access log written through `tracing`
#[derive(Debug, Clone)]
pub struct NcsaRequestLog {
    ignore: Vec<String>,
}

impl NcsaRequestLog {
    /// Access log with the static asset exclusions
    pub fn new() -> Self {
        Self::with_ignore_paths(DEFAULT_IGNORE_PATHS.iter().copied())
    }

    pub fn with_ignore_paths<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignore: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Render an entry as one Extended NCSA line
    pub fn format(entry: &RequestEntry) -> String {
        let host = entry
            .remote
            .map_or_else(|| "-".to_owned(), |addr| addr.ip().to_string());
        let bytes = entry.bytes.map_or_else(|| "-".to_owned(), |n| n.to_string());

        let mut line = String::with_capacity(128);
        let _ = write!(
            line,
            "{host} - - [{}] \"{} {} {:?}\" {} {bytes} \"{}\" \"{}\"",
            entry.received.strftime(TIMESTAMP_FORMAT),
            entry.method,
            entry.target,
            entry.version,
            entry.status.as_u16(),
            entry.referer.as_deref().unwrap_or("-"),
            entry.user_agent.as_deref().unwrap_or("-"),
        );
        line
    }
}

impl Default for NcsaRequestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLog for NcsaRequestLog {
    fn log(&self, entry: &RequestEntry) {
        tracing::info!(target: "keel::request", "{}", Self::format(entry));
    }

    fn ignore_paths(&self) -> Vec<String> {
        self.ignore.clone()
    }
}

/// Request log plus its frozen ignore patterns
#[derive(Clone)]
pub(crate) struct RequestLogState {
    log: Arc<dyn RequestLog>,
    ignore: Arc<[String]>,
}

impl RequestLogState {
    pub(crate) fn new(log: Arc<dyn RequestLog>) -> Self {
        let ignore = log.ignore_paths().into();
        Self { log, ignore }
    }

    pub(crate) fn ignore_paths(&self) -> Vec<String> {
        self.ignore.to_vec()
    }

    fn is_ignored(&self, path: &str) -> bool {
        let relative = path.trim_start_matches('/');
        self.ignore
            .iter()
            .any(|pattern| fast_glob::glob_match(pattern, relative))
    }
}

/// Request log middleware
///
/// A panicking sink is contained; the response is returned regardless.
pub(crate) async fn log_requests(State(state): State<RequestLogState>, request: Request, next: Next) -> Response {
    if state.is_ignored(request.uri().path()) {
        return next.run(request).await;
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let method = request.method().clone();
    let target = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_owned(), ToString::to_string);
    let version = request.version();
    let referer = header_text(request.headers(), &REFERER);
    let user_agent = header_text(request.headers(), &USER_AGENT);
    let received = Zoned::now();

    let response = next.run(request).await;

    let bytes = response.body().size_hint().exact().or_else(|| {
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    });

    let entry = RequestEntry {
        remote,
        method,
        target,
        version,
        status: response.status(),
        bytes,
        referer,
        user_agent,
        received,
    };

    if catch_unwind(AssertUnwindSafe(|| state.log.log(&entry))).is_err() {
        tracing::warn!("request log panicked, entry dropped");
    }

    response
}

fn header_text(headers: &http::HeaderMap, name: &http::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

use std::path::{Path, PathBuf};

use axum::Router;
use axum::handler::HandlerWithoutStateExt;
use tower_http::services::ServeDir;

use crate::failure::not_found;

/// Resolve a static directory against the home directory
///
/// Relative paths are joined onto `home`; existing directories are
/// canonicalized so the announced path is unambiguous.
pub(crate) fn resolve_dir(home: &Path, dir: &Path) -> PathBuf {
    let joined = if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        home.join(dir)
    };
    std::fs::canonicalize(&joined).unwrap_or(joined)
}

/// Mount `dir` at `path`
///
/// Directories are never listed. Missing files, and methods other than
/// GET and HEAD, fall through to the not-found failure.
pub(crate) fn mount(router: Router, dir: &Path, path: &str) -> Router {
    let files = ServeDir::new(dir)
        .call_fallback_on_method_not_allowed(true)
        .fallback(not_found.into_service());

    if path == "/" {
        router.fallback_service(files)
    } else {
        router.nest_service(path.trim_end_matches('/'), files)
    }
}

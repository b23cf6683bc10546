//! Failure interception
//!
//! Handlers, extractors, fallbacks and the panic guard all turn their
//! failures into a bare 500 response carrying a [`RaisedFailure`]
//! extension. [`classify_failures`] picks that up on the way out, runs the
//! registry and replaces the response with the classified envelope.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use axum::extract::{OriginalUri, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode};
use keel_core::{BoxError, Failure, Registry};

use crate::codec::Json;

/// Error returned from request handlers
///
/// Any `std::error::Error + Send + Sync + 'static` converts into it, so `?`
/// works on [`Failure`], I/O errors, parse errors and so on.
pub struct HandlerError(BoxError);

/// Result alias for request handlers
pub type HandlerResult<T> = Result<T, HandlerError>;

impl HandlerError {
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(error.into())
    }

    pub fn into_inner(self) -> BoxError {
        self.0
    }
}

impl<E> From<E> for HandlerError
where
    E: Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self(Box::new(error))
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response
            .extensions_mut()
            .insert(RaisedFailure(Arc::from(self.0)));
        response
    }
}

/// Failure travelling from a handler to the classification layer
#[derive(Clone)]
pub struct RaisedFailure(pub Arc<dyn Error + Send + Sync + 'static>);

impl fmt::Debug for RaisedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RaisedFailure").field(&self.0.to_string()).finish()
    }
}

/// A handler panicked; carries the panic payload when it was a string
#[derive(Debug, thiserror::Error)]
#[error("request handler panicked: {0}")]
pub struct PanicError(String);

/// Classification layer
///
/// Responses without a [`RaisedFailure`] pass through untouched.
pub async fn classify_failures(State(registry): State<Arc<Registry>>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let Some(RaisedFailure(error)) = response.extensions_mut().remove::<RaisedFailure>() else {
        return response;
    };

    let error: &(dyn Error + 'static) = &*error;
    let classification = registry.classify(error);
    classification.emit(error);

    let status = classification.message.status();
    (status, Json(classification.message)).into_response()
}

/// Response for a panic caught by `CatchPanicLayer`
pub(crate) fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_owned());

    HandlerError::from(PanicError(detail)).into_response()
}

/// Fallback for paths no route matches
pub(crate) async fn not_found(OriginalUri(uri): OriginalUri) -> HandlerError {
    Failure::not_found(format!("no resource found at {}", uri.path())).into()
}

/// Fallback for a matched path whose route does not handle the method
pub(crate) async fn not_allowed(method: Method) -> HandlerError {
    Failure::not_allowed(format!("{method} not supported")).into()
}

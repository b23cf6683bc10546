//! JSON codec and the `Json` extractor/response
//!
//! Handlers produce and consume typed values; the bytes on the wire are
//! owned by whichever [`JsonCodec`] the server was built with. A `Json`
//! response only records its value as a `serde_json::Value`, and the
//! [`encode_json`] layer renders it with the installed codec.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use keel_core::{Failure, Message};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::failure::HandlerError;

const APPLICATION_JSON: &str = "application/json";

/// Encoding and decoding of request and response bodies
pub trait JsonCodec: Send + Sync + 'static {
    /// Render a response value
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be written
    fn encode(&self, value: &Value) -> serde_json::Result<Vec<u8>>;

    /// Parse a request body
    ///
    /// # Errors
    ///
    /// Returns the parser error for structurally invalid input
    fn decode(&self, bytes: &[u8]) -> serde_json::Result<Value>;
}

/// Codec shared by every request of a server
pub type SharedCodec = Arc<dyn JsonCodec>;

/// Codec used when none is supplied
///
/// Omits `null` object members on output. Unknown input fields are left
/// in place and ignored by the typed target.
#[derive(Debug, Clone, Copy)]
pub struct DefaultCodec {
    omit_nulls: bool,
    pretty: bool,
}

impl DefaultCodec {
    pub const fn new() -> Self {
        Self {
            omit_nulls: true,
            pretty: false,
        }
    }

    #[must_use]
    pub const fn omit_nulls(mut self, omit_nulls: bool) -> Self {
        self.omit_nulls = omit_nulls;
        self
    }

    #[must_use]
    pub const fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// The default codec, shared
pub fn default_codec() -> SharedCodec {
    Arc::new(DefaultCodec::new())
}

impl Default for DefaultCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonCodec for DefaultCodec {
    fn encode(&self, value: &Value) -> serde_json::Result<Vec<u8>> {
        let stripped;
        let value = if self.omit_nulls {
            let mut copy = value.clone();
            strip_nulls(&mut copy);
            stripped = copy;
            &stripped
        } else {
            value
        };

        if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
    }

    fn decode(&self, bytes: &[u8]) -> serde_json::Result<Value> {
        serde_json::from_slice(bytes)
    }
}

/// Drop `null` members from every object; array elements are kept
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, member| !member.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// JSON request extractor and response
///
/// As an extractor, a body that is not valid JSON or does not fit `T` is
/// rejected as a malformed body (400). A body that cannot be read keeps the
/// status axum assigns it, such as 413 past the body limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

/// Value awaiting encoding by [`encode_json`]
#[derive(Debug, Clone)]
pub(crate) struct JsonPayload(Arc<Value>);

/// A response value could not be turned into JSON
#[derive(Debug, thiserror::Error)]
#[error("failed to encode response body")]
pub struct EncodeError(#[source] serde_json::Error);

impl<T> IntoResponse for Json<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(value) => {
                let mut response = Response::new(Body::empty());
                response.extensions_mut().insert(JsonPayload(Arc::new(value)));
                response
            }
            Err(e) => HandlerError::from(EncodeError(e)).into_response(),
        }
    }
}

impl<T, S> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = HandlerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let codec = request
            .extensions()
            .get::<SharedCodec>()
            .cloned()
            .unwrap_or_else(default_codec);

        let bytes = Bytes::from_request(request, state)
            .await
            .map_err(|rejection| Failure::status(rejection.status(), rejection.body_text()))?;

        let value = codec.decode(&bytes)?;
        Ok(Self(serde_json::from_value(value)?))
    }
}

/// Codec layer
///
/// Makes the codec available to extractors and renders pending
/// [`Json`] values. An encoding failure yields the fixed internal-error body.
pub async fn encode_json(State(codec): State<SharedCodec>, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(Arc::clone(&codec));

    let mut response = next.run(request).await;
    let Some(JsonPayload(value)) = response.extensions_mut().remove::<JsonPayload>() else {
        return response;
    };

    match codec.encode(&value) {
        Ok(bytes) => {
            let (mut parts, _) = response.into_parts();
            parts
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
            parts.headers.remove(CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(error) => {
            tracing::error!(%error, "failed to encode response body");
            fallback_response()
        }
    }
}

/// Fixed internal-error envelope, independent of any codec
fn fallback_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON))],
        Message::FALLBACK_BODY,
    )
        .into_response()
}

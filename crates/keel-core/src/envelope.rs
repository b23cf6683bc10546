use std::error::Error;

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::failure::Failure;

/// Uniform JSON body returned by every endpoint
///
/// `message` and `reasonPhrase` are omitted from the wire form when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_phrase: Option<String>,
}

impl Message {
    /// Encoded form of [`Message::internal_error`], used when nothing else can be produced
    pub const FALLBACK_BODY: &'static [u8] = br#"{"success":false,"message":"Internal Server Error","statusCode":500,"reasonPhrase":"Internal Server Error"}"#;

    /// Successful envelope without a message
    pub const fn success() -> Self {
        Self {
            success: true,
            message: None,
            status_code: 200,
            reason_phrase: None,
        }
    }

    /// Successful envelope carrying a short note or payload string
    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success()
        }
    }

    /// Failed envelope for the given status
    pub fn failure(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            status_code: status.as_u16(),
            reason_phrase: status.canonical_reason().map(str::to_owned),
        }
    }

    /// Failed envelope using the error's own message, without walking its causes
    ///
    /// A [`Failure`] contributes its raw message; anything else its `Display`.
    pub fn from_error(error: &(dyn Error + 'static), status: StatusCode) -> Self {
        let message = error
            .downcast_ref::<Failure>()
            .and_then(Failure::message)
            .map_or_else(|| error.to_string(), str::to_owned);
        Self::failure(message, status)
    }

    /// Generic 500 envelope
    pub fn internal_error() -> Self {
        Self::failure("Internal Server Error", StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Transport status matching `statusCode`
    ///
    /// Codes that are not valid HTTP statuses fall back to 500.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

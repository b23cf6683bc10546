use std::error::Error;
use std::fmt;

use http::StatusCode;

/// Type-erased error that can cross task boundaries
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Category an application-raised [`Failure`] belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailureKind {
    /// The request was understood but rejected by application code
    BadRequest,
    /// Input validation failed; `violations` holds per-field messages when known
    Validation { violations: Vec<String> },
    /// Credentials were missing or rejected
    NotAuthorized { challenges: Vec<String> },
    /// The matched resource does not implement the request method
    NotAllowed,
    /// Nothing exists at the requested location
    NotFound,
    /// Any other failure carrying an explicit HTTP status
    Status(StatusCode),
}

/// Failure raised by application code while handling a request
///
/// Carries a category, an optional message, and an optional underlying
/// cause exposed through [`Error::source`].
#[derive(Debug)]
pub struct Failure {
    kind: FailureKind,
    message: Option<String>,
    source: Option<BoxError>,
}

impl Failure {
    fn new(kind: FailureKind, message: Option<String>) -> Self {
        Self {
            kind,
            message,
            source: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BadRequest, Some(message.into()))
    }

    /// Validation failure listing the individual violations
    pub fn validation<I, S>(violations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let violations = violations.into_iter().map(Into::into).collect();
        Self::new(FailureKind::Validation { violations }, None)
    }

    /// Validation failure without structured violations
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(
            FailureKind::Validation {
                violations: Vec::new(),
            },
            Some(message.into()),
        )
    }

    pub fn not_authorized<I, S>(message: impl Into<String>, challenges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let challenges = challenges.into_iter().map(Into::into).collect();
        Self::new(FailureKind::NotAuthorized { challenges }, Some(message.into()))
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotAllowed, Some(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, Some(message.into()))
    }

    /// Failure with an explicit status code
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::new(FailureKind::Status(status), Some(message.into()))
    }

    /// Attach the underlying cause
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub const fn kind(&self) -> &FailureKind {
        &self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Status this failure asks for
    pub fn status_code(&self) -> StatusCode {
        match &self.kind {
            FailureKind::BadRequest => StatusCode::BAD_REQUEST,
            FailureKind::Validation { violations } if !violations.is_empty() => StatusCode::BAD_REQUEST,
            FailureKind::Validation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            FailureKind::NotAuthorized { .. } => StatusCode::UNAUTHORIZED,
            FailureKind::NotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::Status(status) => *status,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(message) = &self.message {
            return f.write_str(message);
        }
        let status = self.status_code();
        write!(f, "HTTP {} {}", status.as_u16(), status.canonical_reason().unwrap_or("Unknown"))
    }
}

impl Error for Failure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_deref().map(|source| source as &(dyn Error + 'static))
    }
}

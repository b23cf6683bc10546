use std::error::Error;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use http::StatusCode;

use crate::envelope::Message;
use crate::failure::{Failure, FailureKind};
use crate::unwrap::{deepest_cause, render_chain};

type Matcher = Box<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;
type Handler = Box<dyn Fn(&(dyn Error + 'static)) -> Outcome + Send + Sync>;

const NOT_ALLOWED_PREFIX: &str = "The method you used on this resource or path is not implemented: ";

/// What gets logged for a classified failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogAction {
    /// Expected, client-caused condition; nothing is logged
    Silent,
    /// One error line, no cause chain
    Summary(String),
    /// Error line with the full cause chain
    Detailed(String),
}

/// Result of a single rule: status, client message, log action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub status: StatusCode,
    pub message: String,
    pub log: LogAction,
}

impl Outcome {
    pub fn new(status: StatusCode, message: impl Into<String>, log: LogAction) -> Self {
        Self {
            status,
            message: message.into(),
            log,
        }
    }
}

/// Envelope and log action chosen for a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Name of the rule that matched
    pub rule: &'static str,
    pub message: Message,
    pub log: LogAction,
}

impl Classification {
    fn internal(rule: &'static str, log: LogAction) -> Self {
        Self {
            rule,
            message: Message::internal_error(),
            log,
        }
    }

    /// Execute the log action for `error`
    ///
    /// Panics raised by the subscriber are swallowed.
    pub fn emit(&self, error: &(dyn Error + 'static)) {
        let status = self.message.status_code;
        let rule = self.rule;
        let _ = catch_unwind(AssertUnwindSafe(|| match &self.log {
            LogAction::Silent => {}
            LogAction::Summary(line) => tracing::error!(rule, status, "{line}"),
            LogAction::Detailed(line) => {
                tracing::error!(rule, status, chain = %render_chain(error), "{line}");
            }
        }));
    }
}

/// A named (matcher, handler) pair
pub struct Rule {
    name: &'static str,
    matcher: Matcher,
    handler: Handler,
}

impl Rule {
    pub fn new<M, H>(name: &'static str, matcher: M, handler: H) -> Self
    where
        M: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
        H: Fn(&(dyn Error + 'static)) -> Outcome + Send + Sync + 'static,
    {
        Self {
            name,
            matcher: Box::new(matcher),
            handler: Box::new(handler),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Ordered failure rules, most specific first, ending in a catch-all
///
/// Rules are evaluated top-down and the first match wins. Rules added with
/// [`Registry::with_rule`] always sit before the catch-all.
#[derive(Debug)]
pub struct Registry {
    rules: Vec<Rule>,
    fallback: Rule,
}

impl Registry {
    /// The standard rule set
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Rule::new("malformed_body", is_malformed_body, malformed_body),
                Rule::new("bad_request", |e| kind_of(e) == Some(&FailureKind::BadRequest), bad_request),
                Rule::new(
                    "validation",
                    |e| matches!(kind_of(e), Some(FailureKind::Validation { .. })),
                    validation,
                ),
                Rule::new(
                    "not_authorized",
                    |e| matches!(kind_of(e), Some(FailureKind::NotAuthorized { .. })),
                    not_authorized,
                ),
                Rule::new("not_allowed", |e| kind_of(e) == Some(&FailureKind::NotAllowed), not_allowed),
                Rule::new("not_found", |e| kind_of(e) == Some(&FailureKind::NotFound), not_found),
                Rule::new(
                    "web_application",
                    |e| matches!(kind_of(e), Some(FailureKind::Status(_))),
                    web_application,
                ),
            ],
            fallback: unclassified_rule(),
        }
    }

    /// Only the catch-all; every failure becomes a 500
    pub fn fallback_only() -> Self {
        Self {
            rules: Vec::new(),
            fallback: unclassified_rule(),
        }
    }

    /// Append a rule after the existing ones and before the catch-all
    #[must_use]
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rule names in evaluation order, catch-all last
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(Rule::name)
            .collect()
    }

    /// Classify a raised error
    ///
    /// Never panics: if a rule panics, the generic internal-error envelope is
    /// returned instead.
    pub fn classify(&self, error: &(dyn Error + 'static)) -> Classification {
        catch_unwind(AssertUnwindSafe(|| self.apply(error))).unwrap_or_else(|_| {
            Classification::internal("internal", LogAction::Summary("failure classification panicked".to_owned()))
        })
    }

    fn apply(&self, error: &(dyn Error + 'static)) -> Classification {
        let rule = self
            .rules
            .iter()
            .find(|rule| (rule.matcher)(error))
            .unwrap_or(&self.fallback);

        let outcome = (rule.handler)(error);
        Classification {
            rule: rule.name,
            message: Message::failure(outcome.message, outcome.status),
            log: outcome.log,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Parser message of a JSON error without the trailing position
pub fn original_message(error: &serde_json::Error) -> String {
    let full = error.to_string();
    if error.line() == 0 {
        return full;
    }
    let suffix = format!(" at line {} column {}", error.line(), error.column());
    full.strip_suffix(&suffix).map_or_else(|| full.clone(), str::to_owned)
}

fn kind_of<'a>(error: &'a (dyn Error + 'static)) -> Option<&'a FailureKind> {
    error.downcast_ref::<Failure>().map(Failure::kind)
}

fn unwrapped_message(error: &(dyn Error + 'static)) -> String {
    deepest_cause(error).to_string()
}

fn is_malformed_body(error: &(dyn Error + 'static)) -> bool {
    error.downcast_ref::<serde_json::Error>().is_some_and(|e| !e.is_io())
}

fn malformed_body(error: &(dyn Error + 'static)) -> Outcome {
    let message = error
        .downcast_ref::<serde_json::Error>()
        .map_or_else(|| error.to_string(), original_message);
    Outcome::new(StatusCode::BAD_REQUEST, message, LogAction::Silent)
}

fn bad_request(error: &(dyn Error + 'static)) -> Outcome {
    Outcome::new(
        StatusCode::BAD_REQUEST,
        unwrapped_message(error),
        LogAction::Summary(error.to_string()),
    )
}

fn validation(error: &(dyn Error + 'static)) -> Outcome {
    match kind_of(error) {
        Some(FailureKind::Validation { violations }) if !violations.is_empty() => {
            let joined = violations.join(", ");
            Outcome::new(StatusCode::BAD_REQUEST, joined.clone(), LogAction::Summary(joined))
        }
        _ => Outcome::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            unwrapped_message(error),
            LogAction::Detailed(error.to_string()),
        ),
    }
}

fn not_authorized(error: &(dyn Error + 'static)) -> Outcome {
    let challenges = match kind_of(error) {
        Some(FailureKind::NotAuthorized { challenges }) => challenges.join(", "),
        _ => String::new(),
    };
    let log = LogAction::Summary(format!("{error} {challenges}"));
    Outcome::new(StatusCode::UNAUTHORIZED, challenges, log)
}

fn not_allowed(error: &(dyn Error + 'static)) -> Outcome {
    Outcome::new(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("{NOT_ALLOWED_PREFIX}{error}"),
        LogAction::Silent,
    )
}

fn not_found(error: &(dyn Error + 'static)) -> Outcome {
    let envelope = Message::from_error(error, StatusCode::NOT_FOUND);
    Outcome::new(
        StatusCode::NOT_FOUND,
        envelope.message.unwrap_or_default(),
        LogAction::Silent,
    )
}

fn web_application(error: &(dyn Error + 'static)) -> Outcome {
    let status = match kind_of(error) {
        Some(FailureKind::Status(status)) if status.is_client_error() || status.is_server_error() => *status,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let log = if status == StatusCode::NOT_FOUND {
        LogAction::Silent
    } else {
        LogAction::Detailed(error.to_string())
    };
    Outcome::new(status, unwrapped_message(error), log)
}

fn unclassified_rule() -> Rule {
    Rule::new(
        "unclassified",
        |_| true,
        |error| {
            Outcome::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                unwrapped_message(error),
                LogAction::Detailed(error.to_string()),
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing::{Event, Subscriber};
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    use super::*;

    fn classify(error: &(dyn Error + 'static)) -> Classification {
        Registry::standard().classify(error)
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Everything logged while `f` runs
    fn captured_logs(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    struct PanickingLayer;

    impl<S: Subscriber> Layer<S> for PanickingLayer {
        fn on_event(&self, _: &Event<'_>, _: Context<'_, S>) {
            panic!("log sink unavailable");
        }
    }

    #[derive(Debug)]
    struct Exploding;

    impl fmt::Display for Exploding {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("display exploded")
        }
    }

    impl Error for Exploding {}

    #[test]
    fn standard_order() {
        assert_eq!(
            Registry::standard().rule_names(),
            [
                "malformed_body",
                "bad_request",
                "validation",
                "not_authorized",
                "not_allowed",
                "not_found",
                "web_application",
                "unclassified",
            ]
        );
    }

    #[test]
    fn custom_rules_precede_catch_all() {
        let registry = Registry::standard().with_rule(Rule::new(
            "io",
            |e| e.is::<io::Error>(),
            |_| Outcome::new(StatusCode::SERVICE_UNAVAILABLE, "storage offline", LogAction::Silent),
        ));

        let names = registry.rule_names();
        assert_eq!(names[names.len() - 2], "io");
        assert_eq!(names[names.len() - 1], "unclassified");

        let classified = registry.classify(&io::Error::other("disk"));
        assert_eq!(classified.rule, "io");
        assert_eq!(classified.message.status_code, 503);
    }

    #[test]
    fn malformed_body_strips_position() {
        let error = serde_json::from_str::<serde_json::Value>("{\"name\":").unwrap_err();
        let classified = classify(&error);

        assert_eq!(classified.rule, "malformed_body");
        assert_eq!(classified.message.status_code, 400);
        assert_eq!(classified.message.message.as_deref(), Some("EOF while parsing a value"));
        assert_eq!(classified.log, LogAction::Silent);
    }

    #[test]
    fn malformed_body_type_mismatch() {
        let error = serde_json::from_value::<u32>(serde_json::json!("many")).unwrap_err();
        let classified = classify(&error);

        assert_eq!(classified.message.status_code, 400);
        assert_eq!(
            classified.message.message.as_deref(),
            Some("invalid type: string \"many\", expected u32")
        );
    }

    #[test]
    fn bad_request_unwraps_cause_and_logs_summary() {
        let error = Failure::bad_request("could not read order").with_source(io::Error::other("quantity overflow"));
        let classified = classify(&error);

        assert_eq!(classified.message.status_code, 400);
        assert_eq!(classified.message.message.as_deref(), Some("quantity overflow"));
        assert_eq!(classified.log, LogAction::Summary("could not read order".to_owned()));
    }

    #[test]
    fn validation_joins_violations() {
        let error = Failure::validation(["a must not be blank", "b must be positive"]);
        let classified = classify(&error);

        assert_eq!(classified.message.status_code, 400);
        assert_eq!(
            classified.message.message.as_deref(),
            Some("a must not be blank, b must be positive")
        );
        assert_eq!(
            classified.log,
            LogAction::Summary("a must not be blank, b must be positive".to_owned())
        );
    }

    #[test]
    fn unstructured_validation_unwraps() {
        let error = Failure::invalid("validator misconfigured").with_source(io::Error::other("missing constraint"));
        let classified = classify(&error);

        assert_eq!(classified.rule, "validation");
        assert_eq!(classified.message.status_code, 500);
        assert_eq!(classified.message.message.as_deref(), Some("missing constraint"));
        assert!(matches!(classified.log, LogAction::Detailed(_)));
    }

    #[test]
    fn not_authorized_joins_challenges() {
        let error = Failure::not_authorized("login required", ["Basic", "Bearer"]);
        let classified = classify(&error);

        assert_eq!(classified.message.status_code, 401);
        assert_eq!(classified.message.message.as_deref(), Some("Basic, Bearer"));
        assert_eq!(classified.log, LogAction::Summary("login required Basic, Bearer".to_owned()));
    }

    #[test]
    fn not_allowed_uses_template() {
        let classified = classify(&Failure::not_allowed("GET not supported"));

        assert_eq!(classified.message.status_code, 405);
        assert_eq!(
            classified.message.message.as_deref(),
            Some("The method you used on this resource or path is not implemented: GET not supported")
        );
        assert_eq!(classified.log, LogAction::Silent);
    }

    #[test]
    fn not_found_keeps_outer_message() {
        let error = Failure::not_found("order 7 does not exist").with_source(io::Error::other("row missing"));
        let classified = classify(&error);

        assert_eq!(classified.message.status_code, 404);
        assert_eq!(classified.message.message.as_deref(), Some("order 7 does not exist"));
        assert_eq!(classified.log, LogAction::Silent);
    }

    #[test]
    fn web_application_404_is_not_logged() {
        let classified = classify(&Failure::status(StatusCode::NOT_FOUND, "gone"));

        assert_eq!(classified.rule, "web_application");
        assert_eq!(classified.message.status_code, 404);
        assert_eq!(classified.log, LogAction::Silent);
    }

    #[test]
    fn web_application_503_is_logged_in_full() {
        let error = Failure::status(StatusCode::SERVICE_UNAVAILABLE, "maintenance")
            .with_source(io::Error::other("database offline"));
        let classified = classify(&error);

        assert_eq!(classified.message.status_code, 503);
        assert_eq!(classified.message.reason_phrase.as_deref(), Some("Service Unavailable"));
        assert_eq!(classified.message.message.as_deref(), Some("database offline"));
        assert_eq!(classified.log, LogAction::Detailed("maintenance".to_owned()));
    }

    #[test]
    fn web_application_404_writes_nothing() {
        let error = Failure::status(StatusCode::NOT_FOUND, "gone");
        let classified = classify(&error);

        let logs = captured_logs(|| classified.emit(&error));
        assert_eq!(logs, "");
    }

    #[test]
    fn web_application_503_writes_cause_chain() {
        let error = Failure::status(StatusCode::SERVICE_UNAVAILABLE, "maintenance")
            .with_source(io::Error::other("database offline"));
        let classified = classify(&error);

        let logs = captured_logs(|| classified.emit(&error));
        assert_eq!(logs.lines().count(), 1);
        assert!(logs.contains("ERROR"));
        assert!(logs.contains("status=503"));
        assert!(logs.contains("chain=maintenance: caused by: database offline"));
    }

    #[test]
    fn summary_has_no_cause_chain() {
        let error = Failure::bad_request("bad order").with_source(io::Error::other("qty overflow"));
        let classified = classify(&error);

        let logs = captured_logs(|| classified.emit(&error));
        assert!(logs.contains("bad order"));
        assert!(!logs.contains("chain="));
    }

    #[test]
    fn panicking_log_sink_is_swallowed() {
        let error = io::Error::other("disk on fire");
        let classified = classify(&error);
        let subscriber = tracing_subscriber::registry().with(PanickingLayer);

        tracing::subscriber::with_default(subscriber, || classified.emit(&error));
    }

    #[test]
    fn web_application_non_error_status_becomes_500() {
        let classified = classify(&Failure::status(StatusCode::OK, "not really a failure"));
        assert_eq!(classified.message.status_code, 500);
    }

    #[test]
    fn anything_else_is_500() {
        let error = io::Error::other("disk on fire");
        let classified = classify(&error);

        assert_eq!(classified.rule, "unclassified");
        assert_eq!(classified.message.status_code, 500);
        assert_eq!(classified.message.message.as_deref(), Some("disk on fire"));
        assert_eq!(classified.log, LogAction::Detailed("disk on fire".to_owned()));
    }

    #[test]
    fn fallback_only_turns_everything_into_500() {
        let classified = Registry::fallback_only().classify(&Failure::not_found("missing"));

        assert_eq!(classified.rule, "unclassified");
        assert_eq!(classified.message.status_code, 500);
    }

    #[test]
    fn panicking_message_degrades_to_internal_error() {
        let classified = classify(&Exploding);

        assert_eq!(classified.rule, "internal");
        assert_eq!(classified.message, Message::internal_error());
    }

    #[test]
    fn original_message_without_position_is_unchanged() {
        let error = serde_json::from_value::<bool>(serde_json::json!(1)).unwrap_err();
        assert_eq!(original_message(&error), error.to_string());
    }
}

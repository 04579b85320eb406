//! Rule results: what a matching rule does to the request.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Synthetic server-error kinds a rule can inject.
///
/// The delay kinds (`ResponseDelay`, `ConnectionDelay`) alter request timing
/// instead of producing an error response; the rest materialize as an
/// [`InjectedServerError`] with the listed status / sub-status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerErrorType {
    /// 410/21005 - replica gone, triggers address refresh
    Gone,
    /// 429/3200 - request-rate-too-large throttling
    TooManyRequests,
    /// 408 - server-side request timeout
    Timeout,
    /// 500 - internal server error
    InternalServerError,
    /// 449 - transient write conflict, retry with backoff
    RetryWith,
    /// 503 - service unavailable
    ServiceUnavailable,
    /// 404/1002 - read session not available on this replica
    ReadSessionNotAvailable,
    /// 410/1007 - partition undergoing a split
    PartitionIsSplitting,
    /// 410/1008 - partition being migrated
    PartitionIsMigrating,
    /// Delay the response instead of erroring
    ResponseDelay,
    /// Delay connection establishment instead of erroring
    ConnectionDelay,
}

impl ServerErrorType {
    /// Whether this kind alters timing rather than producing an error
    #[must_use]
    pub fn is_delay(self) -> bool {
        matches!(self, Self::ResponseDelay | Self::ConnectionDelay)
    }

    /// Whether this kind applies per physical server rather than per replica.
    ///
    /// Delays and `Gone` act on the server connection, so one entry per
    /// host:port is enough; everything else is scoped to individual replicas.
    #[must_use]
    pub fn applies_per_server(self) -> bool {
        matches!(self, Self::ResponseDelay | Self::ConnectionDelay | Self::Gone)
    }

    /// The (status, sub-status) pair an injected error of this kind carries
    #[must_use]
    pub fn status_codes(self) -> (u16, u16) {
        match self {
            Self::Gone => (410, 21005),
            Self::TooManyRequests => (429, 3200),
            Self::Timeout => (408, 0),
            Self::InternalServerError => (500, 0),
            Self::RetryWith => (449, 0),
            Self::ServiceUnavailable => (503, 21008),
            Self::ReadSessionNotAvailable => (404, 1002),
            Self::PartitionIsSplitting => (410, 1007),
            Self::PartitionIsMigrating => (410, 1008),
            Self::ResponseDelay | Self::ConnectionDelay => (0, 0),
        }
    }
}

/// Connection-fault kinds for connection-error rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorType {
    /// Close established connections gracefully
    ConnectionClose,
    /// Reset connections (RST)
    ConnectionReset,
}

/// Server-error result: delay or synthetic error applied per matching request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorResult {
    /// What to inject
    pub error_type: ServerErrorType,
    /// Delay duration; required for the delay kinds, ignored otherwise
    #[serde(default, with = "humantime_serde::option")]
    pub delay: Option<Duration>,
    /// For `ResponseDelay`: delay before the request is sent (the server
    /// never sees it) instead of delaying the response after the send
    #[serde(default)]
    pub suppress_service_request: bool,
}

impl ServerErrorResult {
    /// A plain synthetic-error result
    #[must_use]
    pub fn error(error_type: ServerErrorType) -> Self {
        Self {
            error_type,
            delay: None,
            suppress_service_request: false,
        }
    }

    /// A response-delay result applied on the response path
    #[must_use]
    pub fn response_delay(delay: Duration) -> Self {
        Self {
            error_type: ServerErrorType::ResponseDelay,
            delay: Some(delay),
            suppress_service_request: false,
        }
    }

    /// A connection-establishment delay result
    #[must_use]
    pub fn connection_delay(delay: Duration) -> Self {
        Self {
            error_type: ServerErrorType::ConnectionDelay,
            delay: Some(delay),
            suppress_service_request: false,
        }
    }
}

/// Connection-error result: the background task periodically instructs
/// target endpoints to fail connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionErrorResult {
    /// How connections are failed
    pub error_type: ConnectionErrorType,
    /// How often the fault is re-applied to the target endpoints
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Fraction (0.0, 1.0] of an endpoint's connections to fail per interval
    pub threshold: f64,
}

/// Result half of a rule: server error (per-request) or connection error
/// (per-endpoint, driven by the background task)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultInjectionResult {
    /// Per-request delay or synthetic server error
    ServerError(ServerErrorResult),
    /// Endpoint-level connection fault
    ConnectionError(ConnectionErrorResult),
}

impl FaultInjectionResult {
    /// The server-error payload, when this is a server-error result
    #[must_use]
    pub fn as_server_error(&self) -> Option<&ServerErrorResult> {
        match self {
            Self::ServerError(r) => Some(r),
            Self::ConnectionError(_) => None,
        }
    }
}

/// The synthetic error handed to the transport when a server-error rule
/// matches. The transport surfaces it as if the backend had responded with
/// the embedded status codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("injected {error_type:?} ({status_code}/{sub_status_code}) by rule '{rule_id}'")]
pub struct InjectedServerError {
    /// Rule that produced the error
    pub rule_id: String,
    /// Error kind
    pub error_type: ServerErrorType,
    /// HTTP-equivalent status code
    pub status_code: u16,
    /// Backend sub-status code
    pub sub_status_code: u16,
}

impl InjectedServerError {
    /// Build the injected error for `error_type` attributed to `rule_id`
    #[must_use]
    pub fn new(rule_id: impl Into<String>, error_type: ServerErrorType) -> Self {
        let (status_code, sub_status_code) = error_type.status_codes();
        Self {
            rule_id: rule_id.into(),
            error_type,
            status_code,
            sub_status_code,
        }
    }
}

impl fmt::Display for ConnectionErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClose => write!(f, "connection_close"),
            Self::ConnectionReset => write!(f, "connection_reset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_kinds_are_delays() {
        assert!(ServerErrorType::ResponseDelay.is_delay());
        assert!(ServerErrorType::ConnectionDelay.is_delay());
        assert!(!ServerErrorType::Gone.is_delay());
    }

    #[test]
    fn per_server_kinds() {
        assert!(ServerErrorType::Gone.applies_per_server());
        assert!(ServerErrorType::ResponseDelay.applies_per_server());
        assert!(ServerErrorType::ConnectionDelay.applies_per_server());
        assert!(!ServerErrorType::TooManyRequests.applies_per_server());
        assert!(!ServerErrorType::ServiceUnavailable.applies_per_server());
    }

    #[test]
    fn injected_error_carries_status_codes() {
        let err = InjectedServerError::new("r1", ServerErrorType::TooManyRequests);
        assert_eq!(err.status_code, 429);
        assert_eq!(err.sub_status_code, 3200);
        assert_eq!(err.rule_id, "r1");
        let gone = InjectedServerError::new("r1", ServerErrorType::Gone);
        assert_eq!(gone.status_code, 410);
    }

    #[test]
    fn result_deserializes_from_tagged_yaml() {
        let yaml = r"
type: server_error
error_type: response_delay
delay: 2s
";
        let result: FaultInjectionResult = serde_yaml::from_str(yaml).unwrap();
        let server = result.as_server_error().unwrap();
        assert_eq!(server.error_type, ServerErrorType::ResponseDelay);
        assert_eq!(server.delay, Some(Duration::from_secs(2)));
        assert!(!server.suppress_service_request);
    }

    #[test]
    fn connection_error_result_deserializes() {
        let yaml = r"
type: connection_error
error_type: connection_reset
interval: 500ms
threshold: 0.5
";
        let result: FaultInjectionResult = serde_yaml::from_str(yaml).unwrap();
        match result {
            FaultInjectionResult::ConnectionError(c) => {
                assert_eq!(c.error_type, ConnectionErrorType::ConnectionReset);
                assert_eq!(c.interval, Duration::from_millis(500));
                assert!((c.threshold - 0.5).abs() < f64::EPSILON);
            }
            FaultInjectionResult::ServerError(_) => panic!("expected connection error"),
        }
    }
}

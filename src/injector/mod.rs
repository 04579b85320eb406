//! Transport injectors: the hot-path query surface.
//!
//! The transport layer consults an injector immediately before and after each
//! outgoing network call. Queries are synchronous, first-match-wins over an
//! ordered delegate chain, and side-effect-free when nothing matches - the
//! common case for production traffic must cost a handful of comparisons and
//! zero allocations.

mod direct;
mod gateway;

pub use direct::DirectInjector;
pub use gateway::GatewayInjector;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;
use url::Url;

use crate::context::RequestInjectionContext;
use crate::resolver::{EffectiveRule, ServerErrorRule};
use crate::rule::{InjectedServerError, OperationType, ServerErrorType};
use crate::topology::ReplicaAddress;

/// Where a transport request is headed
#[derive(Debug, Clone)]
pub enum RequestTarget {
    /// Direct mode: a physical replica address
    Replica(ReplicaAddress),
    /// Gateway mode: a service endpoint URI
    Endpoint(Url),
}

/// Identity of one transport-level request attempt, as seen by injectors
#[derive(Debug)]
pub struct TransportRequest {
    /// Unique id of this transport-level attempt
    pub transport_request_id: u64,
    /// Logical operation kind
    pub operation_type: OperationType,
    /// Resolved resource id of the target collection
    pub collection_rid: String,
    /// Destination of the attempt
    pub target: RequestTarget,
    /// The owning operation's injection context
    pub context: Arc<RequestInjectionContext>,
}

impl TransportRequest {
    /// Describe a direct-mode attempt against a replica address
    #[must_use]
    pub fn direct(
        transport_request_id: u64,
        operation_type: OperationType,
        collection_rid: impl Into<String>,
        address: ReplicaAddress,
        context: Arc<RequestInjectionContext>,
    ) -> Self {
        Self {
            transport_request_id,
            operation_type,
            collection_rid: collection_rid.into(),
            target: RequestTarget::Replica(address),
            context,
        }
    }

    /// Describe a gateway-mode attempt against a service endpoint
    #[must_use]
    pub fn gateway(
        transport_request_id: u64,
        operation_type: OperationType,
        collection_rid: impl Into<String>,
        endpoint: Url,
        context: Arc<RequestInjectionContext>,
    ) -> Self {
        Self {
            transport_request_id,
            operation_type,
            collection_rid: collection_rid.into(),
            target: RequestTarget::Endpoint(endpoint),
            context,
        }
    }
}

/// A fault-injection delegate consulted by the transport injectors.
///
/// Every query answers "should this request be altered, and how" for one
/// specific attempt; `None` means this delegate does not apply.
pub trait FaultInjector: Send + Sync {
    /// Delay to apply before the request is sent (the server never sees the
    /// request during the delay)
    fn response_delay_before_send(&self, request: &TransportRequest) -> Option<Duration>;

    /// Delay to apply to the response path after the request was sent
    fn response_delay_after_send(&self, request: &TransportRequest) -> Option<Duration>;

    /// Synthetic server error to surface instead of the real response
    fn response_error(&self, request: &TransportRequest) -> Option<InjectedServerError>;

    /// Delay to apply to connection establishment
    fn connection_delay(&self, request: &TransportRequest) -> Option<Duration>;
}

/// Which of the four query hooks a rule applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InjectionPoint {
    BeforeSend,
    AfterSend,
    ResponseError,
    ConnectionDelay,
}

impl ServerErrorRule {
    /// Whether the rule's result belongs to the given hook
    fn applies_at(&self, point: InjectionPoint) -> bool {
        match point {
            InjectionPoint::BeforeSend => {
                self.result.error_type == ServerErrorType::ResponseDelay
                    && self.result.suppress_service_request
            }
            InjectionPoint::AfterSend => {
                self.result.error_type == ServerErrorType::ResponseDelay
                    && !self.result.suppress_service_request
            }
            InjectionPoint::ResponseError => !self.result.error_type.is_delay(),
            InjectionPoint::ConnectionDelay => {
                self.result.error_type == ServerErrorType::ConnectionDelay
            }
        }
    }

    /// Whether the rule's resolved condition covers this request
    fn matches(&self, request: &TransportRequest) -> bool {
        if self.condition.collection_rid != request.collection_rid {
            return false;
        }
        if self
            .condition
            .operation_type
            .is_some_and(|op| op != request.operation_type)
        {
            return false;
        }
        match &request.target {
            RequestTarget::Replica(address) => self.condition.targets.contains_address(address),
            RequestTarget::Endpoint(endpoint) => self.condition.targets.contains_endpoint(endpoint),
        }
    }
}

/// The engine-managed rule set behind each transport injector.
///
/// Holds effective rules in registration order and answers the four queries
/// with a linear first-match scan - rule sets are test-scenario sized, so a
/// plain ordered list beats any index.
#[derive(Default)]
pub struct RuleSetInjector {
    rules: RwLock<Vec<Arc<EffectiveRule>>>,
}

impl RuleSetInjector {
    /// Create an empty rule set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an effective rule.
    ///
    /// Re-registering an id replaces the previous entry in place, keeping its
    /// position in the scan order.
    pub fn register(&self, rule: Arc<EffectiveRule>) {
        let mut rules = self.rules.write();
        if let Some(existing) = rules.iter_mut().find(|r| r.rule_id() == rule.rule_id()) {
            *existing = rule;
        } else {
            rules.push(rule);
        }
    }

    /// Remove a rule by id; returns `true` when a rule was removed
    pub fn unregister(&self, rule_id: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.rule_id() != rule_id);
        rules.len() != before
    }

    /// Whether a rule with this id is currently registered
    #[must_use]
    pub fn contains(&self, rule_id: &str) -> bool {
        self.rules.read().iter().any(|r| r.rule_id() == rule_id)
    }

    /// Number of registered rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    /// Whether no rules are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    /// First-match scan for one injection point. On a match the rule's hit
    /// counter is claimed and the operation context updated; with no match
    /// nothing is touched.
    fn evaluate(&self, request: &TransportRequest, point: InjectionPoint) -> Option<Arc<EffectiveRule>> {
        let rules = self.rules.read();
        for rule in rules.iter() {
            let EffectiveRule::ServerError(server) = rule.as_ref() else {
                continue;
            };
            if !server.applies_at(point) || !server.matches(request) {
                continue;
            }
            if !server.state.is_valid() || !server.state.try_record_hit() {
                continue;
            }
            request
                .context
                .apply_rule(request.transport_request_id, server.state.rule_id());
            debug!(
                rule_id = %server.state.rule_id(),
                transport_request_id = request.transport_request_id,
                point = ?point,
                hit = server.state.hit_count(),
                "Fault-injection rule fired"
            );
            return Some(Arc::clone(rule));
        }
        None
    }
}

impl FaultInjector for RuleSetInjector {
    fn response_delay_before_send(&self, request: &TransportRequest) -> Option<Duration> {
        self.evaluate(request, InjectionPoint::BeforeSend)
            .and_then(|rule| rule.as_server_error().and_then(|s| s.result.delay))
    }

    fn response_delay_after_send(&self, request: &TransportRequest) -> Option<Duration> {
        self.evaluate(request, InjectionPoint::AfterSend)
            .and_then(|rule| rule.as_server_error().and_then(|s| s.result.delay))
    }

    fn response_error(&self, request: &TransportRequest) -> Option<InjectedServerError> {
        self.evaluate(request, InjectionPoint::ResponseError)
            .and_then(|rule| {
                rule.as_server_error()
                    .map(|s| InjectedServerError::new(rule.rule_id(), s.result.error_type))
            })
    }

    fn connection_delay(&self, request: &TransportRequest) -> Option<Duration> {
        self.evaluate(request, InjectionPoint::ConnectionDelay)
            .and_then(|rule| rule.as_server_error().and_then(|s| s.result.delay))
    }
}

/// Ordered delegate chain shared by both transport injectors
pub(crate) struct DelegateChain {
    delegates: RwLock<Vec<Arc<dyn FaultInjector>>>,
}

impl DelegateChain {
    pub(crate) fn new(first: Arc<dyn FaultInjector>) -> Self {
        Self {
            delegates: RwLock::new(vec![first]),
        }
    }

    pub(crate) fn push(&self, delegate: Arc<dyn FaultInjector>) {
        self.delegates.write().push(delegate);
    }

    pub(crate) fn first_some<T>(
        &self,
        query: impl Fn(&dyn FaultInjector) -> Option<T>,
    ) -> Option<T> {
        let delegates = self.delegates.read();
        delegates.iter().find_map(|d| query(d.as_ref()))
    }
}

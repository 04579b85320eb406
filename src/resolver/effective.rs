//! Effective rules: the resolved, transport-ready form of a user rule.
//!
//! Built once at registration time and immutable afterwards, except for the
//! atomic hit counter and the enabled flag. All matching re-checks
//! [`RuleState::is_valid`] at injection time because validity is time- and
//! count-dependent.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use url::Url;

use crate::rule::{ConnectionErrorResult, OperationType, ServerErrorResult};
use crate::topology::{ReplicaAddress, ServerKey};

/// Shared scheduling / accounting state of a registered rule
#[derive(Debug)]
pub struct RuleState {
    rule_id: String,
    enabled: AtomicBool,
    /// Start of the active window (registration time + start delay)
    not_before: Instant,
    /// End of the active window (`None` = unbounded)
    not_after: Option<Instant>,
    hit_limit: Option<u64>,
    hit_count: AtomicU64,
}

impl RuleState {
    pub(crate) fn new(
        rule_id: String,
        enabled: bool,
        start_delay: Option<Duration>,
        duration: Option<Duration>,
        hit_limit: Option<u64>,
    ) -> Self {
        let not_before = Instant::now() + start_delay.unwrap_or_default();
        let not_after = duration.map(|d| not_before + d);
        Self {
            rule_id,
            enabled: AtomicBool::new(enabled),
            not_before,
            not_after,
            hit_limit,
            hit_count: AtomicU64::new(0),
        }
    }

    /// Id of the source rule
    #[must_use]
    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    /// Total activations so far
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.hit_count.load(Ordering::Relaxed)
    }

    /// Switch the rule off permanently
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Whether the active window has not opened yet (start delay pending)
    #[must_use]
    pub fn is_pending(&self) -> bool {
        Instant::now() < self.not_before
    }

    /// The single authoritative validity predicate: enabled, inside the
    /// active window, below the hit limit
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if !self.enabled.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now < self.not_before {
            return false;
        }
        if self.not_after.is_some_and(|end| now >= end) {
            return false;
        }
        self.hit_limit
            .is_none_or(|limit| self.hit_count.load(Ordering::Relaxed) < limit)
    }

    /// Claim one activation.
    ///
    /// Atomic against concurrent claimers: with a hit limit of N, exactly N
    /// claims succeed over the rule's lifetime.
    pub fn try_record_hit(&self) -> bool {
        match self.hit_limit {
            None => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(limit) => self
                .hit_count
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                    (count < limit).then_some(count + 1)
                })
                .is_ok(),
        }
    }
}

/// Concrete targets a resolved rule matches against.
///
/// An empty target list means the rule carries no target restriction.
#[derive(Debug, Clone)]
pub enum ResolvedTargets {
    /// Gateway rules: service (region) endpoint URIs
    Endpoints(Vec<Url>),
    /// Direct rules matched per individual replica address
    Replicas(Vec<ReplicaAddress>),
    /// Direct rules collapsed to one entry per physical server
    Servers(Vec<ServerKey>),
}

impl ResolvedTargets {
    /// Whether `address` is a member of this target set (empty = match all)
    #[must_use]
    pub fn contains_address(&self, address: &ReplicaAddress) -> bool {
        match self {
            Self::Replicas(replicas) => replicas.is_empty() || replicas.contains(address),
            Self::Servers(servers) => {
                servers.is_empty() || servers.contains(&address.server_key())
            }
            Self::Endpoints(_) => false,
        }
    }

    /// Whether `endpoint` is a member of this target set (empty = match all)
    #[must_use]
    pub fn contains_endpoint(&self, endpoint: &Url) -> bool {
        match self {
            Self::Endpoints(endpoints) => endpoints.is_empty() || endpoints.contains(endpoint),
            Self::Replicas(_) | Self::Servers(_) => false,
        }
    }

    /// The replica addresses, when this set is replica-addressed
    #[must_use]
    pub fn replica_addresses(&self) -> &[ReplicaAddress] {
        match self {
            Self::Replicas(replicas) => replicas,
            Self::Endpoints(_) | Self::Servers(_) => &[],
        }
    }

    /// Number of entries in the set
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Endpoints(e) => e.len(),
            Self::Replicas(r) => r.len(),
            Self::Servers(s) => s.len(),
        }
    }

    /// Whether the set is empty (no target restriction)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The matchable half of an effective rule
#[derive(Debug, Clone)]
pub struct ResolvedCondition {
    /// Resource id of the collection the rule is scoped to
    pub collection_rid: String,
    /// Operation type restriction (all operations when `None`)
    pub operation_type: Option<OperationType>,
    /// Concrete targets
    pub targets: ResolvedTargets,
}

/// A server-error effective rule, matched per request
#[derive(Debug)]
pub struct ServerErrorRule {
    pub(crate) state: RuleState,
    pub(crate) condition: ResolvedCondition,
    pub(crate) result: ServerErrorResult,
}

/// A connection-error effective rule, matched per endpoint and driven by the
/// background task
#[derive(Debug)]
pub struct ConnectionErrorRule {
    pub(crate) state: RuleState,
    pub(crate) condition: ResolvedCondition,
    pub(crate) result: ConnectionErrorResult,
}

/// Resolved form of a [`FaultInjectionRule`](crate::rule::FaultInjectionRule)
#[derive(Debug)]
pub enum EffectiveRule {
    /// Per-request delay / synthetic error
    ServerError(ServerErrorRule),
    /// Endpoint-level connection fault
    ConnectionError(ConnectionErrorRule),
}

impl EffectiveRule {
    /// Scheduling / accounting state
    #[must_use]
    pub fn state(&self) -> &RuleState {
        match self {
            Self::ServerError(rule) => &rule.state,
            Self::ConnectionError(rule) => &rule.state,
        }
    }

    /// Resolved condition
    #[must_use]
    pub fn condition(&self) -> &ResolvedCondition {
        match self {
            Self::ServerError(rule) => &rule.condition,
            Self::ConnectionError(rule) => &rule.condition,
        }
    }

    /// Id of the source rule
    #[must_use]
    pub fn rule_id(&self) -> &str {
        self.state().rule_id()
    }

    /// The server-error variant, when this is one
    #[must_use]
    pub fn as_server_error(&self) -> Option<&ServerErrorRule> {
        match self {
            Self::ServerError(rule) => Some(rule),
            Self::ConnectionError(_) => None,
        }
    }

    /// The connection-error variant, when this is one
    #[must_use]
    pub fn as_connection_error(&self) -> Option<&ConnectionErrorRule> {
        match self {
            Self::ConnectionError(rule) => Some(rule),
            Self::ServerError(_) => None,
        }
    }
}

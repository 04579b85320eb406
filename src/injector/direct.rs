//! Direct-mode transport injector.
//!
//! Consulted by the binary-protocol transport once per outgoing replica
//! request. Holds the engine-managed rule set as its first delegate; further
//! delegates can be layered behind it with [`DirectInjector::add_delegate`].

use std::sync::Arc;
use std::time::Duration;

use super::{DelegateChain, FaultInjector, RuleSetInjector, TransportRequest};
use crate::resolver::EffectiveRule;
use crate::rule::InjectedServerError;

/// Injector for the direct binary-protocol transport
pub struct DirectInjector {
    rules: Arc<RuleSetInjector>,
    chain: DelegateChain,
}

impl DirectInjector {
    /// Create an injector with an empty rule set
    #[must_use]
    pub fn new() -> Self {
        let rules = Arc::new(RuleSetInjector::new());
        let chain = DelegateChain::new(Arc::clone(&rules) as Arc<dyn FaultInjector>);
        Self { rules, chain }
    }

    /// Append a delegate behind the engine-managed rule set.
    ///
    /// Delegates are consulted in registration order; the first one that
    /// reports a match wins.
    pub fn add_delegate(&self, delegate: Arc<dyn FaultInjector>) {
        self.chain.push(delegate);
    }

    /// Register a resolved rule (replaces any previous rule with the same id)
    pub(crate) fn register(&self, rule: Arc<EffectiveRule>) {
        self.rules.register(rule);
    }

    /// Remove a rule by id
    pub(crate) fn unregister(&self, rule_id: &str) -> bool {
        self.rules.unregister(rule_id)
    }

    /// Whether a rule with this id is registered (observed by the
    /// connection-error background loop)
    #[must_use]
    pub fn contains_rule(&self, rule_id: &str) -> bool {
        self.rules.contains(rule_id)
    }
}

impl Default for DirectInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector for DirectInjector {
    fn response_delay_before_send(&self, request: &TransportRequest) -> Option<Duration> {
        self.chain.first_some(|d| d.response_delay_before_send(request))
    }

    fn response_delay_after_send(&self, request: &TransportRequest) -> Option<Duration> {
        self.chain.first_some(|d| d.response_delay_after_send(request))
    }

    fn response_error(&self, request: &TransportRequest) -> Option<InjectedServerError> {
        self.chain.first_some(|d| d.response_error(request))
    }

    fn connection_delay(&self, request: &TransportRequest) -> Option<Duration> {
        self.chain.first_some(|d| d.connection_delay(request))
    }
}

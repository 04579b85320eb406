//! Rule compilation and registration.
//!
//! The engine is the single entry point callers use: it validates and
//! resolves a batch of rules (concurrently, each rule independent), attaches
//! the resolved form back onto each rule, registers it with the transport
//! injector matching its connection kind, and spawns the background loop for
//! connection-error rules.

mod background;

use std::sync::Arc;

use futures::future;
use tracing::{info, warn};

use crate::injector::{DirectInjector, GatewayInjector};
use crate::resolver::ConditionResolver;
use crate::rule::{ConnectionKind, FaultInjectionRule};
use crate::topology::{AddressResolver, CollectionCache, ConnectionFaultHandler, EndpointManager};
use crate::Result;

use background::spawn_connection_error_task;

/// Compiles user rules into effective rules and wires them into the
/// transport injectors
pub struct FaultInjectionEngine {
    resolver: ConditionResolver,
    direct: Arc<DirectInjector>,
    gateway: Arc<GatewayInjector>,
    connection_faults: Arc<dyn ConnectionFaultHandler>,
}

impl FaultInjectionEngine {
    /// Create an engine over the client's topology collaborators.
    ///
    /// `client_connection_kind` is the mode the client actually runs in;
    /// direct-mode rules are rejected when it is not
    /// [`ConnectionKind::Direct`].
    #[must_use]
    pub fn new(
        collections: Arc<dyn CollectionCache>,
        endpoints: Arc<dyn EndpointManager>,
        addresses: Arc<dyn AddressResolver>,
        connection_faults: Arc<dyn ConnectionFaultHandler>,
        client_connection_kind: ConnectionKind,
    ) -> Self {
        Self {
            resolver: ConditionResolver::new(
                collections,
                endpoints,
                addresses,
                client_connection_kind,
            ),
            direct: Arc::new(DirectInjector::new()),
            gateway: Arc::new(GatewayInjector::new()),
            connection_faults,
        }
    }

    /// The injector the direct binary-protocol transport consults
    #[must_use]
    pub fn direct_injector(&self) -> Arc<DirectInjector> {
        Arc::clone(&self.direct)
    }

    /// The injector the gateway HTTP transport consults
    #[must_use]
    pub fn gateway_injector(&self) -> Arc<GatewayInjector> {
        Arc::clone(&self.gateway)
    }

    /// Compile and register a batch of rules against `container_link`.
    ///
    /// Rules resolve concurrently and register independently; one rule's
    /// failure does not block the others. The first failure is surfaced
    /// after the whole batch has settled, and rules registered before the
    /// failure stay registered (best-effort batch, no rollback).
    ///
    /// # Errors
    ///
    /// The first [`Error`](crate::Error) produced by a rule in the batch.
    pub async fn process_rules(
        &self,
        rules: &[Arc<FaultInjectionRule>],
        container_link: &str,
    ) -> Result<()> {
        let outcomes = future::join_all(
            rules
                .iter()
                .map(|rule| self.process_rule(rule, container_link)),
        )
        .await;

        let registered = outcomes.iter().filter(|o| o.is_ok()).count();
        if registered < rules.len() {
            warn!(
                registered,
                failed = rules.len() - registered,
                container_link,
                "Fault-injection rule batch partially registered"
            );
        } else {
            info!(registered, container_link, "Fault-injection rules registered");
        }

        outcomes.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }

    /// Remove a rule from the active rule set.
    ///
    /// The rule stops matching immediately; its connection-error background
    /// loop (if any) observes the removal at its next wake-up and exits.
    /// Returns `true` when a rule with this id was registered.
    pub fn unregister(&self, rule_id: &str) -> bool {
        let direct = self.direct.unregister(rule_id);
        let gateway = self.gateway.unregister(rule_id);
        let removed = direct || gateway;
        if removed {
            info!(rule_id = rule_id, "Fault-injection rule unregistered");
        }
        removed
    }

    async fn process_rule(
        &self,
        rule: &Arc<FaultInjectionRule>,
        container_link: &str,
    ) -> Result<()> {
        let effective = Arc::new(self.resolver.resolve(rule, container_link).await?);
        rule.attach_effective(Arc::clone(&effective));

        match rule.condition.connection_kind {
            ConnectionKind::Direct => self.direct.register(Arc::clone(&effective)),
            ConnectionKind::Gateway => self.gateway.register(Arc::clone(&effective)),
        }

        if effective.as_connection_error().is_some() {
            spawn_connection_error_task(
                Arc::clone(&self.direct),
                Arc::clone(&effective),
                Arc::clone(&self.connection_faults),
            );
        }

        info!(
            rule_id = %rule.id,
            connection_kind = ?rule.condition.connection_kind,
            "Fault-injection rule registered"
        );
        Ok(())
    }
}

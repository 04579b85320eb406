//! Condition resolution: abstract rule conditions to concrete targets.
//!
//! Resolution is asynchronous (it may hit the collection-metadata cache and
//! the address resolver over the network) and happens once, at registration
//! time. The resolved [`EffectiveRule`] is immutable afterwards.

mod effective;

pub use effective::{
    ConnectionErrorRule, EffectiveRule, ResolvedCondition, ResolvedTargets, RuleState,
    ServerErrorRule,
};

use std::sync::Arc;

use tracing::debug;
use url::Url;

use crate::rule::{Condition, ConnectionKind, FaultInjectionResult, FaultInjectionRule};
use crate::topology::{
    AddressResolver, Collection, CollectionCache, EndpointManager, ReplicaAddress,
};
use crate::{Error, Result};

/// Resolves abstract rule conditions into concrete matchable targets
pub struct ConditionResolver {
    collections: Arc<dyn CollectionCache>,
    endpoints: Arc<dyn EndpointManager>,
    addresses: Arc<dyn AddressResolver>,
    /// The connection mode the client actually runs in
    client_connection_kind: ConnectionKind,
}

impl ConditionResolver {
    /// Create a resolver over the client's topology collaborators
    #[must_use]
    pub fn new(
        collections: Arc<dyn CollectionCache>,
        endpoints: Arc<dyn EndpointManager>,
        addresses: Arc<dyn AddressResolver>,
        client_connection_kind: ConnectionKind,
    ) -> Self {
        Self {
            collections,
            endpoints,
            addresses,
            client_connection_kind,
        }
    }

    /// Resolve `rule` against `container_link` into its effective form.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidRule`] for shape errors or a direct-mode rule on a
    /// non-direct client; [`Error::ContainerNotResolved`] when the container
    /// link is unknown; resolution errors from the topology collaborators.
    pub async fn resolve(
        &self,
        rule: &FaultInjectionRule,
        container_link: &str,
    ) -> Result<EffectiveRule> {
        rule.validate()?;
        if rule.condition.connection_kind == ConnectionKind::Direct
            && self.client_connection_kind != ConnectionKind::Direct
        {
            return Err(Error::invalid_rule(
                &rule.id,
                "direct-mode rule registered while the client connection mode is gateway",
            ));
        }

        let collection = self.collections.resolve_collection(container_link).await?;

        let targets = match rule.condition.connection_kind {
            ConnectionKind::Gateway => {
                ResolvedTargets::Endpoints(self.resolve_service_endpoints(&rule.condition).await?)
            }
            ConnectionKind::Direct => self.resolve_physical_targets(&collection, rule).await?,
        };

        debug!(
            rule_id = %rule.id,
            collection_rid = %collection.resource_id,
            target_count = targets.len(),
            "Resolved fault-injection rule condition"
        );

        let condition = ResolvedCondition {
            collection_rid: collection.resource_id,
            operation_type: rule.condition.operation_type,
            targets,
        };
        let state = RuleState::new(
            rule.id.clone(),
            rule.enabled,
            rule.start_delay,
            rule.duration,
            rule.hit_limit,
        );

        Ok(match &rule.result {
            FaultInjectionResult::ServerError(result) => EffectiveRule::ServerError(ServerErrorRule {
                state,
                condition,
                result: result.clone(),
            }),
            FaultInjectionResult::ConnectionError(result) => {
                EffectiveRule::ConnectionError(ConnectionErrorRule {
                    state,
                    condition,
                    result: result.clone(),
                })
            }
        })
    }

    /// Gateway rules target service endpoints: the named region's endpoint,
    /// or every read/write endpoint when no region is given.
    async fn resolve_service_endpoints(&self, condition: &Condition) -> Result<Vec<Url>> {
        let is_write = condition.is_write_scoped();
        match &condition.region {
            Some(region) => {
                let endpoint = self
                    .endpoints
                    .resolve_region_endpoint(region, is_write)
                    .await?;
                Ok(vec![endpoint])
            }
            None if is_write => Ok(self.endpoints.write_endpoints().await),
            None => Ok(self.endpoints.read_endpoints().await),
        }
    }

    /// Direct rules target physical replicas. Write-scoped rules pin the
    /// primary; otherwise the replica set is sorted deterministically and
    /// truncated to the selector's replica count. Per-server result kinds
    /// collapse the set to distinct server keys.
    async fn resolve_physical_targets(
        &self,
        collection: &Collection,
        rule: &FaultInjectionRule,
    ) -> Result<ResolvedTargets> {
        let Some(selector) = &rule.condition.endpoint_selector else {
            // No selector: no target restriction.
            return Ok(ResolvedTargets::Replicas(Vec::new()));
        };

        let mut replicas: Vec<ReplicaAddress> = if rule.condition.is_write_scoped() {
            self.addresses
                .resolve_primary(&collection.resource_id, &selector.feed_range)
                .await?
        } else {
            let mut all = self
                .addresses
                .resolve_addresses(
                    &collection.resource_id,
                    &selector.feed_range,
                    selector.include_primary,
                )
                .await?;
            // Deterministic subset: same sorted order on every client.
            all.sort_by(|a, b| a.uri.as_str().cmp(b.uri.as_str()));
            all.truncate(selector.replica_count);
            all
        };
        replicas.sort_by(|a, b| a.uri.as_str().cmp(b.uri.as_str()));

        let per_server = rule
            .result
            .as_server_error()
            .is_some_and(|server| server.error_type.applies_per_server());
        if per_server {
            let mut servers: Vec<_> = replicas.iter().map(ReplicaAddress::server_key).collect();
            servers.dedup();
            Ok(ResolvedTargets::Servers(servers))
        } else {
            Ok(ResolvedTargets::Replicas(replicas))
        }
    }
}

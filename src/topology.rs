//! Cluster topology types and the lookup seams the engine depends on.
//!
//! The engine never talks to the wire itself. It resolves rule conditions
//! through three read-only collaborators owned by the client (collection
//! metadata cache, global endpoint manager, partition address resolver) and
//! pushes connection faults through a fourth ([`ConnectionFaultHandler`])
//! exposed by the direct transport's endpoint pool.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::rule::ConnectionErrorResult;
use crate::{Error, Result};

/// Resolved collection (container) metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Stable resource id the backend uses to address the collection
    pub resource_id: String,
}

/// A partition-key-range selector scoping which partitions a rule targets.
///
/// The default range covers the whole keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedRange {
    /// Inclusive lower bound (effective partition key, hex)
    pub min_inclusive: String,
    /// Exclusive upper bound (effective partition key, hex)
    pub max_exclusive: String,
}

impl Default for FeedRange {
    fn default() -> Self {
        Self {
            min_inclusive: String::new(),
            max_exclusive: "FF".to_string(),
        }
    }
}

impl fmt::Display for FeedRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{})", self.min_inclusive, self.max_exclusive)
    }
}

/// Identifies one physical server process: all replicas behind one host:port
/// share a server key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerKey {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Physical address of a single replica.
///
/// The URI carries the per-replica path (partition + replica id), so two
/// replicas on the same server have distinct addresses but equal
/// [`ServerKey`]s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicaAddress {
    /// Full physical URI of the replica
    pub uri: Url,
    /// Whether this replica is the partition's primary
    pub is_primary: bool,
}

impl ReplicaAddress {
    /// Create an address from a URI
    #[must_use]
    pub fn new(uri: Url, is_primary: bool) -> Self {
        Self { uri, is_primary }
    }

    /// The server key (host:port) grouping replicas by physical server
    #[must_use]
    pub fn server_key(&self) -> ServerKey {
        ServerKey {
            host: self.uri.host_str().unwrap_or_default().to_string(),
            port: self.uri.port_or_known_default().unwrap_or(0),
        }
    }
}

impl fmt::Display for ReplicaAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// Collection-metadata lookup (external cache owned by the client)
#[async_trait]
pub trait CollectionCache: Send + Sync {
    /// Resolve a container link (`/dbs/{db}/colls/{coll}`) to its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ContainerNotResolved`] when the link is unknown.
    async fn resolve_collection(&self, container_link: &str) -> Result<Collection>;
}

/// Multi-region topology lookup (external global endpoint manager)
#[async_trait]
pub trait EndpointManager: Send + Sync {
    /// Resolve the service endpoint serving `region`.
    ///
    /// `is_write` selects the write-capable endpoint for the region when the
    /// account distinguishes read and write regional endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RegionNotFound`] when the region is not part of the
    /// account topology.
    async fn resolve_region_endpoint(&self, region: &str, is_write: bool) -> Result<Url>;

    /// All endpoints the client may read from, in failover-preference order
    async fn read_endpoints(&self) -> Vec<Url>;

    /// All endpoints the client may write to, in failover-preference order
    async fn write_endpoints(&self) -> Vec<Url>;
}

/// Partition physical-address lookup (external address resolver)
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the primary replica for the partitions overlapping
    /// `feed_range` of collection `collection_rid`.
    async fn resolve_primary(
        &self,
        collection_rid: &str,
        feed_range: &FeedRange,
    ) -> Result<Vec<ReplicaAddress>>;

    /// Resolve every replica for the partitions overlapping `feed_range`,
    /// optionally excluding primaries.
    async fn resolve_addresses(
        &self,
        collection_rid: &str,
        feed_range: &FeedRange,
        include_primary: bool,
    ) -> Result<Vec<ReplicaAddress>>;
}

/// Connection-fault sink exposed by the direct transport's endpoint pool.
///
/// The background task calls this once per interval per resolved address;
/// the transport is expected to fail new connections to that address under
/// the given rule id until the threshold is consumed.
pub trait ConnectionFaultHandler: Send + Sync {
    /// Instruct the endpoint serving `address` to start failing connections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Endpoint`] when the endpoint rejected the
    /// instruction. Callers on the background path log and continue.
    fn inject_connection_error(
        &self,
        address: &ReplicaAddress,
        rule_id: &str,
        result: &ConnectionErrorResult,
    ) -> Result<()>;
}

/// No-op handler for clients running in gateway mode, where no direct
/// endpoints exist to fault.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConnectionFaultHandler;

impl ConnectionFaultHandler for NullConnectionFaultHandler {
    fn inject_connection_error(
        &self,
        address: &ReplicaAddress,
        rule_id: &str,
        _result: &ConnectionErrorResult,
    ) -> Result<()> {
        Err(Error::Endpoint(format!(
            "no direct endpoint pool available for {address} (rule {rule_id})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_key_groups_replicas_on_same_server() {
        let a = ReplicaAddress::new(
            Url::parse("rntbd://db1.example.com:14001/apps/1/replicas/101s").unwrap(),
            true,
        );
        let b = ReplicaAddress::new(
            Url::parse("rntbd://db1.example.com:14001/apps/1/replicas/102s").unwrap(),
            false,
        );
        assert_ne!(a, b);
        assert_eq!(a.server_key(), b.server_key());
        assert_eq!(a.server_key().to_string(), "db1.example.com:14001");
    }

    #[test]
    fn distinct_ports_are_distinct_servers() {
        let a = ReplicaAddress::new(Url::parse("rntbd://db1.example.com:14001/r/1").unwrap(), false);
        let b = ReplicaAddress::new(Url::parse("rntbd://db1.example.com:14002/r/1").unwrap(), false);
        assert_ne!(a.server_key(), b.server_key());
    }

    #[test]
    fn default_feed_range_covers_full_keyspace() {
        let fr = FeedRange::default();
        assert_eq!(fr.min_inclusive, "");
        assert_eq!(fr.max_exclusive, "FF");
        assert_eq!(fr.to_string(), "[,FF)");
    }
}

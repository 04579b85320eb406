//! Abstract rule conditions: what traffic a rule applies to.

use serde::{Deserialize, Serialize};

use crate::topology::FeedRange;

/// Logical operation kinds a rule can scope itself to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Point read of a single item
    ReadItem,
    /// Create a new item
    CreateItem,
    /// Query items
    QueryItem,
    /// Upsert an item
    UpsertItem,
    /// Replace an existing item
    ReplaceItem,
    /// Delete an item
    DeleteItem,
    /// Partial-update (patch) an item
    PatchItem,
    /// Transactional batch
    BatchItem,
    /// Change-feed / read-feed scan
    ReadFeedItem,
}

impl OperationType {
    /// Whether this operation mutates data and therefore targets primary
    /// replicas / write endpoints
    #[must_use]
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateItem
                | Self::UpsertItem
                | Self::ReplaceItem
                | Self::DeleteItem
                | Self::PatchItem
                | Self::BatchItem
        )
    }
}

/// How the client reaches the store: per-replica binary protocol or
/// HTTP through the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Direct binary-protocol connections to individual replicas
    Direct,
    /// HTTP requests proxied through the service gateway
    Gateway,
}

/// Selects which partition replicas a direct-mode rule targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSelector {
    /// Partition-key-range scope
    pub feed_range: FeedRange,
    /// Whether primary replicas are part of the target set
    pub include_primary: bool,
    /// How many replicas (per the sorted resolution order) to target
    pub replica_count: usize,
}

impl Default for EndpointSelector {
    fn default() -> Self {
        Self {
            feed_range: FeedRange::default(),
            include_primary: true,
            replica_count: usize::MAX,
        }
    }
}

/// Abstract condition attached to a [`FaultInjectionRule`](super::FaultInjectionRule).
///
/// Every field except `connection_kind` is optional; an omitted field does
/// not restrict matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Operation type the rule applies to (all operations when `None`)
    #[serde(default)]
    pub operation_type: Option<OperationType>,
    /// Transport the rule applies to
    pub connection_kind: ConnectionKind,
    /// Region the rule applies to (all regions when `None`)
    #[serde(default)]
    pub region: Option<String>,
    /// Replica scope for direct-mode rules
    #[serde(default)]
    pub endpoint_selector: Option<EndpointSelector>,
}

impl Condition {
    /// Condition matching every operation on the given transport
    #[must_use]
    pub fn for_connection(connection_kind: ConnectionKind) -> Self {
        Self {
            operation_type: None,
            connection_kind,
            region: None,
            endpoint_selector: None,
        }
    }

    /// Whether the condition names a write operation type
    #[must_use]
    pub fn is_write_scoped(&self) -> bool {
        self.operation_type.is_some_and(OperationType::is_write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_operations_are_classified() {
        assert!(OperationType::CreateItem.is_write());
        assert!(OperationType::DeleteItem.is_write());
        assert!(OperationType::BatchItem.is_write());
        assert!(!OperationType::ReadItem.is_write());
        assert!(!OperationType::QueryItem.is_write());
        assert!(!OperationType::ReadFeedItem.is_write());
    }

    #[test]
    fn default_selector_targets_everything() {
        let sel = EndpointSelector::default();
        assert!(sel.include_primary);
        assert_eq!(sel.replica_count, usize::MAX);
    }

    #[test]
    fn condition_roundtrips_through_yaml() {
        let yaml = r"
operation_type: read_item
connection_kind: gateway
region: westus2
";
        let cond: Condition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cond.operation_type, Some(OperationType::ReadItem));
        assert_eq!(cond.connection_kind, ConnectionKind::Gateway);
        assert_eq!(cond.region.as_deref(), Some("westus2"));
        assert!(cond.endpoint_selector.is_none());
    }
}

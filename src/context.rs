//! Per-operation injection bookkeeping.
//!
//! One logical operation (a read, a write, a query) may fan out into several
//! transport-level request attempts: retries, cross-region failover,
//! cross-partition fan-out. Hit limits are accounted per logical operation,
//! so the hit-count map is *shared* between the original context and every
//! retry clone, while the per-attempt attribution map is private to each
//! attempt.

use std::sync::Arc;

use dashmap::DashMap;

/// Tracks which rules fired for one logical operation.
///
/// Cheap to clone for a retry via [`clone_for_retry`](Self::clone_for_retry):
/// the hit-count map is carried forward by reference, the attempt map starts
/// empty.
#[derive(Debug, Default)]
pub struct RequestInjectionContext {
    /// rule id -> times fired for this logical operation (shared across
    /// retry clones)
    hit_counts: Arc<DashMap<String, u64>>,
    /// transport request id -> rule id that fired for that attempt
    /// (diagnostic, fresh per clone)
    applied_rules: DashMap<u64, String>,
}

impl RequestInjectionContext {
    /// Fresh context for a new logical operation
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone for a retry of the same logical operation: shares the hit-count
    /// map, starts a fresh per-attempt map
    #[must_use]
    pub fn clone_for_retry(&self) -> Self {
        Self {
            hit_counts: Arc::clone(&self.hit_counts),
            applied_rules: DashMap::new(),
        }
    }

    /// Record that `rule_id` fired for transport request
    /// `transport_request_id`
    pub fn apply_rule(&self, transport_request_id: u64, rule_id: &str) {
        *self.hit_counts.entry(rule_id.to_string()).or_insert(0) += 1;
        self.applied_rules
            .insert(transport_request_id, rule_id.to_string());
    }

    /// Times `rule_id` has fired for this logical operation (0 if never)
    #[must_use]
    pub fn hit_count(&self, rule_id: &str) -> u64 {
        self.hit_counts.get(rule_id).map_or(0, |c| *c)
    }

    /// The rule that fired for a specific transport request attempt, if any
    #[must_use]
    pub fn applied_rule_id(&self, transport_request_id: u64) -> Option<String> {
        self.applied_rules
            .get(&transport_request_id)
            .map(|r| r.value().clone())
    }
}

//! Connection-error background task.
//!
//! A connection-error rule is not matched per request. Instead, one repeating
//! task per rule wakes every `interval`, and - while the rule is still
//! registered and valid - instructs the transport endpoint behind each
//! resolved address to start failing new connections. The loop has no
//! explicit cancellation handle: it observes rule removal and invalidity at
//! each wake-up and exits on its own.

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::injector::DirectInjector;
use crate::resolver::EffectiveRule;
use crate::topology::ConnectionFaultHandler;

/// Spawn the repeating fault-application loop for a connection-error rule.
///
/// Rules without the connection-error result are ignored.
pub(crate) fn spawn_connection_error_task(
    injector: Arc<DirectInjector>,
    rule: Arc<EffectiveRule>,
    handler: Arc<dyn ConnectionFaultHandler>,
) {
    if rule.as_connection_error().is_none() {
        return;
    }
    tokio::spawn(async move {
        run_connection_error_loop(&injector, &rule, handler.as_ref()).await;
    });
}

async fn run_connection_error_loop(
    injector: &DirectInjector,
    rule: &EffectiveRule,
    handler: &dyn ConnectionFaultHandler,
) {
    let Some(conn) = rule.as_connection_error() else {
        return;
    };
    let rule_id = rule.rule_id();
    debug!(rule_id = %rule_id, interval = ?conn.result.interval, "Connection-error loop started");

    loop {
        sleep(conn.result.interval).await;

        if !injector.contains_rule(rule_id) {
            debug!(rule_id = %rule_id, "Rule unregistered, connection-error loop exiting");
            return;
        }
        if rule.state().is_pending() {
            // Start delay has not elapsed; try again next interval.
            continue;
        }
        if !rule.state().is_valid() {
            debug!(rule_id = %rule_id, "Rule no longer valid, connection-error loop exiting");
            return;
        }

        for address in conn.condition.targets.replica_addresses() {
            if !rule.state().try_record_hit() {
                break;
            }
            match handler.inject_connection_error(address, rule_id, &conn.result) {
                Ok(()) => debug!(
                    rule_id = %rule_id,
                    address = %address,
                    error_type = %conn.result.error_type,
                    "Connection fault applied to endpoint"
                ),
                // Endpoint failures must never abort the loop or touch the
                // production request path.
                Err(error) => warn!(
                    rule_id = %rule_id,
                    address = %address,
                    error = %error,
                    "Failed to apply connection fault to endpoint"
                ),
            }
        }
    }
}

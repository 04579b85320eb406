//! Fault-injection rule engine for distributed document-store clients.
//!
//! `faultline` sits between a database client and its transports, injecting
//! delays, synthetic server errors, and connection faults according to
//! declarative rules - so retry, failover, and session-consistency logic can
//! be chaos-tested without touching the wire or the backend.
//!
//! # How it fits together
//!
//! - Declare rules with [`FaultInjectionRule::builder`] or load them from a
//!   YAML document ([`config::RuleSetConfig`]).
//! - Hand them to [`engine::FaultInjectionEngine::process_rules`], which
//!   resolves abstract conditions (region, operation type, replica
//!   selectors) into concrete targets and registers them with the matching
//!   transport injector.
//! - The transports consult [`injector::DirectInjector`] /
//!   [`injector::GatewayInjector`] before and after every outgoing call;
//!   queries return `None` for production traffic at the cost of a few
//!   comparisons.
//! - Connection-error rules run a background loop that periodically tells
//!   target endpoints to fail new connections, until the rule expires.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod injector;
pub mod resolver;
pub mod rule;
pub mod topology;

pub use context::RequestInjectionContext;
pub use engine::FaultInjectionEngine;
pub use error::{Error, Result};
pub use rule::{FaultInjectionRule, FaultInjectionRuleBuilder};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}

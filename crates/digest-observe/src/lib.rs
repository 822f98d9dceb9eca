// digestd - HTTP Digest authentication service
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observability hooks for digest authentication.
//!
//! The authenticator reports every terminal outcome through a process-wide
//! [`AuthMetrics`] sink. Nothing is reported until a sink is installed.
//!
//! # Example
//! ```
//! use digest_observe::{set_auth_metrics, TracingAuthMetrics};
//! use std::sync::Arc;
//! set_auth_metrics(Arc::new(TracingAuthMetrics));
//! ```

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::Level;

/// Metrics sink for authentication outcomes.
///
/// `reason` and `op` are low-cardinality identifiers such as `"replay"` or
/// `"authenticate"`. Implementations must never receive usernames, nonces
/// or digests through these hooks.
pub trait AuthMetrics: Send + Sync + 'static {
    fn on_challenge(&self, stale: bool);
    fn on_authenticated(&self);
    fn on_rejected(&self, reason: &str);
    fn on_latency(&self, op: &str, nanos: u64);
}

#[derive(Debug, Default)]
struct NoopAuthMetrics;

impl AuthMetrics for NoopAuthMetrics {
    fn on_challenge(&self, _stale: bool) {}
    fn on_authenticated(&self) {}
    fn on_rejected(&self, _reason: &str) {}
    fn on_latency(&self, _op: &str, _nanos: u64) {}
}

static AUTH_METRICS: OnceCell<Arc<dyn AuthMetrics>> = OnceCell::new();
static NOOP_AUTH_METRICS: NoopAuthMetrics = NoopAuthMetrics;

/// Installs the global sink. Returns `false` if one was already installed.
pub fn set_auth_metrics(metrics: Arc<dyn AuthMetrics>) -> bool {
    AUTH_METRICS.set(metrics).is_ok()
}

/// Currently installed sink, or a no-op.
pub fn auth_metrics() -> &'static dyn AuthMetrics {
    AUTH_METRICS
        .get()
        .map(|arc| arc.as_ref())
        .unwrap_or(&NOOP_AUTH_METRICS)
}

/// Span wrapping one authentication decision.
pub fn span_for_auth(op: &'static str, realm: &str) -> tracing::Span {
    tracing::span!(Level::INFO, "digest_auth", op = op, realm = realm)
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingAuthMetrics;

impl AuthMetrics for TracingAuthMetrics {
    fn on_challenge(&self, stale: bool) {
        tracing::debug!(stale, "challenge issued");
    }

    fn on_authenticated(&self) {
        tracing::debug!("request authenticated");
    }

    fn on_rejected(&self, reason: &str) {
        tracing::info!(reason, "request rejected");
    }

    fn on_latency(&self, op: &str, nanos: u64) {
        tracing::trace!(op, nanos, "latency");
    }
}

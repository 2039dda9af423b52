use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use http::StatusCode;

use super::Middleware;
use crate::context::RequestContext;
use crate::router::Operation;

/// Counters for one operation.
#[derive(Debug, Default)]
pub struct OperationStats {
    requests: AtomicUsize,
    errors: AtomicUsize,
    timeouts: AtomicUsize,
    total_latency_ns: AtomicU64,
}

impl OperationStats {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Responses with status >= 400.
    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Responses with status 504.
    pub fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::Relaxed)
    }

    pub fn average_latency(&self) -> Duration {
        let count = self.requests() as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }
}

/// Collects request counts and latency, overall and per operation.
///
/// All counters are atomics; the per-operation table is a `DashMap` keyed by
/// operation id, so recording never takes a global lock.
#[derive(Debug, Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    auth_failures: AtomicUsize,
    per_operation: DashMap<String, Arc<OperationStats>>,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests processed
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean processing time across all requests; zero before the first one.
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Responses with status 401.
    pub fn auth_failures(&self) -> usize {
        self.auth_failures.load(Ordering::Relaxed)
    }

    pub fn operation(&self, operation_id: &str) -> Option<Arc<OperationStats>> {
        self.per_operation
            .get(operation_id)
            .map(|s| Arc::clone(s.value()))
    }

    fn stats_for(&self, operation_id: &str) -> Arc<OperationStats> {
        if let Some(s) = self.per_operation.get(operation_id) {
            return Arc::clone(s.value());
        }
        Arc::clone(
            self.per_operation
                .entry(operation_id.to_string())
                .or_default()
                .value(),
        )
    }
}

impl Middleware for MetricsMiddleware {
    fn after(
        &self,
        _ctx: &RequestContext,
        operation: &Operation,
        status: StatusCode,
        latency: Duration,
    ) {
        let nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
        if status == StatusCode::UNAUTHORIZED {
            self.auth_failures.fetch_add(1, Ordering::Relaxed);
        }

        let stats = self.stats_for(operation.operation_id());
        stats.requests.fetch_add(1, Ordering::Relaxed);
        stats.total_latency_ns.fetch_add(nanos, Ordering::Relaxed);
        if status.is_client_error() || status.is_server_error() {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        if status == StatusCode::GATEWAY_TIMEOUT {
            stats.timeouts.fetch_add(1, Ordering::Relaxed);
        }
    }
}

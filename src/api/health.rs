//! Shared health state for the /health endpoint.
//! Updated by the consistency and dashboard services, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error};

use crate::error::{ServiceError, StoreError};

/// A store error younger than this marks the service as degraded.
const DEGRADED_WINDOW_NS: u64 = 5 * 60 * 1_000_000_000;

#[derive(Default)]
pub struct HealthState {
    /// Store errors swallowed by the fail-soft boundary since startup.
    pub store_errors: AtomicU64,
    /// Nanosecond timestamp of the last swallowed store error (0 = none).
    pub last_store_error_at_ns: AtomicU64,
    pub requests_served: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a store failure that is about to be replaced by an empty result.
    pub fn record_store_error(&self, operation: &str, err: &StoreError) {
        error!(operation, "Store error, serving empty result: {err}");
        self.store_errors.fetch_add(1, Ordering::Relaxed);
        self.last_store_error_at_ns.store(now_ns(), Ordering::Relaxed);
    }

    pub fn record_failure(&self, operation: &str, err: &ServiceError) {
        match err {
            ServiceError::NotFound(what) => {
                debug!(operation, "{what} not found, serving empty result");
            }
            ServiceError::Store(e) => self.record_store_error(operation, e),
        }
    }

    pub fn inc_requests_served(&self) {
        self.requests_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_errors(&self) -> u64 {
        self.store_errors.load(Ordering::Relaxed)
    }

    pub fn last_store_error_at_ns(&self) -> u64 {
        self.last_store_error_at_ns.load(Ordering::Relaxed)
    }

    pub fn requests_served(&self) -> u64 {
        self.requests_served.load(Ordering::Relaxed)
    }

    pub fn is_degraded(&self) -> bool {
        let last = self.last_store_error_at_ns();
        last != 0 && now_ns().saturating_sub(last) < DEGRADED_WINDOW_NS
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

//! Gate counters shared by all chat actors.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use warden_common::MetricsSnapshot;

/// Runtime statistics
#[derive(Debug, Default)]
pub struct GateStats {
    pub joins: AtomicU64,
    pub challenges_issued: AtomicU64,
    pub verified: AtomicU64,
    pub approved: AtomicU64,
    pub removed_attempts: AtomicU64,
    pub removed_timeout: AtomicU64,
    pub unauthorized: AtomicU64,
    pub expired_sessions: AtomicU64,
    pub gateway_failures: AtomicU64,
    /// Gauge, adjusted by each actor after every event
    pending: AtomicI64,
}

impl GateStats {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn adjust_pending(&self, delta: i64) {
        if delta != 0 {
            self.pending.fetch_add(delta, Ordering::Relaxed);
        }
    }

    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed).max(0) as u64
    }

    pub fn snapshot(&self, uptime_secs: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            joins: self.joins.load(Ordering::Relaxed),
            challenges_issued: self.challenges_issued.load(Ordering::Relaxed),
            verified: self.verified.load(Ordering::Relaxed),
            approved: self.approved.load(Ordering::Relaxed),
            removed_attempts: self.removed_attempts.load(Ordering::Relaxed),
            removed_timeout: self.removed_timeout.load(Ordering::Relaxed),
            unauthorized: self.unauthorized.load(Ordering::Relaxed),
            expired_sessions: self.expired_sessions.load(Ordering::Relaxed),
            gateway_failures: self.gateway_failures.load(Ordering::Relaxed),
            pending: self.pending(),
            uptime_secs,
        }
    }
}

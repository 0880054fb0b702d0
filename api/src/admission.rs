//! Per-process admission control around the sliding-window ledger.
//!
//! State is in memory only: it is lost on restart and not shared between
//! instances, so limits hold per instance.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use recallbridge_core::rate_limit::{Admission, RateLedger, RateWindow};
use tokio::sync::Mutex;

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis().min(u64::MAX as u128) as u64)
            .unwrap_or(0)
    }
}

#[derive(Clone)]
pub struct AdmissionControl {
    ledger: Arc<Mutex<RateLedger>>,
    clock: Arc<dyn Clock>,
}

impl AdmissionControl {
    pub fn new(windows: Vec<RateWindow>) -> Self {
        Self::with_clock(windows, Arc::new(SystemClock))
    }

    pub fn with_clock(windows: Vec<RateWindow>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Arc::new(Mutex::new(RateLedger::new(windows))),
            clock,
        }
    }

    pub async fn admit(&self, client_key: &str) -> Admission {
        let now_ms = self.clock.now_ms();
        self.ledger.lock().await.admit(client_key, now_ms)
    }
}

/// Resolve the rate-limit key: forwarded client address, then peer address.
///
/// Expects a proxy in front that overwrites `X-Forwarded-For` and
/// `X-Real-IP`. Without one, a client can pick a fresh key per request,
/// bypassing the limiter and growing the ledger map.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "anonymous".to_string())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::Clock;

    /// Manually advanced clock.
    pub struct FixedClock(pub AtomicU64);

    impl FixedClock {
        pub fn at(ms: u64) -> Self {
            Self(AtomicU64::new(ms))
        }

        pub fn advance(&self, ms: u64) {
            self.0.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for FixedClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }
}

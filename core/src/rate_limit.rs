//! Strict sliding-window admission ledger.
//!
//! Every admitted attempt is recorded per client key; a new attempt is
//! admitted only if no configured window already holds `limit` entries.
//! Rejected attempts are not recorded. The ledger lives in process memory
//! and is pruned to the widest window on every access.

use std::collections::{HashMap, VecDeque};

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub duration_ms: u64,
    pub limit: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateWindowError {
    #[error("rate limit table must contain at least one window")]
    Empty,
    #[error("invalid rate window '{0}', expected <durationMs>:<limit>")]
    Malformed(String),
    #[error("rate window '{0}' must have a positive duration and limit")]
    NonPositive(String),
}

impl RateWindow {
    /// Parse a window table such as `1000:1,3600000:30`.
    pub fn parse_table(raw: &str) -> Result<Vec<RateWindow>, RateWindowError> {
        let mut windows = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (duration, limit) = entry
                .split_once(':')
                .ok_or_else(|| RateWindowError::Malformed(entry.to_string()))?;
            let duration_ms: u64 = duration
                .trim()
                .parse()
                .map_err(|_| RateWindowError::Malformed(entry.to_string()))?;
            let limit: usize = limit
                .trim()
                .parse()
                .map_err(|_| RateWindowError::Malformed(entry.to_string()))?;
            if duration_ms == 0 || limit == 0 {
                return Err(RateWindowError::NonPositive(entry.to_string()));
            }
            windows.push(RateWindow { duration_ms, limit });
        }
        if windows.is_empty() {
            return Err(RateWindowError::Empty);
        }
        Ok(windows)
    }
}

/// Default table: one request per second, thirty per hour.
pub fn default_windows() -> Vec<RateWindow> {
    vec![
        RateWindow {
            duration_ms: 1_000,
            limit: 1,
        },
        RateWindow {
            duration_ms: 3_600_000,
            limit: 30,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub admitted: bool,
    /// Zero when admitted
    pub retry_after_ms: u64,
}

#[derive(Debug)]
pub struct RateLedger {
    windows: Vec<RateWindow>,
    widest_ms: u64,
    entries: HashMap<String, VecDeque<u64>>,
}

impl RateLedger {
    pub fn new(windows: Vec<RateWindow>) -> Self {
        let widest_ms = windows.iter().map(|w| w.duration_ms).max().unwrap_or(0);
        Self {
            windows,
            widest_ms,
            entries: HashMap::new(),
        }
    }

    /// Decide whether `key` may proceed at `now_ms` (milliseconds since epoch).
    pub fn admit(&mut self, key: &str, now_ms: u64) -> Admission {
        let ledger = self.entries.entry(key.to_string()).or_default();

        let horizon = now_ms.saturating_sub(self.widest_ms);
        while ledger.front().is_some_and(|&ts| ts <= horizon) {
            ledger.pop_front();
        }

        let mut retry_after_ms = 0;
        for window in &self.windows {
            let window_start = now_ms.saturating_sub(window.duration_ms);
            let in_window: Vec<u64> = ledger
                .iter()
                .copied()
                .filter(|&ts| ts > window_start)
                .collect();
            if in_window.len() >= window.limit {
                let oldest = in_window[0];
                let wait = (oldest + window.duration_ms).saturating_sub(now_ms);
                retry_after_ms = retry_after_ms.max(wait);
            }
        }

        if retry_after_ms > 0 {
            return Admission {
                admitted: false,
                retry_after_ms,
            };
        }

        // Clock skew must not break ordering.
        let stamp = ledger.back().map_or(now_ms, |&last| last.max(now_ms));
        ledger.push_back(stamp);
        Admission {
            admitted: true,
            retry_after_ms: 0,
        }
    }

    /// Entries currently retained for `key`.
    #[cfg(test)]
    pub(crate) fn retained(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, VecDeque::len)
    }
}

//! Request statistics for the console status line
//!
//! Every backend call made through [`crate::api::RestBackend`] can be timed
//! into a [`RequestMonitor`]. The console shows the resulting snapshot so an
//! operator exercising the limiter sees how many calls were throttled.

use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Point-in-time view of recent backend traffic
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSnapshot {
    /// Requests completed in the last minute
    pub requests_per_minute: u64,
    /// Requests in the last minute that succeeded
    pub successes: u64,
    /// Requests in the last minute answered with 429
    pub rate_limited: u64,
    /// Requests in the last minute that failed for any other reason
    pub failures: u64,
    /// Average latency over the retained samples, in milliseconds
    pub avg_latency_ms: f64,
    /// Share of last-minute requests that were not failures (0-100)
    pub success_rate: f64,
    pub timestamp: DateTime<Utc>,
}

impl RequestSnapshot {
    /// One-line summary for the status bar
    pub fn status_line(&self) -> String {
        format!(
            "requests/min: {} | ok: {} | throttled: {} | failed: {} | avg latency: {:.0}ms",
            self.requests_per_minute,
            self.successes,
            self.rate_limited,
            self.failures,
            self.avg_latency_ms
        )
    }
}

#[derive(Debug, Clone)]
struct RequestSample {
    duration: Duration,
    /// `None` for success
    outcome: Option<ErrorKind>,
    timestamp: DateTime<Utc>,
}

/// Collects latency and outcome of backend requests
#[derive(Debug)]
pub struct RequestMonitor {
    samples: Mutex<VecDeque<RequestSample>>,
    max_samples: usize,
    last_warning: Mutex<Option<DateTime<Utc>>>,
}

/// Minimum spacing between two low-success-rate warnings
const WARNING_INTERVAL_SECS: i64 = 60;

impl Default for RequestMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMonitor {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::new()),
            max_samples,
            last_warning: Mutex::new(None),
        }
    }

    fn samples(&self) -> MutexGuard<'_, VecDeque<RequestSample>> {
        self.samples.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record one completed request
    pub fn record(&self, duration: Duration, outcome: Option<ErrorKind>) {
        self.record_at(duration, outcome, Utc::now());
    }

    /// Record a request completed at a specific time
    ///
    /// This is primarily used for testing with controlled timestamps.
    pub fn record_at(&self, duration: Duration, outcome: Option<ErrorKind>, timestamp: DateTime<Utc>) {
        debug!("Recording request: {:?} in {:?}", outcome, duration);

        let mut samples = self.samples();
        samples.push_back(RequestSample {
            duration,
            outcome,
            timestamp,
        });
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    /// Number of retained samples
    pub fn sample_count(&self) -> usize {
        self.samples().len()
    }

    pub fn snapshot(&self) -> RequestSnapshot {
        let now = Utc::now();
        let one_minute_ago = now - chrono::Duration::minutes(1);
        let samples = self.samples();

        let avg_latency_ms = if samples.is_empty() {
            0.0
        } else {
            let total_ms: f64 = samples
                .iter()
                .map(|s| s.duration.as_secs_f64() * 1000.0)
                .sum();
            total_ms / samples.len() as f64
        };

        let recent: Vec<_> = samples
            .iter()
            .filter(|s| s.timestamp >= one_minute_ago)
            .collect();

        let successes = recent.iter().filter(|s| s.outcome.is_none()).count() as u64;
        let rate_limited = recent
            .iter()
            .filter(|s| s.outcome == Some(ErrorKind::RateLimited))
            .count() as u64;
        let requests_per_minute = recent.len() as u64;
        let failures = requests_per_minute - successes - rate_limited;

        // Throttled calls are an expected outcome, not a failure
        let success_rate = if recent.is_empty() {
            100.0
        } else {
            ((successes + rate_limited) as f64 / requests_per_minute as f64) * 100.0
        };

        drop(recent);
        drop(samples);

        if success_rate < 50.0 && requests_per_minute > 0 {
            self.warn_low_success_rate(success_rate, now);
        }

        RequestSnapshot {
            requests_per_minute,
            successes,
            rate_limited,
            failures,
            avg_latency_ms,
            success_rate,
            timestamp: now,
        }
    }

    /// Log a low success rate at most once per [`WARNING_INTERVAL_SECS`]
    ///
    /// Returns whether the warning was written.
    fn warn_low_success_rate(&self, success_rate: f64, now: DateTime<Utc>) -> bool {
        let mut last = self.last_warning.lock().unwrap_or_else(|p| p.into_inner());
        let due = match *last {
            Some(at) => now - at >= chrono::Duration::seconds(WARNING_INTERVAL_SECS),
            None => true,
        };
        if due {
            warn!("Most backend requests are failing: {:.1}% ok", success_rate);
            *last = Some(now);
        }
        due
    }
}

/// Measures one request and records it on `finish`
pub struct RequestTimer {
    start_time: Instant,
    monitor: Arc<RequestMonitor>,
}

impl RequestTimer {
    pub fn start(monitor: Arc<RequestMonitor>) -> Self {
        Self {
            start_time: Instant::now(),
            monitor,
        }
    }

    pub fn finish(self, outcome: Option<ErrorKind>) {
        let duration = self.start_time.elapsed();
        self.monitor.record(duration, outcome);
    }
}

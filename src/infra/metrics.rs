//! Lock-free tick counters and periodic reporting
//!
//! Interval counters are swapped to zero on each report; lifetime totals are
//! kept separately for the shutdown summary.
//!
//! Relaxed ordering throughout: these are statistical counters and never
//! gate any logic.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    published: AtomicU64,
    skipped: AtomicU64,
    publish_failed: AtomicU64,
    mock_fallbacks: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> [u64; 5] {
        [
            self.ticks.load(Ordering::Relaxed),
            self.published.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.publish_failed.load(Ordering::Relaxed),
            self.mock_fallbacks.load(Ordering::Relaxed),
        ]
    }

    fn swap(&self) -> [u64; 5] {
        [
            self.ticks.swap(0, Ordering::Relaxed),
            self.published.swap(0, Ordering::Relaxed),
            self.skipped.swap(0, Ordering::Relaxed),
            self.publish_failed.swap(0, Ordering::Relaxed),
            self.mock_fallbacks.swap(0, Ordering::Relaxed),
        ]
    }
}

pub struct Metrics {
    interval: Counters,
    total: Counters,
    last_report: Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            interval: Counters::default(),
            total: Counters::default(),
            last_report: Mutex::new(Instant::now()),
        }
    }

    #[inline]
    fn bump(&self, pick: impl Fn(&Counters) -> &AtomicU64) {
        pick(&self.interval).fetch_add(1, Ordering::Relaxed);
        pick(&self.total).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tick(&self) {
        self.bump(|c| &c.ticks);
    }

    pub fn record_published(&self) {
        self.bump(|c| &c.published);
    }

    pub fn record_skipped(&self) {
        self.bump(|c| &c.skipped);
    }

    pub fn record_publish_failed(&self) {
        self.bump(|c| &c.publish_failed);
    }

    pub fn record_mock_fallback(&self) {
        self.bump(|c| &c.mock_fallbacks);
    }

    /// Swap interval counters and return what accumulated since the last report
    pub fn report(&self) -> MetricsSummary {
        let [ticks, published, skipped, publish_failed, mock_fallbacks] = self.interval.swap();
        let elapsed_secs = {
            let mut last = self.last_report.lock();
            let elapsed = last.elapsed().as_secs_f64();
            *last = Instant::now();
            elapsed
        };
        MetricsSummary {
            scope: "interval",
            elapsed_secs,
            ticks,
            published,
            skipped,
            publish_failed,
            mock_fallbacks,
        }
    }

    /// Lifetime totals, without resetting anything
    pub fn totals(&self) -> MetricsSummary {
        let [ticks, published, skipped, publish_failed, mock_fallbacks] = self.total.snapshot();
        MetricsSummary {
            scope: "total",
            elapsed_secs: 0.0,
            ticks,
            published,
            skipped,
            publish_failed,
            mock_fallbacks,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub scope: &'static str,
    pub elapsed_secs: f64,
    pub ticks: u64,
    pub published: u64,
    pub skipped: u64,
    pub publish_failed: u64,
    pub mock_fallbacks: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            scope = %self.scope,
            elapsed_secs = %format!("{:.0}", self.elapsed_secs),
            ticks = %self.ticks,
            published = %self.published,
            skipped = %self.skipped,
            publish_failed = %self.publish_failed,
            mock_fallbacks = %self.mock_fallbacks,
            "metrics"
        );
    }
}

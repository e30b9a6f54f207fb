// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Statistics block shared by every log worker, the RPS sampler and the
//! process collector.
//!
//! Each group of fields has its own synchronisation so the per-event path
//! never contends with the once-per-second sampler:
//!
//! | field set | protected by |
//! |---|---|
//! | `total_requests_served`, drop counters | lock-free atomics |
//! | min/max request size | `request_sizes` mutex (increment lock) |
//! | previous total, requests per second | `rps` mutex (RPS lock) |
//! | CPU usage, load, memory | `process` mutex |

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Observed range of event sizes. `None` until the first observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeRange {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl SizeRange {
    /// Widens the range to include `len`. The first observation seeds both ends.
    pub fn observe(&mut self, len: usize) {
        self.min = Some(self.min.map_or(len, |min| min.min(len)));
        self.max = Some(self.max.map_or(len, |max| max.max(len)));
    }

    /// Widens the range to include another range
    pub fn merge(&mut self, other: &SizeRange) {
        if let Some(min) = other.min {
            self.observe(min);
        }
        if let Some(max) = other.max {
            self.observe(max);
        }
    }
}

#[derive(Debug, Default)]
struct RpsWindow {
    prev_requests_served: u64,
    rps: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessGauges {
    /// Process CPU usage over the last collection interval, in percent of one core
    pub cpu_usage_percentage: f64,
    /// 1-minute system load average
    pub current_load: f64,
    /// Resident memory of the process in bytes
    pub mem_usage_bytes: u64,
}

/// Point-in-time copy of the statistics block, serialised for reporting
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    #[serde(skip)]
    pub process_start_time: u64,
    #[serde(rename = "current_uptime_seconds")]
    pub uptime_seconds: u64,
    pub total_requests_served: u64,
    #[serde(rename = "num_log_workers")]
    pub num_workers: usize,
    #[serde(rename = "curr_cpu_load")]
    pub current_load: f64,
    #[serde(rename = "curr_process_mem_usage")]
    pub mem_usage_bytes: u64,
    #[serde(rename = "max_request_size")]
    pub max_request_size: usize,
    #[serde(rename = "min_request_size")]
    pub min_request_size: usize,
    pub rps: u64,
    #[serde(rename = "cpu_usage")]
    pub cpu_usage_percentage: f64,
    pub events_dropped_overload: u64,
    pub events_dropped_oversized: u64,
    pub metrics_connection_failed: bool,
}

impl StatsSnapshot {
    /// JSON document served to external stats readers
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug)]
pub struct Stats {
    process_start_time: u64,
    started: Instant,
    num_workers: usize,
    total_requests_served: AtomicU64,
    events_dropped_overload: AtomicU64,
    events_dropped_oversized: AtomicU64,
    metrics_connection_failed: AtomicBool,
    request_sizes: Mutex<SizeRange>,
    rps: Mutex<RpsWindow>,
    process: Mutex<ProcessGauges>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // The guarded values are plain counters, still consistent after a panic elsewhere
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Stats {
    pub fn new(num_workers: usize) -> Self {
        let process_start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self {
            process_start_time,
            started: Instant::now(),
            num_workers,
            total_requests_served: AtomicU64::new(0),
            events_dropped_overload: AtomicU64::new(0),
            events_dropped_oversized: AtomicU64::new(0),
            metrics_connection_failed: AtomicBool::new(false),
            request_sizes: Mutex::new(SizeRange::default()),
            rps: Mutex::new(RpsWindow::default()),
            process: Mutex::new(ProcessGauges::default()),
        }
    }

    /// Counts one accepted event and widens the global size range with the
    /// worker's local one. Serialised against other workers' widening.
    pub fn record_request(&self, worker_sizes: &SizeRange) {
        let mut sizes = lock(&self.request_sizes);
        self.total_requests_served.fetch_add(1, Ordering::Relaxed);
        sizes.merge(worker_sizes);
    }

    pub fn record_overload_drop(&self) {
        self.events_dropped_overload.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_oversized_drop(&self) {
        self.events_dropped_oversized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_metrics_connection_failed(&self, failed: bool) {
        self.metrics_connection_failed
            .store(failed, Ordering::Relaxed);
    }

    pub fn metrics_connection_failed(&self) -> bool {
        self.metrics_connection_failed.load(Ordering::Relaxed)
    }

    pub fn total_requests_served(&self) -> u64 {
        self.total_requests_served.load(Ordering::Relaxed)
    }

    pub fn request_sizes(&self) -> SizeRange {
        *lock(&self.request_sizes)
    }

    /// Starts an RPS window: remembers the current total as the previous one
    pub fn begin_rps_window(&self) {
        let mut window = lock(&self.rps);
        window.prev_requests_served = self.total_requests_served();
    }

    /// Closes the RPS window opened by [`Stats::begin_rps_window`] and returns
    /// the number of requests served since then
    pub fn end_rps_window(&self) -> u64 {
        let mut window = lock(&self.rps);
        window.rps = self
            .total_requests_served()
            .saturating_sub(window.prev_requests_served);
        window.rps
    }

    pub fn rps(&self) -> u64 {
        lock(&self.rps).rps
    }

    pub fn update_process_gauges(&self, gauges: ProcessGauges) {
        *lock(&self.process) = gauges;
    }

    pub fn process_gauges(&self) -> ProcessGauges {
        *lock(&self.process)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let sizes = self.request_sizes();
        let process = self.process_gauges();

        StatsSnapshot {
            process_start_time: self.process_start_time,
            uptime_seconds: self.started.elapsed().as_secs(),
            total_requests_served: self.total_requests_served(),
            num_workers: self.num_workers,
            current_load: process.current_load,
            mem_usage_bytes: process.mem_usage_bytes,
            max_request_size: sizes.max.unwrap_or_default(),
            min_request_size: sizes.min.unwrap_or_default(),
            rps: self.rps(),
            cpu_usage_percentage: process.cpu_usage_percentage,
            events_dropped_overload: self.events_dropped_overload.load(Ordering::Relaxed),
            events_dropped_oversized: self.events_dropped_oversized.load(Ordering::Relaxed),
            metrics_connection_failed: self.metrics_connection_failed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    fn range_of(lengths: &[usize]) -> SizeRange {
        let mut range = SizeRange::default();
        for len in lengths {
            range.observe(*len);
        }
        range
    }

    #[test]
    fn test_first_observation_seeds_both_ends() {
        let range = range_of(&[42]);
        assert_eq!(range.min, Some(42));
        assert_eq!(range.max, Some(42));
    }

    #[test]
    fn test_range_only_widens() {
        let mut range = range_of(&[10, 20]);
        range.observe(15);
        assert_eq!(range, range_of(&[10, 20]));
        range.observe(5);
        range.observe(30);
        assert_eq!(range.min, Some(5));
        assert_eq!(range.max, Some(30));
    }

    #[test]
    fn test_merge_empty_range_is_noop() {
        let mut range = range_of(&[7]);
        range.merge(&SizeRange::default());
        assert_eq!(range, range_of(&[7]));
    }

    #[test]
    fn test_rps_window() {
        let stats = Stats::new(1);
        let sizes = range_of(&[1]);

        stats.record_request(&sizes);
        stats.begin_rps_window();
        for _ in 0..5 {
            stats.record_request(&sizes);
        }
        assert_eq!(stats.end_rps_window(), 5);
        assert_eq!(stats.rps(), 5);

        stats.begin_rps_window();
        assert_eq!(stats.end_rps_window(), 0);
    }

    #[test]
    fn test_snapshot_serializes_with_report_names() {
        let stats = Stats::new(3);
        stats.record_request(&range_of(&[12, 80]));
        stats.record_overload_drop();
        stats.update_process_gauges(ProcessGauges {
            cpu_usage_percentage: 12.5,
            current_load: 0.75,
            mem_usage_bytes: 4096,
        });

        let json = serde_json::to_value(stats.snapshot()).expect("serialize snapshot");

        assert_eq!(json["total_requests_served"], 1);
        assert_eq!(json["num_log_workers"], 3);
        assert_eq!(json["min_request_size"], 12);
        assert_eq!(json["max_request_size"], 80);
        assert_eq!(json["curr_process_mem_usage"], 4096);
        assert_eq!(json["cpu_usage"], 12.5);
        assert_eq!(json["events_dropped_overload"], 1);
        assert!(json.get("process_start_time").is_none());
    }

    #[test]
    fn test_snapshot_to_json() {
        let stats = Stats::new(1);
        let json = stats.snapshot().to_json().unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"current_uptime_seconds\":"));
        assert!(json.contains("\"metrics_connection_failed\":false"));
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let stats = Arc::new(Stats::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    let sizes = range_of(&[i + 1]);
                    for _ in 0..1_000 {
                        stats.record_request(&sizes);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.total_requests_served(), 8_000);
        assert_eq!(stats.request_sizes(), range_of(&[1, 8]));
    }

    proptest! {
        #[test]
        fn prop_merged_ranges_match_global_extremes(
            lengths in proptest::collection::vec(1usize..4096, 1..64),
            workers in 1usize..6,
        ) {
            let stats = Stats::new(workers);
            let mut locals = vec![SizeRange::default(); workers];
            for (i, len) in lengths.iter().enumerate() {
                let local = &mut locals[i % workers];
                local.observe(*len);
                stats.record_request(local);
            }

            let sizes = stats.request_sizes();
            prop_assert_eq!(sizes.min, lengths.iter().copied().min());
            prop_assert_eq!(sizes.max, lengths.iter().copied().max());
            prop_assert_eq!(stats.total_requests_served(), lengths.len() as u64);
        }
    }
}

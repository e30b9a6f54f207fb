// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic publication of process gauges into the statistics block.
//!
//! CPU usage is the CPU time consumed between two collections divided by the
//! wall time between them, in percent of one core, capped at the number of
//! logical CPUs. The first collection only records a baseline.

use crate::reader::ProcessStatsReader;
use logworker::stats::{ProcessGauges, Stats};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ProcessCollector {
    reader: Box<dyn ProcessStatsReader>,
    stats: Arc<Stats>,
    collection_interval: Duration,
    cpu_count: usize,
    last_cpu: Option<(Duration, Instant)>,
}

impl ProcessCollector {
    pub fn new(
        reader: Box<dyn ProcessStatsReader>,
        stats: Arc<Stats>,
        collection_interval: Duration,
    ) -> Self {
        Self {
            reader,
            stats,
            collection_interval,
            cpu_count: num_cpus::get().max(1),
            last_cpu: None,
        }
    }

    /// Reads the process once and publishes what it got. Gauges without a
    /// reading keep their previous value.
    pub fn collect(&mut self, now: Instant) -> ProcessGauges {
        let sample = self.reader.read();
        let mut gauges = self.stats.process_gauges();

        match sample.cpu_time {
            Some(cpu_time) => {
                if let Some(usage) = self.cpu_usage(cpu_time, now) {
                    gauges.cpu_usage_percentage = usage;
                }
                self.last_cpu = Some((cpu_time, now));
            }
            None => debug!("Skipping CPU usage, no CPU time available"),
        }

        match sample.resident_bytes {
            Some(bytes) => gauges.mem_usage_bytes = bytes,
            None => debug!("Skipping memory usage, no resident size available"),
        }

        match sample.load_average {
            Some(load) => gauges.current_load = load,
            None => debug!("Skipping load, no load average available"),
        }

        debug!(
            "Process gauges: cpu {:.2}%, memory {} bytes, load {:.2}",
            gauges.cpu_usage_percentage, gauges.mem_usage_bytes, gauges.current_load
        );
        self.stats.update_process_gauges(gauges);
        gauges
    }

    fn cpu_usage(&self, cpu_time: Duration, now: Instant) -> Option<f64> {
        let (last_cpu_time, last_at) = self.last_cpu?;
        let wall = now.saturating_duration_since(last_at).as_secs_f64();
        if wall <= 0.0 {
            return None;
        }

        let used = cpu_time.saturating_sub(last_cpu_time).as_secs_f64();
        let usage = 100.0 * used / wall;
        Some(usage.clamp(0.0, 100.0 * self.cpu_count as f64))
    }

    /// Collects every interval until cancelled
    pub async fn run(mut self, cancel_token: CancellationToken) {
        let mut ticker = interval(self.collection_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.collect(Instant::now());
                }
                _ = cancel_token.cancelled() => break,
            }
        }
        debug!("Process collector stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ProcessSample;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedReader {
        samples: Arc<Mutex<VecDeque<ProcessSample>>>,
    }

    impl ProcessStatsReader for ScriptedReader {
        fn read(&self) -> ProcessSample {
            self.samples
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default()
        }
    }

    fn sample(cpu_ms: u64, resident_bytes: u64, load: f64) -> ProcessSample {
        ProcessSample {
            cpu_time: Some(Duration::from_millis(cpu_ms)),
            resident_bytes: Some(resident_bytes),
            load_average: Some(load),
        }
    }

    fn collector(samples: Vec<ProcessSample>) -> (ProcessCollector, Arc<Stats>) {
        let stats = Arc::new(Stats::new(1));
        let reader = ScriptedReader {
            samples: Arc::new(Mutex::new(samples.into())),
        };
        let collector =
            ProcessCollector::new(Box::new(reader), Arc::clone(&stats), Duration::from_secs(10));
        (collector, stats)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_collection_is_baseline() {
        let (mut collector, stats) = collector(vec![sample(1_000, 4096, 0.5)]);

        let gauges = collector.collect(Instant::now());

        assert_eq!(gauges.cpu_usage_percentage, 0.0);
        assert_eq!(gauges.mem_usage_bytes, 4096);
        assert_eq!(gauges.current_load, 0.5);
        assert_eq!(stats.process_gauges(), gauges);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_usage_from_delta() {
        let (mut collector, stats) =
            collector(vec![sample(1_000, 4096, 0.5), sample(3_500, 8192, 0.7)]);

        let start = Instant::now();
        collector.collect(start);
        let gauges = collector.collect(start + Duration::from_secs(10));

        // 2.5s of CPU over 10s of wall time
        assert!((gauges.cpu_usage_percentage - 25.0).abs() < 1e-9);
        assert_eq!(gauges.mem_usage_bytes, 8192);

        let snapshot = stats.snapshot();
        assert!((snapshot.cpu_usage_percentage - 25.0).abs() < 1e-9);
        assert_eq!(snapshot.mem_usage_bytes, 8192);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_usage_is_capped_at_cpu_count() {
        let (mut collector, _stats) =
            collector(vec![sample(0, 1, 0.0), sample(1_000_000, 1, 0.0)]);

        let start = Instant::now();
        collector.collect(start);
        let gauges = collector.collect(start + Duration::from_secs(1));

        assert_eq!(
            gauges.cpu_usage_percentage,
            100.0 * num_cpus::get().max(1) as f64
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_readings_keep_previous_values() {
        let (mut collector, _stats) =
            collector(vec![sample(1_000, 4096, 0.5), ProcessSample::default()]);

        let start = Instant::now();
        collector.collect(start);
        let gauges = collector.collect(start + Duration::from_secs(10));

        assert_eq!(gauges.mem_usage_bytes, 4096);
        assert_eq!(gauges.current_load, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_collects_every_interval() {
        let samples = Arc::new(Mutex::new(VecDeque::from(vec![
            sample(0, 100, 0.1),
            sample(1_000, 200, 0.2),
            sample(2_000, 300, 0.3),
        ])));
        let stats = Arc::new(Stats::new(1));
        let reader = ScriptedReader {
            samples: Arc::clone(&samples),
        };
        let collector =
            ProcessCollector::new(Box::new(reader), Arc::clone(&stats), Duration::from_secs(10));

        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(collector.run(cancel_token.clone()));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel_token.cancel();
        task.await.unwrap();

        assert!(samples.lock().unwrap().is_empty());
        let gauges = stats.process_gauges();
        assert_eq!(gauges.mem_usage_bytes, 300);
        assert!((gauges.cpu_usage_percentage - 10.0).abs() < 1e-6);
    }
}

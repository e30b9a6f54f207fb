// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Once-per-period requests-per-second sampling, with optional export of the
//! statistics block to Graphite.

use crate::graphite::{GraphiteClient, MetricSample};
use crate::stats::{Stats, StatsSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub const RPS_PERIOD: Duration = Duration::from_secs(1);

pub struct RpsSampler {
    stats: Arc<Stats>,
    period: Duration,
    graphite: Option<GraphiteClient>,
}

impl RpsSampler {
    pub fn new(stats: Arc<Stats>, period: Duration) -> Self {
        Self {
            stats,
            period,
            graphite: None,
        }
    }

    /// Enables export to Graphite. A failed connection is recorded in the
    /// statistics block and leaves export disabled.
    pub async fn with_graphite(mut self, host: &str, port: u16, prefix: &str) -> Self {
        debug!("Graphite enabled");
        match GraphiteClient::connect(host, port, prefix).await {
            Ok(client) => {
                self.stats.set_metrics_connection_failed(false);
                self.graphite = Some(client);
            }
            Err(e) => {
                warn!("{}. Metrics export disabled", e);
                self.stats.set_metrics_connection_failed(true);
            }
        }
        self
    }

    pub fn exports(&self) -> bool {
        self.graphite.is_some()
    }

    /// Samples until cancelled
    pub async fn run(mut self, cancel_token: CancellationToken) {
        debug!("RPS sampler started");
        loop {
            self.stats.begin_rps_window();
            tokio::select! {
                _ = tokio::time::sleep(self.period) => {}
                _ = cancel_token.cancelled() => break,
            }
            let rps = self.stats.end_rps_window();
            debug!("Requests per second: {}", rps);
            self.export().await;
        }
        debug!("RPS sampler stopped");
    }

    async fn export(&mut self) {
        let Some(client) = self.graphite.as_mut() else {
            return;
        };

        let samples = samples_from(&self.stats.snapshot());
        if let Err(e) = client.send(&samples).await {
            error!("Failed to send metrics to {}: {}", client.address(), e);
        }
    }
}

/// Gauges pushed to the metrics collector on every sample
pub fn samples_from(snapshot: &StatsSnapshot) -> Vec<MetricSample> {
    vec![
        MetricSample::new("rps", snapshot.rps as f64),
        MetricSample::new(
            "total_requests_served",
            snapshot.total_requests_served as f64,
        ),
        MetricSample::new("min_request_size", snapshot.min_request_size as f64),
        MetricSample::new("max_request_size", snapshot.max_request_size as f64),
        MetricSample::new("cpu_usage", snapshot.cpu_usage_percentage),
        MetricSample::new("mem_usage", snapshot.mem_usage_bytes as f64),
        MetricSample::new(
            "events_dropped_overload",
            snapshot.events_dropped_overload as f64,
        ),
        MetricSample::new(
            "events_dropped_oversized",
            snapshot.events_dropped_oversized as f64,
        ),
    ]
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal Graphite plaintext client.
//!
//! Each sample is one line: `<prefix>.<name> <value> <unix seconds>\n`.
//! A broken connection is dropped and re-established on the next send.

use crate::errors::MetricsError;
use std::future::Future;
use std::io;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounds a connection attempt so an unresponsive collector cannot stall the caller
async fn connect_within<F>(
    address: &str,
    timeout: Duration,
    connect: F,
) -> Result<TcpStream, MetricsError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(MetricsError::Connect {
            address: address.to_string(),
            source,
        }),
        Err(_) => Err(MetricsError::Connect {
            address: address.to_string(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connection timed out"),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: &'static str,
    pub value: f64,
}

impl MetricSample {
    pub fn new(name: &'static str, value: impl Into<f64>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

pub struct GraphiteClient {
    address: String,
    prefix: String,
    stream: Option<TcpStream>,
}

impl GraphiteClient {
    /// Connects to the collector. The caller decides whether a failure disables export.
    pub async fn connect(
        host: &str,
        port: u16,
        prefix: impl Into<String>,
    ) -> Result<Self, MetricsError> {
        let address = format!("{}:{}", host, port);
        let stream =
            connect_within(&address, CONNECT_TIMEOUT, TcpStream::connect(&address)).await?;
        debug!("Connected to Graphite at {}", address);

        Ok(Self {
            address,
            prefix: prefix.into(),
            stream: Some(stream),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends a batch of samples stamped with the current time
    pub async fn send(&mut self, samples: &[MetricSample]) -> Result<(), MetricsError> {
        if samples.is_empty() {
            return Ok(());
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let payload = format_samples(&self.prefix, samples, timestamp);

        let mut stream = match self.stream.take() {
            Some(stream) => stream,
            None => {
                let stream = connect_within(
                    &self.address,
                    CONNECT_TIMEOUT,
                    TcpStream::connect(&self.address),
                )
                .await?;
                debug!("Reconnected to Graphite at {}", self.address);
                stream
            }
        };

        if let Err(e) = stream.write_all(payload.as_bytes()).await {
            warn!("Dropping Graphite connection to {}: {}", self.address, e);
            return Err(MetricsError::Send(e));
        }

        self.stream = Some(stream);
        Ok(())
    }
}

fn format_samples(prefix: &str, samples: &[MetricSample], timestamp: u64) -> String {
    let prefix = prefix.trim_end_matches('.');
    samples
        .iter()
        .map(|sample| {
            if prefix.is_empty() {
                format!("{} {} {}\n", sample.name, sample.value, timestamp)
            } else {
                format!("{}.{} {} {}\n", prefix, sample.name, sample.value, timestamp)
            }
        })
        .collect()
}

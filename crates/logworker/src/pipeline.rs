// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of the ingestion pipeline.
//!
//! [`Pipeline::start`] creates the shared statistics block and both queues,
//! spawns the log workers, the file writer, the RPS sampler and optionally the
//! UDP listener, and returns a [`PipelineHandle`].
//!
//! Shutdown cascades through the queues: cancelling stops the listener and
//! the sampler, dropping the last ingest handle lets the workers drain and
//! flush, and the workers dropping their hand-off senders lets the writer drain
//! and return.

use crate::config::Config;
use crate::errors::{ConfigError, PipelineError, WriterError};
use crate::listener::EventListener;
use crate::queue::{handoff_queue, ingest_queue, Event, IngestHandle, Submitted};
use crate::rotation::{DateRotation, RotationKey};
use crate::sampler::{RpsSampler, RPS_PERIOD};
use crate::stats::Stats;
use crate::worker::LogWorker;
use crate::writer::FileWriter;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct Pipeline {
    config: Config,
    rotation: Box<dyn RotationKey>,
    listen: bool,
}

impl Pipeline {
    /// Validates `config`. Log files are named after `log_file_pattern`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let rotation = Box::new(DateRotation::new(config.log_file_pattern.clone()));
        Ok(Self {
            config,
            rotation,
            listen: false,
        })
    }

    /// Replaces the date-based rotation key
    #[must_use]
    pub fn with_rotation(mut self, rotation: impl RotationKey + 'static) -> Self {
        self.rotation = Box::new(rotation);
        self
    }

    /// Also receive events as UDP datagrams on `listen_address`
    #[must_use]
    pub fn with_udp_listener(mut self) -> Self {
        self.listen = true;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Spawns every pipeline task on the current runtime.
    ///
    /// Fails only if the listener cannot bind; nothing is spawned in that case.
    pub async fn start(self) -> Result<PipelineHandle, PipelineError> {
        let Pipeline {
            config,
            rotation,
            listen,
        } = self;

        let cancel_token = CancellationToken::new();
        let stats = Arc::new(Stats::new(config.num_workers));
        let (ingest, events) = ingest_queue(
            config.ingest_queue_capacity,
            config.submit_timeout,
            Arc::clone(&stats),
        );

        let listener = if listen {
            Some(
                EventListener::bind(
                    &config.listen_address,
                    ingest.clone(),
                    cancel_token.child_token(),
                )
                .await?,
            )
        } else {
            None
        };
        let listen_address = listener.as_ref().and_then(EventListener::local_addr);

        let (handoff, entries) = handoff_queue(config.handoff_queue_capacity);
        let writer = FileWriter::new(&config.log_dir, config.force_fsync, rotation);
        let writer_task = tokio::task::spawn_blocking(move || writer.run(entries));

        let workers = (0..config.num_workers)
            .map(|id| {
                let worker = LogWorker::new(
                    id,
                    config.buffer_capacity,
                    handoff.clone(),
                    Arc::clone(&stats),
                );
                tokio::spawn(worker.run(events.clone()))
            })
            .collect();
        // Workers hold the only remaining ends
        drop(handoff);
        drop(events);

        // Connecting to Graphite happens inside the task so startup never waits on it
        let sampler = RpsSampler::new(Arc::clone(&stats), RPS_PERIOD);
        let graphite = config.enable_graphite.then(|| {
            (
                config.graphite_host.clone(),
                config.graphite_port,
                config.graphite_prefix.clone(),
            )
        });
        let sampler_token = cancel_token.child_token();
        let sampler_task = tokio::spawn(async move {
            let sampler = match graphite {
                Some((host, port, prefix)) => sampler.with_graphite(&host, port, &prefix).await,
                None => sampler,
            };
            sampler.run(sampler_token).await;
        });

        let listener_task = listener.map(|listener| tokio::spawn(listener.spin()));

        info!(
            "Pipeline started with {} workers of {} bytes, writing to {}",
            config.num_workers,
            config.buffer_capacity,
            config.log_dir.display()
        );

        Ok(PipelineHandle {
            ingest,
            stats,
            cancel_token,
            listen_address,
            workers,
            writer: Some(writer_task),
            sampler: sampler_task,
            listener: listener_task,
        })
    }
}

pub struct PipelineHandle {
    ingest: IngestHandle,
    stats: Arc<Stats>,
    cancel_token: CancellationToken,
    listen_address: Option<SocketAddr>,
    workers: Vec<JoinHandle<()>>,
    writer: Option<JoinHandle<Result<(), WriterError>>>,
    sampler: JoinHandle<()>,
    listener: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Submits one event, waiting at most the submit timeout on a full queue.
    pub async fn submit(&self, event: impl Into<Event>) -> Submitted {
        self.ingest.submit(event.into()).await
    }

    /// Producer handle for other tasks. Workers only stop once every clone is dropped.
    pub fn ingest_handle(&self) -> IngestHandle {
        self.ingest.clone()
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    /// Token cancelled on shutdown, for tasks that should stop with the pipeline
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    /// Address of the UDP listener, if one was started
    pub fn listen_address(&self) -> Option<SocketAddr> {
        self.listen_address
    }

    /// Resolves when the file writer stops. While the pipeline is running
    /// this only happens when a log file could not be created.
    ///
    /// Cancel safe.
    pub async fn wait_for_failure(&mut self) -> Result<(), PipelineError> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        let result = writer.await;
        self.writer = None;
        flatten(result)
    }

    /// Stops producers, lets workers flush their buffers, and waits for the
    /// writer to drain the hand-off queue.
    pub async fn shutdown(self) -> Result<(), PipelineError> {
        let PipelineHandle {
            ingest,
            cancel_token,
            workers,
            writer,
            sampler,
            listener,
            ..
        } = self;

        debug!("Shutting down pipeline");
        cancel_token.cancel();

        if let Some(listener) = listener {
            if let Err(e) = listener.await {
                error!("Event listener task failed: {}", e);
            }
        }
        drop(ingest);

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Log worker task failed: {}", e);
            }
        }

        if let Err(e) = sampler.await {
            error!("RPS sampler task failed: {}", e);
        }

        let result = match writer {
            Some(writer) => flatten(writer.await),
            None => Ok(()),
        };
        info!("Pipeline stopped");
        result
    }
}

fn flatten(
    result: Result<Result<(), WriterError>, tokio::task::JoinError>,
) -> Result<(), PipelineError> {
    match result {
        Ok(result) => result.map_err(PipelineError::from),
        Err(e) => Err(WriterError::Task(e.to_string()).into()),
    }
}

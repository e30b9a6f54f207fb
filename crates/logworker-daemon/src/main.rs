// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;
use tokio::signal;
use tracing::{debug, error, info};

use logworker::{config::Config, logger, Pipeline};
use process_collector::ProcessCollector;

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("logworker-daemon: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logger::init(config.effective_log_level()) {
        eprintln!("logworker-daemon: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    let stats_interval = config.stats_interval;
    let pipeline = match Pipeline::new(config) {
        Ok(pipeline) => pipeline.with_udp_listener(),
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut handle = match pipeline.start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Could not start pipeline: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(address) = handle.listen_address() {
        info!("Listening for events on {}", address);
    }

    let collector = ProcessCollector::new(
        process_collector::default_reader(),
        handle.stats(),
        stats_interval,
    );
    let collector_task = tokio::spawn(collector.run(handle.cancel_token()));

    let failure = tokio::select! {
        _ = signal::ctrl_c() => None,
        result = handle.wait_for_failure() => Some(result),
    };

    match failure {
        None => {
            info!("Received interrupt, shutting down");
            let stats = handle.stats();
            let result = handle.shutdown().await;
            match stats.snapshot().to_json() {
                Ok(json) => info!("Final statistics: {}", json),
                Err(e) => error!("Could not serialize statistics: {}", e),
            }
            if let Err(e) = collector_task.await {
                error!("Process collector task failed: {}", e);
            }
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!("Pipeline stopped with an error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Some(result) => {
            match result {
                Err(e) => error!("Shutting down: {}", e),
                Ok(()) => error!("File writer stopped unexpectedly"),
            }
            ExitCode::FAILURE
        }
    }
}

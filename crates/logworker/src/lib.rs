// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Local log-ingestion pipeline.
//!
//! Events arrive from a producer, are accumulated by a pool of log workers into
//! fixed-capacity buffers, and full buffers are handed to a single file writer
//! that appends them to a rotating log file.
//!
//! ```text
//!   producer ──> ingest queue ──> LogWorker x N ──> hand-off queue ──> FileWriter ──> disk
//!                                     │
//!                                     v
//!                                   Stats <── RpsSampler ──> Graphite
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod errors;
pub mod graphite;
pub mod listener;
pub mod logger;
pub mod pipeline;
pub mod queue;
pub mod rotation;
pub mod sampler;
pub mod stats;
pub mod worker;
pub mod writer;

pub use pipeline::{Pipeline, PipelineHandle};

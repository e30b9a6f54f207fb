// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process CPU, memory and load gauges for the logworker statistics block.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod collector;
pub mod reader;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod unsupported;

pub use collector::ProcessCollector;
pub use reader::{ProcessSample, ProcessStatsReader};

/// Reader for the current platform
pub fn default_reader() -> Box<dyn ProcessStatsReader> {
    #[cfg(target_os = "linux")]
    {
        Box::new(linux::LinuxProcessStatsReader::new())
    }
    #[cfg(not(target_os = "linux"))]
    {
        Box::new(unsupported::UnsupportedStatsReader)
    }
}

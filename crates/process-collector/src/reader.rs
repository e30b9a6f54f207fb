// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Raw readings for the current process. `None` where the platform gave no data.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessSample {
    /// User plus system CPU time consumed since the process started
    pub cpu_time: Option<Duration>,
    /// Resident set size in bytes
    pub resident_bytes: Option<u64>,
    /// 1-minute system load average
    pub load_average: Option<f64>,
}

pub trait ProcessStatsReader: Send {
    fn read(&self) -> ProcessSample;
}

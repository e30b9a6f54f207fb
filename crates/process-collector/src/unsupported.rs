// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::reader::{ProcessSample, ProcessStatsReader};
use tracing::debug;

pub struct UnsupportedStatsReader;

impl ProcessStatsReader for UnsupportedStatsReader {
    fn read(&self) -> ProcessSample {
        debug!("Process stats are not available on this platform");
        ProcessSample::default()
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Readings from the `/proc` filesystem.
//!
//! - `/proc/self/stat`: fields 14 and 15 are user and system CPU time in clock
//!   ticks. Field 2 is the executable name in parentheses and may itself
//!   contain spaces, so fields are counted from the last `)`.
//! - `/proc/self/statm`: field 2 is the resident set size in pages.
//! - `/proc/loadavg`: field 1 is the 1-minute load average.

use crate::reader::{ProcessSample, ProcessStatsReader};
use nix::unistd::{sysconf, SysconfVar};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const PROC_SELF_STAT_PATH: &str = "/proc/self/stat";
const PROC_SELF_STATM_PATH: &str = "/proc/self/statm";
const PROC_LOADAVG_PATH: &str = "/proc/loadavg";

// Offsets of utime and stime counted from the field after the executable name
const UTIME_OFFSET: usize = 11;
const STIME_OFFSET: usize = 12;

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

#[allow(clippy::cast_sign_loss)]
fn sysconf_positive(var: SysconfVar, name: &str) -> Result<u64, io::Error> {
    match sysconf(var) {
        Ok(Some(value)) if value > 0 => Ok(value as u64),
        _ => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Could not find system {name}"),
        )),
    }
}

/// Clock ticks per second used by `/proc/<pid>/stat`
pub fn get_clk_tck() -> Result<u64, io::Error> {
    sysconf_positive(SysconfVar::CLK_TCK, "clock ticks per second")
}

pub fn get_page_size() -> Result<u64, io::Error> {
    sysconf_positive(SysconfVar::PAGE_SIZE, "page size")
}

/// Reads user plus system CPU time of a process from a `stat` file
pub fn read_cpu_time_from_path(path: &Path, clk_tck: u64) -> Result<Duration, io::Error> {
    let contents = fs::read_to_string(path)?;
    let after_comm = contents
        .rfind(')')
        .map(|index| &contents[index + 1..])
        .ok_or_else(|| invalid_data(format!("No executable name in {}", path.display())))?;

    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    let parse_field = |offset: usize| -> Result<u64, io::Error> {
        fields
            .get(offset)
            .ok_or_else(|| invalid_data(format!("{} has too few fields", path.display())))?
            .parse::<u64>()
            .map_err(|e| invalid_data(format!("Failed to parse CPU ticks: {e}")))
    };

    let ticks = parse_field(UTIME_OFFSET)? + parse_field(STIME_OFFSET)?;
    if clk_tck == 0 {
        return Err(invalid_data("Clock ticks per second is 0".to_string()));
    }
    Ok(Duration::from_secs(ticks / clk_tck)
        + Duration::from_nanos((ticks % clk_tck) * 1_000_000_000 / clk_tck))
}

/// Reads the resident set size in bytes from a `statm` file
pub fn read_resident_bytes_from_path(path: &Path, page_size: u64) -> Result<u64, io::Error> {
    let contents = fs::read_to_string(path)?;
    let pages = contents
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| invalid_data(format!("{} has too few fields", path.display())))?
        .parse::<u64>()
        .map_err(|e| invalid_data(format!("Failed to parse resident pages: {e}")))?;
    Ok(pages * page_size)
}

/// Reads the 1-minute load average from a `loadavg` file
pub fn read_load_average_from_path(path: &Path) -> Result<f64, io::Error> {
    let contents = fs::read_to_string(path)?;
    contents
        .split_whitespace()
        .next()
        .ok_or_else(|| invalid_data(format!("{} is empty", path.display())))?
        .parse::<f64>()
        .map_err(|e| invalid_data(format!("Failed to parse load average: {e}")))
}

pub struct LinuxProcessStatsReader {
    stat_path: PathBuf,
    statm_path: PathBuf,
    loadavg_path: PathBuf,
    clk_tck: Option<u64>,
    page_size: Option<u64>,
}

impl LinuxProcessStatsReader {
    pub fn new() -> Self {
        Self::with_paths(PROC_SELF_STAT_PATH, PROC_SELF_STATM_PATH, PROC_LOADAVG_PATH)
    }

    pub fn with_paths(
        stat_path: impl Into<PathBuf>,
        statm_path: impl Into<PathBuf>,
        loadavg_path: impl Into<PathBuf>,
    ) -> Self {
        let clk_tck = get_clk_tck()
            .map_err(|e| debug!("{}", e))
            .ok();
        let page_size = get_page_size()
            .map_err(|e| debug!("{}", e))
            .ok();

        Self {
            stat_path: stat_path.into(),
            statm_path: statm_path.into(),
            loadavg_path: loadavg_path.into(),
            clk_tck,
            page_size,
        }
    }
}

impl Default for LinuxProcessStatsReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessStatsReader for LinuxProcessStatsReader {
    fn read(&self) -> ProcessSample {
        let cpu_time = self.clk_tck.and_then(|clk_tck| {
            read_cpu_time_from_path(&self.stat_path, clk_tck)
                .map_err(|e| debug!("Could not read CPU time: {}", e))
                .ok()
        });

        let resident_bytes = self.page_size.and_then(|page_size| {
            read_resident_bytes_from_path(&self.statm_path, page_size)
                .map_err(|e| debug!("Could not read resident memory: {}", e))
                .ok()
        });

        let load_average = read_load_average_from_path(&self.loadavg_path)
            .map_err(|e| debug!("Could not read load average: {}", e))
            .ok();

        ProcessSample {
            cpu_time,
            resident_bytes,
            load_average,
        }
    }
}

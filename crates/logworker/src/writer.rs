// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Single consumer of the hand-off queue. Owns the active log file.
//!
//! States: no file open, or one file open. Before each entry is written the
//! writer computes the rotation key; when it differs from the name of the open
//! file, a new file `<log_dir>/<key>` is created and swapped in. Failing to
//! create a file is fatal and ends the writer with
//! [`WriterError::CreateFile`]. Write and sync failures only lose the entry.
//!
//! Two locks guard the shared state:
//! - the creation lock (`active`) protects the active file name and handle and
//!   is held across the rotation check and swap,
//! - the write lock (`write_lock`) is held across one append and its optional
//!   sync, so a sync always covers the bytes of the entry just written.
//!
//! An append takes the creation lock only long enough to clone the handle.

use crate::errors::WriterError;
use crate::queue::LogEntry;
use crate::rotation::RotationKey;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info};

#[derive(Debug)]
struct ActiveFile {
    name: String,
    handle: Arc<File>,
}

pub struct FileWriter {
    log_dir: PathBuf,
    force_fsync: bool,
    rotation: Box<dyn RotationKey>,
    active: Mutex<Option<ActiveFile>>,
    write_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FileWriter {
    pub fn new(
        log_dir: impl Into<PathBuf>,
        force_fsync: bool,
        rotation: Box<dyn RotationKey>,
    ) -> Self {
        Self {
            log_dir: log_dir.into(),
            force_fsync,
            rotation,
            active: Mutex::new(None),
            write_lock: Mutex::new(()),
        }
    }

    /// Name of the active file, if one is open
    pub fn current_file(&self) -> Option<String> {
        lock(&self.active).as_ref().map(|active| active.name.clone())
    }

    /// Opens a new file if the rotation key moved away from the active one.
    ///
    /// Returns the name of the active file.
    pub fn rotate_if_needed(&self) -> Result<String, WriterError> {
        let key = self.rotation.current_key();
        let mut active = lock(&self.active);

        if let Some(current) = active.as_ref() {
            if current.name == key {
                return Ok(key);
            }
        }

        let path = self.log_dir.join(&key);
        debug!("Opening new log file {}", path.display());
        let handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| {
                error!("Could not open new log file {}: {}", path.display(), source);
                WriterError::CreateFile {
                    path: path.clone(),
                    source,
                }
            })?;

        if let Some(previous) = active.replace(ActiveFile {
            name: key.clone(),
            handle: Arc::new(handle),
        }) {
            info!("Rotated log file from {} to {}", previous.name, key);
        }

        Ok(key)
    }

    /// Appends one entry to the active file, syncing it when forced sync is on.
    pub fn append(&self, entry: &LogEntry) -> Result<usize, WriterError> {
        let current = lock(&self.active)
            .as_ref()
            .map(|active| (active.name.clone(), Arc::clone(&active.handle)));
        let (name, handle) = match current {
            Some(current) => current,
            None => {
                self.rotate_if_needed()?;
                return self.append(entry);
            }
        };

        let _guard = lock(&self.write_lock);

        (&*handle)
            .write_all(entry)
            .map_err(|source| WriterError::Write {
                file: name.clone(),
                source,
            })?;
        debug!("Wrote {} bytes to {}", entry.len(), name);

        if self.force_fsync {
            handle
                .sync_all()
                .map_err(|source| WriterError::Sync { file: name, source })?;
        }

        Ok(entry.len())
    }

    /// Writes entries until every worker has dropped its sender.
    ///
    /// Blocking: run it on a dedicated thread or through `spawn_blocking`.
    /// Entries that cannot be written are logged and skipped; only a failure
    /// to create a log file ends the loop with an error.
    pub fn run(self, entries: flume::Receiver<LogEntry>) -> Result<(), WriterError> {
        debug!("File writer started in {}", self.log_dir.display());
        self.rotate_if_needed()?;

        while let Ok(entry) = entries.recv() {
            self.rotate_if_needed()?;

            match self.append(&entry) {
                Ok(_) => {}
                Err(e @ WriterError::CreateFile { .. }) => return Err(e),
                Err(e) => error!("{}", e),
            }
        }

        debug!("File writer stopped, hand-off queue closed");
        Ok(())
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Invalid values in the pipeline configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not parse {name}={value}: {reason}")]
    Env {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors raised by the file writer.
///
/// Only [`WriterError::CreateFile`] escapes the writer loop; write and sync
/// failures are logged and the entry is skipped.
#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("Could not create log file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Write to {file} failed: {source}")]
    Write {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Sync of {file} failed: {source}")]
    Sync {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File writer task failed: {0}")]
    Task(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Could not connect to metrics collector at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not send metrics: {0}")]
    Send(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Could not bind event listener to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not receive event: {0}")]
    Receive(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("Could not parse log filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    #[error("Could not install global subscriber: {0}")]
    Install(String),
}

/// Errors surfaced by the pipeline to whoever supervises the process
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error(transparent)]
    Listener(#[from] ListenerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Invalid("num_workers must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: num_workers must be greater than 0"
        );
    }

    #[test]
    fn test_create_file_error_keeps_path() {
        let error = WriterError::CreateFile {
            path: PathBuf::from("/nonexistent/2024-01-01.log"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(error.to_string().contains("/nonexistent/2024-01-01.log"));
    }

    #[test]
    fn test_pipeline_error_from_writer() {
        let error: PipelineError = WriterError::Task("cancelled".to_string()).into();
        assert_eq!(error.to_string(), "File writer task failed: cancelled");
    }
}

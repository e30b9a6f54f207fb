// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Rotation keys decide which file under the log directory is active. The
//! writer opens a new file whenever the key it computes differs from the one
//! of the file it holds.

use crate::errors::ConfigError;
use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use std::fmt::Write;
use tracing::error;

/// Rejects patterns chrono cannot format, such as unknown `%` specifiers
pub fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Invalid(format!(
            "Invalid log_file_pattern '{}'",
            pattern
        )));
    }
    Ok(())
}

pub trait RotationKey: Send + Sync {
    /// File name, relative to the log directory, that should be active now
    fn current_key(&self) -> String;
}

impl<F> RotationKey for F
where
    F: Fn() -> String + Send + Sync,
{
    fn current_key(&self) -> String {
        self()
    }
}

/// Names files after the local date and time formatted with a chrono pattern,
/// e.g. `%Y-%m-%d.log` for one file per day
#[derive(Debug, Clone)]
pub struct DateRotation {
    pattern: String,
}

impl DateRotation {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }
}

impl RotationKey for DateRotation {
    fn current_key(&self) -> String {
        let mut key = String::new();
        if write!(key, "{}", Local::now().format(&self.pattern)).is_err() {
            error!("Could not format log file pattern '{}'", self.pattern);
            return self.pattern.clone();
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_pattern() {
        let rotation = DateRotation::new("%Y-%m-%d.log");
        let key = rotation.current_key();
        assert_eq!(key, Local::now().format("%Y-%m-%d.log").to_string());
        assert!(key.ends_with(".log"));
    }

    #[test]
    fn test_static_pattern_never_rotates() {
        let rotation = DateRotation::new("events.log");
        assert_eq!(rotation.current_key(), "events.log");
        assert_eq!(rotation.current_key(), rotation.current_key());
    }

    #[test]
    fn test_validate_pattern() {
        assert!(validate_pattern("%Y-%m-%d.log").is_ok());
        assert!(validate_pattern("events-%H%M.log").is_ok());
        assert!(matches!(
            validate_pattern("%Q.log"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_falls_back_to_pattern() {
        let rotation = DateRotation::new("%Q.log");
        assert_eq!(rotation.current_key(), "%Q.log");
    }

    #[test]
    fn test_closure_rotation() {
        let rotation = || "fixed.log".to_string();
        assert_eq!(RotationKey::current_key(&rotation), "fixed.log");
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic logging for the pipeline.
//!
//! Lines look like:
//! ```text
//! LOGWORKER | DEBUG | Worker 2: dumping buffer to file
//! LOGWORKER | WARN | writer{dir=/var/log/app}: Rotated log file from a.log to b.log
//! ```

use crate::errors::LoggerError;
use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Formatter prefixing every line with `LOGWORKER | LEVEL |`
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOGWORKER | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Filter directive for `level`
pub fn env_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|e| LoggerError::Filter {
        filter: level.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(level: &str) -> Result<(), LoggerError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(level)?)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggerError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span, trace};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture(level: &str, f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(env_filter(level).unwrap())
            .event_format(Formatter)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, f);
        captured.contents()
    }

    #[test]
    fn test_prefix_and_level() {
        let output = capture("info", || info!("pipeline started"));
        assert_eq!(output, "LOGWORKER | INFO | pipeline started\n");
    }

    #[test]
    fn test_span_context() {
        let output = capture("info", || {
            let span = info_span!("writer", file = "a.log");
            let _enter = span.enter();
            info!("rotated");
        });
        assert_eq!(output, "LOGWORKER | INFO | writer{file=\"a.log\"}: rotated\n");
    }

    #[test]
    fn test_level_filters_events() {
        let output = capture("info", || trace!("per-event detail"));
        assert!(output.is_empty());

        let output = capture("trace", || trace!("per-event detail"));
        assert!(output.contains("TRACE | per-event detail"));
    }

    #[test]
    fn test_filter_is_only_the_requested_level() {
        assert_eq!(env_filter("debug").unwrap().to_string(), "debug");
    }

    #[test]
    fn test_invalid_filter() {
        assert!(matches!(
            env_filter("logworker=verbose"),
            Err(LoggerError::Filter { .. })
        ));
    }
}

use tracing::{field::Field, subscriber::SetGlobalDefaultError, Level, Metadata, Subscriber};
use tracing_subscriber::{
    filter::filter_fn,
    fmt::{
        self,
        format::{debug_fn, Writer},
        MakeWriter,
    },
    layer::SubscriberExt,
    Layer,
};

use crate::types::LogLevel;

/// Field that marks an `ERROR` event as fatal
pub const FATAL_FIELD: &str = "fatal";

/// Log an event at [`LogLevel::Fatal`]
///
/// Fatal events are `ERROR` events carrying a `fatal` field, so they still
/// pass any subscriber that only knows tracing's levels.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)+) => {
        ::tracing::error!(fatal = true, $($arg)+)
    };
}

impl LogLevel {
    /// Severity of a tracing callsite on the five-level scale
    #[must_use]
    pub fn of(metadata: &Metadata<'_>) -> Self {
        let level = *metadata.level();
        if level == Level::ERROR {
            if metadata.fields().field(FATAL_FIELD).is_some() {
                Self::Fatal
            } else {
                Self::Error
            }
        } else if level == Level::WARN {
            Self::Warning
        } else if level == Level::INFO {
            Self::Information
        } else {
            Self::Debug
        }
    }

    /// Whether a callsite is at or above this threshold
    #[must_use]
    pub fn allows(self, metadata: &Metadata<'_>) -> bool {
        Self::of(metadata) >= self
    }
}

/// Message bare, the fatal marker hidden, other fields as ` name=value`
fn write_field(
    writer: &mut Writer<'_>,
    field: &Field,
    value: &dyn std::fmt::Debug,
) -> std::fmt::Result {
    match field.name() {
        "message" => write!(writer, "{value:?}"),
        FATAL_FIELD => Ok(()),
        name => write!(writer, " {name}={value:?}"),
    }
}

/// Plain-text subscriber writing events at or above `threshold` to `writer`
///
/// Lines carry the message only: no timestamp, level or target.
pub fn subscriber<W>(threshold: LogLevel, writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(
        fmt::layer()
            .with_ansi(false)
            .without_time()
            .with_level(false)
            .with_target(false)
            .fmt_fields(debug_fn(write_field))
            .with_writer(writer)
            .with_filter(filter_fn(move |metadata| threshold.allows(metadata))),
    )
}

/// Install the console subscriber for the whole process
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(threshold: LogLevel) -> Result<(), SetGlobalDefaultError> {
    tracing::subscriber::set_global_default(subscriber(threshold, std::io::stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };
    use tracing::{debug, error, info, trace, warn};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn emit_all(threshold: LogLevel) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        tracing::subscriber::with_default(subscriber(threshold, move || writer.clone()), || {
            trace!("trace-line");
            debug!("debug-line");
            info!("info-line");
            warn!("warning-line");
            error!("error-line");
            crate::fatal!("fatal-line");
        });
        capture.contents()
    }

    fn lines(output: &str) -> Vec<&str> {
        output.lines().map(str::trim).collect()
    }

    #[test]
    fn test_lines_are_plain_messages() {
        assert_eq!(lines(&emit_all(LogLevel::Fatal)), vec!["fatal-line"]);
        assert_eq!(
            lines(&emit_all(LogLevel::Warning)),
            vec!["warning-line", "error-line", "fatal-line"]
        );
    }

    #[test]
    fn test_extra_fields_follow_message() {
        let capture = Capture::default();
        let writer = capture.clone();
        tracing::subscriber::with_default(
            subscriber(LogLevel::Debug, move || writer.clone()),
            || info!(meters = 150, "Starting workout"),
        );
        assert_eq!(lines(&capture.contents()), vec!["Starting workout meters=150"]);
    }

    #[test]
    fn test_threshold_filters_lower_levels() {
        let cases = [
            (LogLevel::Debug, "debug-line"),
            (LogLevel::Information, "info-line"),
            (LogLevel::Warning, "warning-line"),
            (LogLevel::Error, "error-line"),
            (LogLevel::Fatal, "fatal-line"),
        ];

        for (threshold, _) in cases {
            let output = emit_all(threshold);
            for (level, line) in cases {
                assert_eq!(
                    output.contains(line),
                    level >= threshold,
                    "{line} at threshold {threshold}: {output}"
                );
            }
        }
    }

    #[test]
    fn test_trace_counts_as_debug() {
        assert!(emit_all(LogLevel::Debug).contains("trace-line"));
        assert!(!emit_all(LogLevel::Information).contains("trace-line"));
    }
}

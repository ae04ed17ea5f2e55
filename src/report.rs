//! Diagnostic output for the indexer.
//!
//! All diagnostics go to stderr so that they never mix with tool output on
//! stdout. Lines are prefixed with their severity:
//!
//! ```text
//! [INFO] indexed 42 files
//! [WARNING] skipping malformed compile database entry
//! ```
//!
//! The crate logs through [`tracing`] macros everywhere; this module only
//! owns the subscriber installation and the severity formatting.

use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{
        format::{self, FormatEvent, FormatFields},
        FmtContext,
    },
    registry::LookupSpan,
};

/// Target used to tag unrecoverable failures, rendered as `[FATAL]`.
pub const FATAL_TARGET: &str = "fatal";

/// Log an unrecoverable failure and surface it at the highest severity.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        tracing::error!(target: $crate::report::FATAL_TARGET, $($arg)*)
    };
}

/// Minimum severity emitted on the diagnostic stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DiagnosticLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl DiagnosticLevel {
    fn as_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            DiagnosticLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
            DiagnosticLevel::Info => tracing::level_filters::LevelFilter::INFO,
            DiagnosticLevel::Warning => tracing::level_filters::LevelFilter::WARN,
            DiagnosticLevel::Error => tracing::level_filters::LevelFilter::ERROR,
        }
    }
}

/// Event formatter producing the `[LEVEL] message` line format.
struct SeverityFormat;

impl<S, N> FormatEvent<S, N> for SeverityFormat
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
        let meta = event.metadata();
        let prefix = if meta.target() == FATAL_TARGET {
            "[FATAL]"
        } else {
            match *meta.level() {
                Level::TRACE | Level::DEBUG => "[DEBUG]",
                Level::INFO => "[INFO]",
                Level::WARN => "[WARNING]",
                Level::ERROR => "[ERROR]",
            }
        };
        write!(writer, "{prefix} ")?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Installs the stderr diagnostic subscriber.
///
/// Call once at startup; subsequent calls are no-ops so tests that race on
/// installation stay quiet.
pub fn install(level: DiagnosticLevel) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level.as_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .event_format(SeverityFormat)
        .try_init();
}

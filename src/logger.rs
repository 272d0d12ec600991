//! Logging setup for scp-planner executables and test runs
//!
//! One call installs the global tracing subscriber with this crate's
//! bracketed line format and a default INFO level. The planners log their
//! configuration, the per-iteration statistics table and the final summary
//! at DEBUG, so most diagnostics need `RUST_LOG=debug` or
//! [`init_logger_with_level`].

use tracing::Level;

/// Initialize the tracing subscriber with scp-planner's standard configuration
///
/// Default log level: INFO (overrideable via RUST_LOG environment variable)
///
/// Format: `[LEVEL YYYY-MM-DD HH:MM:SS module]` for INFO/WARN/ERROR
///         `[LEVEL YYYY-MM-DD HH:MM:SS file:line]` for DEBUG/TRACE
///
/// # Example
/// ```no_run
/// use scp_planner::init_logger;
///
/// init_logger();
/// tracing::info!("Planner started");
/// ```
///
/// # Environment Variables
/// Override the default log level using `RUST_LOG`:
/// ```bash
/// RUST_LOG=debug cargo test
/// RUST_LOG=scp_planner=trace cargo run
/// ```
pub fn init_logger() {
    init_logger_with_level(Level::INFO)
}

/// Initialize the tracing subscriber with a custom default level
///
/// The per-iteration statistics table is emitted at DEBUG level, so pass
/// `Level::DEBUG` to see the full trust-region trace.
///
/// # Example
/// ```no_run
/// use scp_planner::init_logger_with_level;
/// use tracing::Level;
///
/// init_logger_with_level(Level::DEBUG);
/// tracing::debug!("Debug logging enabled");
/// ```
pub fn init_logger_with_level(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_level(false)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .event_format(CustomFormatter)
        .init();
}

/// Bracketed line formatter: `[LEVEL timestamp origin] message`.
///
/// The origin is the module path at INFO and above, and the source
/// `file:line` at DEBUG/TRACE, where the iteration tables come from.
struct CustomFormatter;

impl CustomFormatter {
    fn colored_level(level: Level) -> &'static str {
        match level {
            Level::ERROR => "\x1b[31mERROR\x1b[0m",
            Level::WARN => "\x1b[33mWARN\x1b[0m",
            Level::INFO => "\x1b[32mINFO\x1b[0m",
            Level::DEBUG => "\x1b[34mDEBUG\x1b[0m",
            Level::TRACE => "\x1b[35mTRACE\x1b[0m",
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for CustomFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: tracing_subscriber::fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        use chrono::Local;

        let metadata = event.metadata();
        let level = *metadata.level();

        write!(
            writer,
            "[{} {} ",
            Self::colored_level(level),
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        let verbose = level == Level::DEBUG || level == Level::TRACE;
        match (verbose, metadata.file(), metadata.line()) {
            (true, Some(file), Some(line)) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{filename}:{line}")?;
            }
            (true, Some(file), None) => {
                let filename = file.rsplit('/').next().unwrap_or(file);
                write!(writer, "{filename}:")?;
            }
            _ => write!(writer, "{}", metadata.target())?,
        }

        write!(writer, "] ")?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

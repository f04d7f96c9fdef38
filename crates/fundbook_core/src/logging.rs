//! Process-wide log sink for fundbook binaries.
//!
//! # Responsibility
//! - Route `log` records to size-rotated files under one directory.
//! - Record panics as `event=panic_captured` before the default hook runs.
//! - Give unexpected errors a correlation id that outer layers can print.
//!
//! # Invariants
//! - The sink is started at most once per process. A later call with the
//!   same level and directory is a no-op; any other call is refused.
//! - Nothing here panics; every failure comes back as a [`LoggingError`].

use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, LogSpecification, Logger, LoggerHandle,
    Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const LOG_FILE_BASENAME: &str = "fundbook";
const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;
const KEPT_LOG_FILES: usize = 5;
const PANIC_SUMMARY_CHARS: usize = 160;
const ERROR_SUMMARY_CHARS: usize = 240;

static ACTIVE_SINK: OnceCell<ActiveSink> = OnceCell::new();

struct ActiveSink {
    status: LoggingStatus,
    _handle: LoggerHandle,
}

/// Level and directory of the running log sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingStatus {
    pub level: LevelFilter,
    pub log_dir: PathBuf,
}

#[derive(Debug)]
pub enum LoggingError {
    UnknownLevel(String),
    RelativeDirectory(PathBuf),
    CreateDirectory { path: PathBuf, source: io::Error },
    Backend(FlexiLoggerError),
    AlreadyRunning {
        active: LoggingStatus,
        requested: LoggingStatus,
    },
}

impl Display for LoggingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownLevel(value) => write!(
                f,
                "unknown log level `{value}`; expected off|error|warn|info|debug|trace"
            ),
            Self::RelativeDirectory(path) => {
                write!(f, "log directory `{}` is not absolute", path.display())
            }
            Self::CreateDirectory { path, source } => {
                write!(f, "cannot create log directory `{}`: {source}", path.display())
            }
            Self::Backend(err) => write!(f, "log backend failed to start: {err}"),
            Self::AlreadyRunning { active, requested } => write!(
                f,
                "logging already runs at {} in `{}`; cannot restart at {} in `{}`",
                active.level,
                active.log_dir.display(),
                requested.level,
                requested.log_dir.display()
            ),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::CreateDirectory { source, .. } => Some(source),
            Self::Backend(err) => Some(err),
            Self::UnknownLevel(_) | Self::RelativeDirectory(_) | Self::AlreadyRunning { .. } => {
                None
            }
        }
    }
}

impl From<FlexiLoggerError> for LoggingError {
    fn from(value: FlexiLoggerError) -> Self {
        Self::Backend(value)
    }
}

/// Parses a level name such as `info` or ` WARN `.
pub fn parse_log_level(value: &str) -> Result<LevelFilter, LoggingError> {
    value
        .trim()
        .parse::<LevelFilter>()
        .map_err(|_| LoggingError::UnknownLevel(value.trim().to_string()))
}

/// `Debug` for debug builds, `Info` otherwise.
pub fn default_log_level() -> LevelFilter {
    if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Starts the file log sink and the panic hook.
///
/// # Errors
/// - `RelativeDirectory` when `log_dir` is not absolute.
/// - `CreateDirectory` or `Backend` when the sink cannot start.
/// - `AlreadyRunning` when a sink with another level or directory is active.
pub fn init_logging(
    level: LevelFilter,
    log_dir: impl AsRef<Path>,
) -> Result<LoggingStatus, LoggingError> {
    let requested = LoggingStatus {
        level,
        log_dir: log_dir.as_ref().to_path_buf(),
    };
    if !requested.log_dir.is_absolute() {
        return Err(LoggingError::RelativeDirectory(requested.log_dir));
    }

    let sink = ACTIVE_SINK.get_or_try_init(|| start_sink(&requested))?;
    if sink.status != requested {
        return Err(LoggingError::AlreadyRunning {
            active: sink.status.clone(),
            requested,
        });
    }
    Ok(sink.status.clone())
}

/// The running sink, or `None` before [`init_logging`] succeeds.
pub fn logging_status() -> Option<LoggingStatus> {
    ACTIVE_SINK.get().map(|sink| sink.status.clone())
}

fn start_sink(status: &LoggingStatus) -> Result<ActiveSink, LoggingError> {
    std::fs::create_dir_all(&status.log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: status.log_dir.clone(),
        source,
    })?;

    let spec = LogSpecification::builder().default(status.level).build();
    let handle = Logger::with(spec)
        .log_to_file(
            FileSpec::default()
                .directory(status.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(ROTATE_AT_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(KEPT_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    install_panic_hook();
    info!(
        "event=logging_start module=logging status=ok level={} log_dir={} version={}",
        status.level,
        status.log_dir.display(),
        env!("CARGO_PKG_VERSION")
    );

    Ok(ActiveSink {
        status: status.clone(),
        _handle: handle,
    })
}

/// Logs `err` with its causes and returns the correlation id of the entry.
pub fn report_error(err: &dyn Error) -> Uuid {
    let correlation_id = Uuid::new_v4();
    error!(
        "event=unexpected_error module=logging status=error correlation_id={} error=\"{}\"",
        correlation_id,
        one_line(&error_chain(err), ERROR_SUMMARY_CHARS)
    );
    correlation_id
}

fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// Runs once, from inside the sink initializer.
fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map_or_else(|| "unknown".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload=\"{}\"",
            location,
            one_line(&payload, PANIC_SUMMARY_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens `value` to one line of at most `max_chars` characters.
fn one_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut shortened: String = flattened.chars().take(max_chars).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
mod tests {
    use super::{
        error_chain, init_logging, logging_status, one_line, parse_log_level, report_error,
        LoggingError,
    };
    use log::LevelFilter;
    use std::error::Error;
    use std::fmt::{Display, Formatter};

    #[test]
    fn parse_log_level_is_case_insensitive() {
        assert_eq!(parse_log_level(" WARN ").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_log_level("trace").unwrap(), LevelFilter::Trace);
        assert!(matches!(
            parse_log_level("loud"),
            Err(LoggingError::UnknownLevel(value)) if value == "loud"
        ));
    }

    #[test]
    fn one_line_flattens_and_shortens() {
        assert_eq!(one_line("a\nb\rc", 10), "a b c");
        assert_eq!(one_line("Acme Growth Fund", 4), "Acme...");
    }

    #[derive(Debug)]
    struct Layer {
        message: &'static str,
        cause: Option<Box<Layer>>,
    }

    impl Display for Layer {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Error for Layer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
        }
    }

    #[test]
    fn error_chain_joins_sources_outermost_first() {
        let err = Layer {
            message: "creating fund: Acme",
            cause: Some(Box::new(Layer {
                message: "database is locked",
                cause: None,
            })),
        };
        assert_eq!(error_chain(&err), "creating fund: Acme: database is locked");
    }

    #[test]
    fn report_error_returns_fresh_correlation_ids() {
        let err = Layer {
            message: "boom",
            cause: None,
        };
        assert_ne!(report_error(&err), report_error(&err));
    }

    #[test]
    fn relative_directory_is_refused_before_starting() {
        assert!(matches!(
            init_logging(LevelFilter::Info, "logs/dev"),
            Err(LoggingError::RelativeDirectory(_))
        ));
    }

    #[test]
    fn sink_starts_once_and_refuses_other_settings() {
        let log_dir = tempfile::tempdir().unwrap();
        let other_dir = tempfile::tempdir().unwrap();

        let status = init_logging(LevelFilter::Info, log_dir.path()).unwrap();
        assert_eq!(status.log_dir, log_dir.path());
        assert_eq!(init_logging(LevelFilter::Info, log_dir.path()).unwrap(), status);
        assert_eq!(logging_status(), Some(status.clone()));

        let err = init_logging(LevelFilter::Debug, log_dir.path()).unwrap_err();
        assert!(matches!(err, LoggingError::AlreadyRunning { .. }));
        let err = init_logging(LevelFilter::Info, other_dir.path()).unwrap_err();
        assert!(err.to_string().contains("cannot restart"));
        assert_eq!(logging_status(), Some(status));
    }
}

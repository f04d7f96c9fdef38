//! CLI smoke entry point.
//!
//! # Responsibility
//! - Start file logging, then verify `fundbook_core` linkage.
//! - Confirm the bundled SQLite migrates a fresh fund store.
//!
//! `FUNDBOOK_LOG_DIR` (absolute) and `FUNDBOOK_LOG_LEVEL` override the log
//! defaults: `<tmp>/fundbook` and the build-mode level.

use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::process::ExitCode;

fn log_dir() -> PathBuf {
    std::env::var_os("FUNDBOOK_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("fundbook"))
}

fn log_level() -> LevelFilter {
    match std::env::var("FUNDBOOK_LOG_LEVEL") {
        Ok(value) => fundbook_core::parse_log_level(&value).unwrap_or_else(|err| {
            eprintln!("fundbook_cli log_level=default reason=\"{err}\"");
            fundbook_core::default_log_level()
        }),
        Err(_) => fundbook_core::default_log_level(),
    }
}

fn main() -> ExitCode {
    // Logging is best effort; the smoke checks still run without it.
    match fundbook_core::init_logging(log_level(), log_dir()) {
        Ok(status) => println!(
            "fundbook_core log_level={} log_dir={}",
            status.level,
            status.log_dir.display()
        ),
        Err(err) => eprintln!("fundbook_core logging=unavailable reason=\"{err}\""),
    }

    println!("fundbook_core ping={}", fundbook_core::ping());
    println!("fundbook_core version={}", fundbook_core::core_version());

    let conn = match fundbook_core::open_db_in_memory() {
        Ok(conn) => conn,
        Err(err) => {
            let correlation_id = fundbook_core::report_error(&err);
            error!("event=cli_smoke module=cli status=error correlation_id={correlation_id}");
            eprintln!("fundbook_core schema=unavailable correlation_id={correlation_id}");
            return ExitCode::FAILURE;
        }
    };

    match fundbook_core::db::migrations::current_user_version(&conn) {
        Ok(version) => {
            info!("event=cli_smoke module=cli status=ok schema_version={version}");
            println!("fundbook_core schema_version={version}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let correlation_id = fundbook_core::report_error(&err);
            eprintln!("fundbook_core schema=unavailable correlation_id={correlation_id}");
            ExitCode::FAILURE
        }
    }
}

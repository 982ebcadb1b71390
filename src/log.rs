// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Logging setup.
//!
//! Every event goes to two places: a compact console layer for the user, and
//! an append-only log file that keeps a timestamped, level-tagged line per
//! event across runs. Both honor `RUST_LOG`, defaulting to `info`.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    sync::Mutex,
};
use tracing::{info_span, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install global tracing subscriber.
///
/// Creates the log file and its parent directories if missing. Must be called
/// at most once per process.
///
/// # Errors
///
/// - Return [`LogError::OpenLogFile`] if log file cannot be opened.
/// - Return [`LogError::Filter`] if filter directive is invalid.
/// - Return [`LogError::Init`] if a global subscriber is already set.
pub fn init(log_file: impl AsRef<Path>) -> Result<()> {
    let log_file = log_file.as_ref();
    let open_err = |err| LogError::OpenLogFile {
        source: err,
        path: log_file.to_path_buf(),
    };

    if let Some(parent) = log_file.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        mkdirp::mkdirp(parent).map_err(open_err)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(open_err)?;

    let console = fmt::layer().compact().with_target(false).without_time();
    let journal = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file));
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(journal)
        .try_init()?;

    Ok(())
}

/// Span wrapping everything emitted during a dry run.
///
/// Every line logged inside of it carries the `dry_run` prefix, so previewed
/// actions are never mistaken for performed ones in the log file.
pub fn dry_run_span() -> Span {
    info_span!("dry_run")
}

/// Logging setup error types.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Log file cannot be opened for appending.
    #[error("failed to open log file {:?}", path.display())]
    OpenLogFile {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Filter directive cannot be parsed.
    #[error(transparent)]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// Global subscriber cannot be installed.
    #[error(transparent)]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Friendly result alias :3
pub type Result<T, E = LogError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;
    use tracing::{info, warn};

    #[sealed_test(env = [("RUST_LOG", "info")])]
    fn log_file_records_level_and_dry_run_prefix() -> anyhow::Result<()> {
        init("state/dotstrap.log")?;
        info!("linked starship.toml");
        dry_run_span().in_scope(|| warn!("would back up zsh"));

        let log = std::fs::read_to_string("state/dotstrap.log")?;
        let lines = log.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO") && lines[0].contains("linked starship.toml"));
        assert!(lines[1].contains("WARN") && lines[1].contains("dry_run"));
        assert!(!log.contains('\u{1b}'));

        Ok(())
    }

    #[sealed_test]
    fn second_init_fails() -> anyhow::Result<()> {
        init("dotstrap.log")?;
        assert!(matches!(init("dotstrap.log"), Err(LogError::Init(_))));

        Ok(())
    }
}

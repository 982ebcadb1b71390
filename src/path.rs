// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for the files dotstrap writes outside
//! of the target home directory: the backup ledger, and the log file. All of
//! these are resolved exactly once at startup, and passed around by value
//! afterwards.

use std::path::{Path, PathBuf};

/// Name of the application data directory under `$XDG_DATA_HOME`.
const APP_DIR: &str = "dotstrap";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to backup ledger root.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/dotstrap/backups` as the
/// default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_backup_root() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join(APP_DIR).join("backups"))
        .ok_or(NoWayHome)
}

/// Determine default absolute path to the log file.
///
/// Uses `$XDG_DATA_HOME/dotstrap/dotstrap.log`.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn default_log_file() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join(APP_DIR).join("dotstrap.log"))
        .ok_or(NoWayHome)
}

/// Make `path` absolute against `base` without touching the file system.
///
/// Symbolic links are deliberately not resolved, because the targets that
/// dotstrap manages are symbolic links themselves.
pub fn absolutize(base: impl AsRef<Path>, path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.as_ref().join(path)
    }
}

/// No way to determine user's home directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File system mutation primitives.
//!
//! Every change dotstrap makes to the user's home directory goes through this
//! module. Each primitive is safe to call against a path that is already in
//! the desired end state, so an interrupted run can always be repeated.
//!
//! # Destructive Operations
//!
//! Removing a symbolic link never loses user data, so [`remove_managed`] can
//! be called freely. Removing a real file or directory is a different story.
//! [`remove_original`] must only ever be called after [`backup`] returned
//! successfully for the same path.

use std::{
    ffi::OsString,
    fs::{self, Metadata},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Create directory and all of its missing ancestors.
///
/// Does nothing if `path` already is a directory.
///
/// # Errors
///
/// - Return [`FsError::PathConflict`] if `path` exists as a non-directory.
/// - Return [`FsError::CreateDir`] if the directory cannot be created.
pub fn ensure_directory(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(FsError::PathConflict {
                path: path.to_path_buf(),
                reason: "exists but is not a directory".into(),
            })
        }
        Err(_) => {}
    }

    debug!("create directory {:?}", path.display());
    mkdirp::mkdirp(path).map_err(|err| FsError::CreateDir {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(())
}

/// Copy `path` into `set_dir` under its base name.
///
/// Directories are copied recursively. Permission bits are preserved, and
/// nested symbolic links are recreated as links rather than followed. Returns
/// the stored path, or [`None`] if there was nothing at `path` to back up.
///
/// The copy is first written under a hidden `.<name>.partial` entry, and only
/// renamed to its base name once complete. A snapshot stored under its base
/// name is therefore always whole.
///
/// # Errors
///
/// - Return [`FsError::BackupIo`] if any part of the copy fails, including
///   when `path` holds a socket, FIFO, or device file. The partial copy is
///   discarded, and the original must be left alone in that case.
pub fn backup(path: impl AsRef<Path>, set_dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let path = path.as_ref();
    if fs::symlink_metadata(path).is_err() {
        return Ok(None);
    }

    let name = path.file_name().ok_or_else(|| FsError::PathConflict {
        path: path.to_path_buf(),
        reason: "has no base name to back up under".into(),
    })?;
    let stored = set_dir.as_ref().join(name);
    let mut partial_name = OsString::from(".");
    partial_name.push(name);
    partial_name.push(".partial");
    let partial = set_dir.as_ref().join(partial_name);

    debug!("back up {:?} to {:?}", path.display(), stored.display());
    let copied = copy_tree(path, &partial).and_then(|()| fs::rename(&partial, &stored));
    if let Err(err) = copied {
        discard(&partial);
        return Err(FsError::BackupIo {
            source: err,
            path: path.to_path_buf(),
        });
    }

    Ok(Some(stored))
}

/// Remove symbolic link at `path`.
///
/// Only the link itself is removed, never whatever it points to. Returns
/// whether a link was actually removed. Does nothing if `path` is absent or
/// is not a symbolic link.
///
/// # Errors
///
/// - Return [`FsError::RemoveIo`] if link cannot be removed.
pub fn remove_managed(path: impl AsRef<Path>) -> Result<bool> {
    let path = path.as_ref();
    if !is_symlink(path) {
        return Ok(false);
    }

    debug!("remove managed link {:?}", path.display());
    fs::remove_file(path).map_err(|err| FsError::RemoveIo {
        source: err,
        path: path.to_path_buf(),
    })?;

    Ok(true)
}

/// Remove real file or directory at `path`.
///
/// Must only be called after a successful [`backup`] of the same path.
///
/// # Errors
///
/// - Return [`FsError::RemoveIo`] if removal fails.
pub fn remove_original(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(()),
    };

    debug!("remove original {:?}", path.display());
    remove_by_kind(path, &meta).map_err(|err| FsError::RemoveIo {
        source: err,
        path: path.to_path_buf(),
    })
}

/// Create symbolic link at `target` pointing to `source`.
///
/// Does nothing if `target` already links to `source`.
///
/// # Errors
///
/// - Return [`FsError::LinkIo`] if the file system rejects the link.
pub fn link(source: impl AsRef<Path>, target: impl AsRef<Path>) -> Result<()> {
    let (source, target) = (source.as_ref(), target.as_ref());
    if points_to(target, source) {
        return Ok(());
    }

    debug!("link {:?} -> {:?}", target.display(), source.display());
    symlink(source, target).map_err(|err| FsError::LinkIo {
        source: err,
        target: target.to_path_buf(),
    })
}

/// Copy stored snapshot back over `original`.
///
/// Whatever currently occupies `original` is replaced. Missing parent
/// directories are created.
///
/// # Errors
///
/// - Return [`FsError::RestoreIo`] if the old content cannot be cleared or the
///   snapshot cannot be copied back.
/// - Return [`FsError::PathConflict`] if the parent exists as a non-directory.
pub fn restore(stored: impl AsRef<Path>, original: impl AsRef<Path>) -> Result<()> {
    let (stored, original) = (stored.as_ref(), original.as_ref());
    let to_restore_err = |err| FsError::RestoreIo {
        source: err,
        path: original.to_path_buf(),
    };

    if let Ok(meta) = fs::symlink_metadata(original) {
        remove_by_kind(original, &meta).map_err(to_restore_err)?;
    }

    if let Some(parent) = original.parent() {
        ensure_directory(parent)?;
    }

    debug!("restore {:?} from {:?}", original.display(), stored.display());
    copy_tree(stored, original).map_err(to_restore_err)
}

/// Check if `path` itself is a symbolic link, without following it.
pub fn is_symlink(path: impl AsRef<Path>) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

/// Check if `path` is a symbolic link whose destination is exactly `expect`.
pub fn points_to(path: impl AsRef<Path>, expect: impl AsRef<Path>) -> bool {
    fs::read_link(path)
        .map(|dest| dest == expect.as_ref())
        .unwrap_or(false)
}

fn remove_by_kind(path: &Path, meta: &Metadata) -> io::Result<()> {
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn discard(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };

    if let Err(err) = remove_by_kind(path, &meta) {
        warn!("failed to discard incomplete copy {:?}: {err}", path.display());
    }
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    // INVARIANT: Directory permissions are applied after their contents are
    // copied, deepest first, so read-only directories can still be filled.
    let mut dir_perms = Vec::new();

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let dest = if relative.as_os_str().is_empty() {
            to.to_path_buf()
        } else {
            to.join(relative)
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            symlink(fs::read_link(entry.path())?, &dest)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
            dir_perms.push((dest, entry.metadata().map_err(io::Error::other)?.permissions()));
        } else if file_type.is_file() {
            // INVARIANT: fs::copy carries permission bits over on its own.
            fs::copy(entry.path(), &dest)?;
        } else {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot copy special file {:?}", entry.path().display()),
            ));
        }
    }

    for (dir, perms) in dir_perms.into_iter().rev() {
        fs::set_permissions(&dir, perms)?;
    }

    Ok(())
}

#[cfg(unix)]
fn symlink(source: impl AsRef<Path>, target: impl AsRef<Path>) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
fn symlink(source: impl AsRef<Path>, target: impl AsRef<Path>) -> io::Result<()> {
    if source.as_ref().is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}

/// File system mutation error types.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// Path is occupied by something that cannot be used as asked.
    #[error("path conflict at {:?}: {reason}", path.display())]
    PathConflict { path: PathBuf, reason: String },

    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Target cannot be copied into backup set.
    #[error("failed to back up {:?}", path.display())]
    BackupIo {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Symbolic link cannot be created.
    #[error("failed to create symbolic link at {:?}", target.display())]
    LinkIo {
        #[source]
        source: io::Error,
        target: PathBuf,
    },

    /// Path cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    RemoveIo {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Stored snapshot cannot be copied back.
    #[error("failed to restore {:?}", path.display())]
    RestoreIo {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = FsError> = std::result::Result<T, E>;

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::os::unix::fs::PermissionsExt;

    #[sealed_test]
    fn ensure_directory_creates_ancestors() -> anyhow::Result<()> {
        ensure_directory("a/b/c")?;
        assert!(Path::new("a/b/c").is_dir());

        // Already there.
        ensure_directory("a/b/c")?;
        assert!(Path::new("a/b/c").is_dir());

        Ok(())
    }

    #[sealed_test]
    fn ensure_directory_rejects_file() -> anyhow::Result<()> {
        fs::write("occupied", "data")?;
        let result = ensure_directory("occupied");
        assert!(matches!(result, Err(FsError::PathConflict { .. })));

        Ok(())
    }

    #[sealed_test]
    fn backup_missing_path_is_noop() -> anyhow::Result<()> {
        fs::create_dir("set")?;
        assert_eq!(backup("nothing-here", "set")?, None);
        assert_eq!(fs::read_dir("set")?.count(), 0);

        Ok(())
    }

    #[sealed_test]
    fn backup_copies_directory_tree() -> anyhow::Result<()> {
        fs::create_dir_all("zsh/functions")?;
        fs::write("zsh/.zshrc", "source aliases.zsh")?;
        fs::write("zsh/functions/mkcd", "mkdir -p $1 && cd $1")?;
        fs::set_permissions("zsh/functions/mkcd", fs::Permissions::from_mode(0o755))?;
        std::os::unix::fs::symlink(".zshrc", "zsh/rc-link")?;
        fs::create_dir("set")?;

        let stored = backup("zsh", "set")?;
        assert_eq!(stored, Some(PathBuf::from("set/zsh")));
        assert_eq!(fs::read_to_string("set/zsh/.zshrc")?, "source aliases.zsh");
        assert_eq!(
            fs::read_to_string("set/zsh/functions/mkcd")?,
            "mkdir -p $1 && cd $1"
        );
        let mode = fs::metadata("set/zsh/functions/mkcd")?.permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(is_symlink("set/zsh/rc-link"));
        assert_eq!(fs::read_link("set/zsh/rc-link")?, PathBuf::from(".zshrc"));

        // Original left untouched.
        assert_eq!(fs::read_to_string("zsh/.zshrc")?, "source aliases.zsh");

        Ok(())
    }

    #[sealed_test]
    fn backup_keeps_read_only_directories() -> anyhow::Result<()> {
        fs::create_dir_all("plugins/vendored")?;
        fs::write("plugins/vendored/init.zsh", "autoload -U compinit")?;
        fs::set_permissions("plugins/vendored", fs::Permissions::from_mode(0o555))?;
        fs::create_dir("set")?;

        let result = backup("plugins", "set");
        let stored_mode = fs::metadata("set/plugins/vendored").map(|meta| meta.permissions().mode());
        let stored_file = fs::read_to_string("set/plugins/vendored/init.zsh");

        // Let the scratch directory be cleaned up again.
        fs::set_permissions("plugins/vendored", fs::Permissions::from_mode(0o755))?;
        if Path::new("set/plugins/vendored").exists() {
            fs::set_permissions("set/plugins/vendored", fs::Permissions::from_mode(0o755))?;
        }

        assert_eq!(result?, Some(PathBuf::from("set/plugins")));
        assert_eq!(stored_mode? & 0o777, 0o555);
        assert_eq!(stored_file?, "autoload -U compinit");

        Ok(())
    }

    #[sealed_test]
    fn backup_of_special_file_leaves_nothing_behind() -> anyhow::Result<()> {
        fs::create_dir_all("zsh/deep")?;
        fs::write("zsh/.zshrc", "precious")?;
        fs::write("zsh/deep/history", "ls")?;
        let _listener = std::os::unix::net::UnixListener::bind("zsh/agent.sock")?;
        fs::create_dir("set")?;

        let result = backup("zsh", "set");
        assert!(matches!(result, Err(FsError::BackupIo { .. })));
        assert_eq!(fs::read_dir("set")?.count(), 0);
        assert_eq!(fs::read_to_string("zsh/.zshrc")?, "precious");

        Ok(())
    }

    #[sealed_test]
    fn backup_into_missing_set_fails() -> anyhow::Result<()> {
        fs::write("starship.toml", "foo=bar")?;
        let result = backup("starship.toml", "no/such/set");
        assert!(matches!(result, Err(FsError::BackupIo { .. })));
        assert_eq!(fs::read_to_string("starship.toml")?, "foo=bar");

        Ok(())
    }

    #[sealed_test]
    fn remove_managed_only_removes_links() -> anyhow::Result<()> {
        fs::create_dir("real")?;
        fs::write("real/keep", "keep me")?;
        std::os::unix::fs::symlink("real", "managed")?;

        assert!(remove_managed("managed")?);
        assert!(!Path::new("managed").exists());
        assert_eq!(fs::read_to_string("real/keep")?, "keep me");

        // Real directories and absent paths are left alone.
        assert!(!remove_managed("real")?);
        assert!(!remove_managed("managed")?);
        assert!(Path::new("real/keep").exists());

        Ok(())
    }

    #[sealed_test]
    fn remove_original_handles_files_and_dirs() -> anyhow::Result<()> {
        fs::write("file", "x")?;
        fs::create_dir_all("dir/nested")?;

        remove_original("file")?;
        remove_original("dir")?;
        remove_original("absent")?;
        assert!(!Path::new("file").exists());
        assert!(!Path::new("dir").exists());

        Ok(())
    }

    #[sealed_test]
    fn link_is_idempotent() -> anyhow::Result<()> {
        let source = std::env::current_dir()?.join("starship.toml");
        fs::write(&source, "format = '$all'")?;

        link(&source, "linked.toml")?;
        link(&source, "linked.toml")?;
        assert!(points_to("linked.toml", &source));
        assert_eq!(fs::read_to_string("linked.toml")?, "format = '$all'");

        Ok(())
    }

    #[sealed_test]
    fn link_over_real_file_fails() -> anyhow::Result<()> {
        fs::write("source", "new")?;
        fs::write("target", "old")?;
        let result = link(std::env::current_dir()?.join("source"), "target");
        assert!(matches!(result, Err(FsError::LinkIo { .. })));

        Ok(())
    }

    #[sealed_test]
    fn restore_replaces_link_with_snapshot() -> anyhow::Result<()> {
        fs::create_dir_all("set/ghostty")?;
        fs::write("set/ghostty/config", "theme = dark")?;
        fs::create_dir("elsewhere")?;
        fs::create_dir("home")?;
        std::os::unix::fs::symlink(std::env::current_dir()?.join("elsewhere"), "home/ghostty")?;

        restore("set/ghostty", "home/ghostty")?;
        assert!(!is_symlink("home/ghostty"));
        assert_eq!(fs::read_to_string("home/ghostty/config")?, "theme = dark");
        assert!(Path::new("elsewhere").is_dir());

        Ok(())
    }
}

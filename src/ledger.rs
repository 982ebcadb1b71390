// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup ledger.
//!
//! The __backup ledger__ is an append-only history of whatever occupied the
//! link targets before dotstrap replaced them. It is nothing more than a root
//! directory holding one __backup set__ per run that actually had something to
//! back up.
//!
//! # Ledger Layout
//!
//! ```text
//! <backup-root>/
//!     20261019_101500/
//!         starship.toml
//!         zsh/
//!     20261019_101500-1/
//!         ghostty/
//! ```
//!
//! Each backup set is named by a [`SetId`], i.e., the local time of the run
//! that created it. Entries are stored under the base name of the path they
//! were copied from. Sets are never modified after their run ends, and are
//! never pruned by dotstrap. Directories in the backup root that do not parse
//! as a [`SetId`] are ignored.

use crate::{
    fs::{self as dfs, FsError},
    plan::LinkPlan,
};

use chrono::{Local, NaiveDateTime, Timelike};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, info, warn};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Identifier of a backup set.
///
/// Ordered by timestamp first, then by sequence number for runs that started
/// within the same second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SetId {
    stamp: NaiveDateTime,
    seq: u32,
}

impl SetId {
    /// Construct identifier for current local time.
    pub fn now() -> Self {
        Self::new(Local::now().naive_local())
    }

    /// Construct identifier for given time.
    ///
    /// Sub-second precision is dropped.
    pub fn new(stamp: NaiveDateTime) -> Self {
        Self {
            stamp: stamp.with_nanosecond(0).unwrap_or(stamp),
            seq: 0,
        }
    }

    fn next_seq(self) -> Self {
        Self {
            stamp: self.stamp,
            seq: self.seq + 1,
        }
    }
}

impl Display for SetId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}", self.stamp.format(STAMP_FORMAT))?;
        if self.seq > 0 {
            write!(fmt, "-{}", self.seq)?;
        }

        Ok(())
    }
}

impl FromStr for SetId {
    type Err = LedgerError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidSetId(data.into());
        let (stamp, seq) = match data.split_once('-') {
            Some((stamp, seq)) => (stamp, seq.parse::<u32>().map_err(|_| invalid())?),
            None => (data, 0),
        };
        let stamp = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).map_err(|_| invalid())?;

        Ok(Self { stamp, seq })
    }
}

/// One stored snapshot of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Backup set the snapshot belongs to.
    pub timestamp: SetId,

    /// Path the snapshot was taken from.
    pub original_path: PathBuf,

    /// Path of the snapshot inside its backup set.
    pub stored_path: PathBuf,
}

/// Handle to one backup set directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    id: SetId,
    path: PathBuf,
}

impl BackupSet {
    /// Identifier of backup set.
    pub fn id(&self) -> SetId {
        self.id
    }

    /// Absolute path to backup set directory.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Map stored snapshots back to the link targets they were taken from.
    ///
    /// Snapshots are matched to targets of `plan` by base name. Stored items
    /// without a matching target cannot be placed anywhere, so they are
    /// reported and skipped.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::ReadSet`] if backup set cannot be read.
    pub fn entries(&self, plan: &LinkPlan) -> Result<Vec<BackupEntry>> {
        let read_err = |err| LedgerError::ReadSet {
            source: err,
            path: self.path.clone(),
        };

        let mut stored = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(read_err)? {
            stored.push(entry.map_err(read_err)?.file_name());
        }

        let mut entries = Vec::new();
        for spec in plan.iter() {
            let Some(name) = spec.target.file_name() else {
                continue;
            };
            if let Some(position) = stored.iter().position(|item| item == name) {
                stored.swap_remove(position);
                entries.push(BackupEntry {
                    timestamp: self.id,
                    original_path: spec.target.clone(),
                    stored_path: self.path.join(name),
                });
            }
        }

        for orphan in stored {
            warn!(
                "backup set {} holds {:?} which no planned link claims",
                self.id,
                orphan.to_string_lossy()
            );
        }

        Ok(entries)
    }
}

/// Append-only history of backup sets.
#[derive(Debug, Clone)]
pub struct BackupLedger {
    root: PathBuf,
}

impl BackupLedger {
    /// Construct new backup ledger rooted at `root`.
    ///
    /// Nothing is created on disk until a backup is actually recorded.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of ledger.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Start recording backups for one run.
    pub fn session(&self, id: SetId) -> BackupSession<'_> {
        BackupSession {
            ledger: self,
            id,
            set: None,
        }
    }

    /// List all backup sets in ascending order.
    ///
    /// A missing ledger root is treated as an empty ledger.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::ReadSet`] if ledger root cannot be read.
    pub fn list_backup_sets(&self) -> Result<Vec<BackupSet>> {
        let read_err = |err| LedgerError::ReadSet {
            source: err,
            path: self.root.clone(),
        };

        let dir = match fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(read_err(err)),
        };

        let mut sets = Vec::new();
        for entry in dir {
            let entry = entry.map_err(read_err)?;
            if !entry.file_type().map_err(read_err)?.is_dir() {
                continue;
            }

            match entry.file_name().to_string_lossy().parse::<SetId>() {
                Ok(id) => sets.push(BackupSet {
                    id,
                    path: entry.path(),
                }),
                Err(_) => debug!("skip foreign entry {:?} in ledger", entry.path().display()),
            }
        }
        sets.sort_by_key(|set| set.id);

        Ok(sets)
    }

    /// Select most recent backup set.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::NoBackupFound`] if ledger holds no backup set.
    /// - Return [`LedgerError::ReadSet`] if ledger root cannot be read.
    pub fn most_recent(&self) -> Result<BackupSet> {
        self.list_backup_sets()?
            .pop()
            .ok_or_else(|| LedgerError::NoBackupFound(self.root.clone()))
    }

    fn create_set(&self, id: SetId) -> Result<BackupSet> {
        dfs::ensure_directory(&self.root)?;

        // INVARIANT: Never reuse an existing set, bump sequence until free.
        let mut id = id;
        loop {
            let path = self.root.join(id.to_string());
            match fs::create_dir(&path) {
                Ok(()) => {
                    info!("created backup set {:?}", path.display());
                    return Ok(BackupSet { id, path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => id = id.next_seq(),
                Err(err) => {
                    return Err(LedgerError::CreateSet { source: err, path });
                }
            }
        }
    }
}

/// Backup recording for a single run.
///
/// The backup set directory is created lazily on the first recorded backup,
/// so a run that changes nothing leaves no trace in the ledger.
#[derive(Debug)]
pub struct BackupSession<'ledger> {
    ledger: &'ledger BackupLedger,
    id: SetId,
    set: Option<BackupSet>,
}

impl BackupSession<'_> {
    /// Back up `path` into this run's backup set.
    ///
    /// Returns [`None`] if there was nothing at `path` to back up.
    ///
    /// # Errors
    ///
    /// - Return [`LedgerError::CreateSet`] if backup set cannot be created.
    /// - Return [`LedgerError::Fs`] if the copy fails. A backup set created
    ///   for this very copy is removed again, so rollback never selects it.
    pub fn record(&mut self, path: impl AsRef<Path>) -> Result<Option<BackupEntry>> {
        let path = path.as_ref();
        if fs::symlink_metadata(path).is_err() {
            return Ok(None);
        }

        let (set, fresh) = match self.set.take() {
            Some(set) => (set, false),
            None => (self.ledger.create_set(self.id)?, true),
        };

        let stored = match dfs::backup(path, set.path()) {
            Ok(stored) => stored,
            Err(err) if fresh => {
                if let Err(rm_err) = fs::remove_dir(set.path()) {
                    warn!("failed to remove empty backup set {:?}: {rm_err}", set.path().display());
                }
                return Err(err.into());
            }
            Err(err) => {
                self.set = Some(set);
                return Err(err.into());
            }
        };

        let id = set.id;
        self.set = Some(set);

        Ok(stored.map(|stored_path| BackupEntry {
            timestamp: id,
            original_path: path.to_path_buf(),
            stored_path,
        }))
    }

    /// Backup set created by this session, if any.
    pub fn backup_set(&self) -> Option<&BackupSet> {
        self.set.as_ref()
    }

    /// Finish session, returning the created backup set if any.
    pub fn finish(self) -> Option<BackupSet> {
        self.set
    }
}

/// Backup ledger error types.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Ledger holds no backup set to roll back to.
    #[error("no backup found in {:?}", .0.display())]
    NoBackupFound(PathBuf),

    /// Backup set directory cannot be created.
    #[error("failed to create backup set {:?}", path.display())]
    CreateSet {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Ledger root or backup set cannot be read.
    #[error("failed to read {:?}", path.display())]
    ReadSet {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Name is not a backup set identifier.
    #[error("invalid backup set identifier {0:?}")]
    InvalidSetId(String),

    /// Underlying file system primitive fails.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Friendly result alias :3
pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

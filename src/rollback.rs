// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rollback of the most recent backup set.
//!
//! Rollback is a best-effort "go back one step". It removes the managed links
//! of the link plan, and copies the snapshots of the most recent backup set
//! back into place.
//!
//! # Asymmetry
//!
//! Rollback never backs up what it overwrites, and never consumes the backup
//! set it restores from. Rolling back twice restores the same set twice. If
//! several runs happened since that set was made, the restored content may be
//! older than expected. This is not an undo stack.

use crate::{
    config::Config,
    fs::{self as dfs, FsError},
    ledger::{BackupEntry, BackupLedger, LedgerError, SetId},
    plan::LinkPlan,
};

use inquire::Confirm as ConfirmPrompt;
use std::{io::IsTerminal, path::PathBuf};
use tracing::{info, instrument, warn};

/// Source of explicit user confirmation.
pub trait Confirm {
    /// Ask user to confirm `message`.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Confirmation through interactive terminal prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct InteractiveConfirm {
    assume_yes: bool,
}

impl InteractiveConfirm {
    /// Construct new interactive confirmation.
    ///
    /// With `assume_yes` set, every question is answered with yes without
    /// prompting.
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Confirm for InteractiveConfirm {
    fn confirm(&self, message: &str) -> Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        if !std::io::stdin().is_terminal() {
            return Err(RollbackError::NotInteractive);
        }

        ConfirmPrompt::new(message)
            .with_default(false)
            .prompt()
            .map_err(RollbackError::Prompt)
    }
}

/// Outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackReport {
    /// User declined, nothing was changed.
    Cancelled(SetId),

    /// Backup set was restored, or would be restored in a dry run.
    Restored {
        /// Backup set restored from.
        set: SetId,

        /// Managed links removed.
        unlinked: Vec<PathBuf>,

        /// Snapshots copied back.
        restored: Vec<BackupEntry>,
    },
}

/// Restores most recent backup set.
#[derive(Debug)]
pub struct RollbackEngine<'cfg> {
    config: &'cfg Config,
    ledger: BackupLedger,
}

impl<'cfg> RollbackEngine<'cfg> {
    /// Construct new rollback engine for run configuration.
    pub fn new(config: &'cfg Config) -> Self {
        Self {
            config,
            ledger: BackupLedger::new(&config.backup_root),
        }
    }

    /// Roll back to most recent backup set.
    ///
    /// Confirmation is only asked for real runs, a dry run just reports what
    /// would be restored.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Ledger`] with [`LedgerError::NoBackupFound`]
    ///   before anything is changed if ledger is empty.
    /// - Return [`RollbackError::NotInteractive`] or [`RollbackError::Prompt`]
    ///   if confirmation cannot be obtained.
    /// - Return [`RollbackError::Fs`] if a link cannot be removed or a
    ///   snapshot cannot be restored.
    #[instrument(skip(self, plan, confirm), level = "debug")]
    pub fn rollback(&self, plan: &LinkPlan, confirm: &impl Confirm) -> Result<RollbackReport> {
        let set = self.ledger.most_recent()?;
        let entries = set.entries(plan)?;
        info!(
            "rolling back to backup set {} at {:?}",
            set.id(),
            set.path().display()
        );

        if entries.is_empty() {
            warn!("backup set {} holds nothing the link plan claims", set.id());
        }

        if self.config.dry_run {
            let mut unlinked = Vec::new();
            for spec in plan.iter().filter(|spec| dfs::is_symlink(&spec.target)) {
                info!("would remove managed link {:?}", spec.target.display());
                unlinked.push(spec.target.clone());
            }
            for entry in &entries {
                info!(
                    "would restore {:?} from {:?}",
                    entry.original_path.display(),
                    entry.stored_path.display()
                );
            }

            return Ok(RollbackReport::Restored {
                set: set.id(),
                unlinked,
                restored: entries,
            });
        }

        let question = format!("Restore backup set {} and remove managed links?", set.id());
        if !confirm.confirm(&question)? {
            info!("rollback cancelled");
            return Ok(RollbackReport::Cancelled(set.id()));
        }

        let mut unlinked = Vec::new();
        for spec in plan {
            if dfs::remove_managed(&spec.target)? {
                info!("removed managed link {:?}", spec.target.display());
                unlinked.push(spec.target.clone());
            }
        }

        for entry in &entries {
            dfs::restore(&entry.stored_path, &entry.original_path)?;
            info!(
                "restored {:?} from backup set {}",
                entry.original_path.display(),
                entry.timestamp
            );
        }

        Ok(RollbackReport::Restored {
            set: set.id(),
            unlinked,
            restored: entries,
        })
    }
}

/// Rollback error types.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// Confirmation needed, but standard input is not a terminal.
    #[error("rollback needs confirmation, but input is not interactive (pass --yes to skip)")]
    NotInteractive,

    /// Confirmation prompt fails.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Backup ledger operations fail.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// File system primitives fail.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Friendly result alias :3
pub type Result<T, E = RollbackError> = std::result::Result<T, E>;

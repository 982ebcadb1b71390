// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link plan reconciliation.
//!
//! The __reconciler__ converges the user's file system toward a [`LinkPlan`].
//! For every planned link it clears whatever currently occupies the target,
//! backing up anything that is not already a managed link, and then places
//! the link.
//!
//! # Failure Behavior
//!
//! Reconciliation is fail-fast. The first failure aborts the run, leaving the
//! plan applied exactly as far as it got. No automatic partial rollback is
//! attempted. Because every step is idempotent, re-running is always safe,
//! otherwise the user can roll back to the backup set this run created.

use crate::{
    config::Config,
    fs::{self as dfs, FsError},
    ledger::{BackupEntry, BackupLedger, BackupSet, LedgerError, SetId},
    plan::{LinkPlan, LinkSpec, PlanError},
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Outcome of applying a link plan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// Links placed, or that would be placed in a dry run.
    pub linked: Vec<LinkSpec>,

    /// Snapshots taken before targets were cleared.
    pub backups: Vec<BackupEntry>,

    /// Backup set created by the run, if anything needed backing up.
    pub backup_set: Option<BackupSet>,
}

/// Problem found by the validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Target that does not hold its planned link.
    pub target: PathBuf,

    /// Source the target should link to.
    pub expected: PathBuf,

    /// What was found instead.
    pub found: Found,
}

/// What occupies a target that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Found {
    /// Nothing at all.
    Missing,

    /// Real file or directory.
    NotALink,

    /// Symbolic link to some other place.
    WrongLink(PathBuf),
}

impl Display for ValidationIssue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let target = self.target.display();
        let expected = self.expected.display();
        match &self.found {
            Found::Missing => write!(fmt, "{target:?} is missing, expected link to {expected:?}"),
            Found::NotALink => write!(fmt, "{target:?} is not a link, expected link to {expected:?}"),
            Found::WrongLink(dest) => write!(
                fmt,
                "{target:?} links to {:?}, expected {expected:?}",
                dest.display()
            ),
        }
    }
}

/// Converges file system toward link plan.
#[derive(Debug)]
pub struct Reconciler<'cfg> {
    config: &'cfg Config,
    ledger: BackupLedger,
}

impl<'cfg> Reconciler<'cfg> {
    /// Construct new reconciler for run configuration.
    pub fn new(config: &'cfg Config) -> Self {
        Self {
            config,
            ledger: BackupLedger::new(&config.backup_root),
        }
    }

    /// Apply link plan.
    ///
    /// Every source is verified before any target is touched. In a dry run
    /// the intended actions are only reported.
    ///
    /// # Errors
    ///
    /// - Return [`ReconcileError::Plan`] if a source is missing or misplaced.
    /// - Return [`ReconcileError::Ledger`] if a target cannot be backed up.
    /// - Return [`ReconcileError::Fs`] if a target cannot be cleared or
    ///   linked.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn apply(&self, plan: &LinkPlan) -> Result<ApplyReport> {
        plan.verify_sources(&self.config.repo_root)?;

        if self.config.dry_run {
            return Ok(self.preview(plan));
        }

        let mut report = ApplyReport::default();
        let mut session = self.ledger.session(SetId::now());
        for spec in plan {
            let target = spec.target.as_path();

            if dfs::remove_managed(target)? {
                info!("replace managed link {:?}", target.display());
            } else if let Some(entry) = session.record(target)? {
                // INVARIANT: Only remove original after backup succeeded.
                info!(
                    "backed up {:?} to {:?}",
                    target.display(),
                    entry.stored_path.display()
                );
                dfs::remove_original(target)?;
                report.backups.push(entry);
            }

            if let Some(parent) = target.parent() {
                dfs::ensure_directory(parent)?;
            }
            dfs::link(&spec.source, target)?;
            info!("linked {:?} -> {:?}", target.display(), spec.source.display());
            report.linked.push(spec.clone());
        }
        report.backup_set = session.finish();

        Ok(report)
    }

    /// Check that every planned target is a link to its source.
    ///
    /// Returns every mismatch found. Does not fail on mismatches, callers
    /// decide how severe they are.
    #[instrument(skip(self, plan), level = "debug")]
    pub fn validate(&self, plan: &LinkPlan) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for spec in plan {
            let found = match fs::symlink_metadata(&spec.target) {
                Err(_) => Some(Found::Missing),
                Ok(meta) if !meta.file_type().is_symlink() => Some(Found::NotALink),
                Ok(_) => match fs::read_link(&spec.target) {
                    Ok(dest) if dest == spec.source => None,
                    Ok(dest) => Some(Found::WrongLink(dest)),
                    Err(_) => Some(Found::Missing),
                },
            };

            if let Some(found) = found {
                let issue = ValidationIssue {
                    target: spec.target.clone(),
                    expected: spec.source.clone(),
                    found,
                };
                warn!("{issue}");
                issues.push(issue);
            } else {
                info!("verified {:?}", spec.target.display());
            }
        }

        issues
    }

    fn preview(&self, plan: &LinkPlan) -> ApplyReport {
        let mut report = ApplyReport::default();
        for spec in plan {
            let target = spec.target.as_path();
            if dfs::is_symlink(target) {
                info!("would replace managed link {:?}", target.display());
            } else if exists(target) {
                info!(
                    "would back up {:?} into {:?}",
                    target.display(),
                    self.ledger.root().display()
                );
            }
            info!("would link {:?} -> {:?}", target.display(), spec.source.display());
            report.linked.push(spec.clone());
        }

        report
    }
}

fn exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Link plan is not usable.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Backup ledger operations fail.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// File system primitives fail.
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Friendly result alias :3
pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

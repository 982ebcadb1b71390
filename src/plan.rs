// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Link plan.
//!
//! A __link plan__ is the ordered list of symbolic links that dotstrap
//! converges the user's file system toward. Each entry maps a source inside
//! the managed repository to a target somewhere in the user's home directory.
//! The plan is fixed before any mutation happens, and stays immutable for the
//! rest of the run.

use std::{
    collections::HashSet,
    path::{Component, Path, PathBuf},
    slice::Iter,
};

/// One desired symbolic link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSpec {
    /// Absolute path of the link source inside the repository.
    pub source: PathBuf,

    /// Absolute path where the link should be placed.
    pub target: PathBuf,
}

impl LinkSpec {
    /// Construct new link specification.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Ordered, immutable set of link specifications.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPlan {
    links: Vec<LinkSpec>,
}

impl LinkPlan {
    /// Construct new link plan.
    ///
    /// Backup sets store snapshots by base name, so two targets sharing a base
    /// name could never be told apart on rollback.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::PathConflict`] if a target has no base name, or
    ///   shares its base name with an earlier target.
    pub fn new(links: impl IntoIterator<Item = LinkSpec>) -> Result<Self> {
        let links = links.into_iter().collect::<Vec<_>>();
        let mut names = HashSet::new();
        for spec in &links {
            let name = spec.target.file_name().ok_or_else(|| PlanError::PathConflict {
                path: spec.target.clone(),
                reason: "target has no base name".into(),
            })?;

            if !names.insert(name.to_os_string()) {
                return Err(PlanError::PathConflict {
                    path: spec.target.clone(),
                    reason: "another target already uses this base name".into(),
                });
            }
        }

        Ok(Self { links })
    }

    /// Iterate through link specifications in plan order.
    pub fn iter(&self) -> Iter<'_, LinkSpec> {
        self.links.iter()
    }

    /// Number of planned links.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if plan has no links at all.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Check that every source exists inside `repo_root`.
    ///
    /// # Errors
    ///
    /// - Return [`PlanError::PathConflict`] naming the first source that lies
    ///   outside of `repo_root`, or that holds a `..` component.
    /// - Return [`PlanError::MissingSource`] naming the first source that does
    ///   not exist.
    pub fn verify_sources(&self, repo_root: impl AsRef<Path>) -> Result<()> {
        let repo_root = repo_root.as_ref();
        for spec in &self.links {
            // INVARIANT: A `..` below the root could climb out of the
            // repository while still matching its prefix.
            let inside = spec.source.strip_prefix(repo_root).is_ok_and(|rest| {
                !rest
                    .components()
                    .any(|component| matches!(component, Component::ParentDir))
            });
            if !inside {
                return Err(PlanError::PathConflict {
                    path: spec.source.clone(),
                    reason: format!("source lies outside of {:?}", repo_root.display()),
                });
            }

            if std::fs::symlink_metadata(&spec.source).is_err() {
                return Err(PlanError::MissingSource(spec.source.clone()));
            }
        }

        Ok(())
    }
}

impl<'plan> IntoIterator for &'plan LinkPlan {
    type Item = &'plan LinkSpec;
    type IntoIter = Iter<'plan, LinkSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Link plan error types.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// Planned path cannot be used as asked.
    #[error("path conflict at {:?}: {reason}", path.display())]
    PathConflict { path: PathBuf, reason: String },

    /// Link source does not exist.
    #[error("link source {:?} does not exist", .0.display())]
    MissingSource(PathBuf),
}

/// Friendly result alias :3
pub type Result<T, E = PlanError> = std::result::Result<T, E>;

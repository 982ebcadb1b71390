// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Provision a shell environment from a bundle of dotfiles.
//!
//! Dotstrap installs a fixed list of developer tools, then links the bundled
//! configuration into the user's home directory. Anything that already sits
//! where a link should go is backed up first, and the most recent backup can
//! be rolled back at any time.
//!
//! # Components
//!
//! 1. [`fs`]: file system mutation primitives.
//! 2. [`ledger`]: timestamped backup sets.
//! 3. [`plan`]: the links to converge toward.
//! 4. [`reconcile`]: applies a link plan, and validates the result.
//! 5. [`rollback`]: restores the most recent backup set.
//!
//! Configuration, logging, and tool installation live in [`config`], [`log`],
//! and [`tools`].

pub mod config;
pub mod fs;
pub mod ledger;
pub mod log;
pub mod path;
pub mod plan;
pub mod reconcile;
pub mod rollback;
pub mod tools;

pub use config::{Config, Manifest, RunMode};
pub use ledger::{BackupEntry, BackupLedger, BackupSet, SetId};
pub use plan::{LinkPlan, LinkSpec};
pub use reconcile::{ApplyReport, Reconciler, ValidationIssue};
pub use rollback::{Confirm, InteractiveConfirm, RollbackEngine, RollbackReport};
pub use tools::{Platform, Tool, Toolbox};

// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Two kinds of configuration exist. The __manifest__ is a TOML file shipped
//! with the bundle that lists what to link and which tools to install. The
//! __run configuration__ is built exactly once at startup from command-line
//! flags and resolved paths, and is then handed to every component that needs
//! it. Nothing reads flags or environment variables after that point.

use crate::{
    path::absolutize,
    plan::{LinkPlan, LinkSpec, PlanError},
    tools::Tool,
};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::info;

/// Default file name of the manifest at the top-level of the repository.
pub const MANIFEST_NAME: &str = "dotstrap.toml";

/// Bundle manifest layout.
///
/// # General Layout
///
/// ```toml
/// tools = ["git", "starship", { package = "ripgrep", commands = ["rg"] }]
/// installer = ["brew", "install"]
///
/// [[link]]
/// source = "config/starship.toml"
/// target = "~/.config/starship.toml"
/// ```
///
/// Link sources are relative to the repository root. Link targets go through
/// shell expansion, and are relative to the home directory if still relative
/// afterwards. The installer is optional, a platform default is used when it
/// is left out.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Manifest {
    /// Developer tools to install when missing.
    #[serde(default)]
    pub tools: Vec<Tool>,

    /// Command prefix used to install one tool.
    pub installer: Option<Vec<String>>,

    /// Links to place.
    #[serde(rename = "link", default)]
    pub links: Vec<LinkEntry>,
}

impl Manifest {
    /// Load manifest from file, or fall back to the built-in manifest.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadManifest`] if manifest exists but cannot be
    ///   read.
    /// - Return [`ConfigError::Deserialize`] if manifest is malformed.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("no manifest at {:?}, using built-in link plan", path.display());
            return Ok(Self::default());
        }

        read_to_string(path)
            .map_err(|err| ConfigError::ReadManifest {
                source: err,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Resolve manifest links into an absolute link plan.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Plan`] if resolved targets conflict.
    pub fn link_plan(&self, repo_root: impl AsRef<Path>, home: impl AsRef<Path>) -> Result<LinkPlan> {
        let links = self.links.iter().map(|entry| {
            LinkSpec::new(
                absolutize(repo_root.as_ref(), &entry.source),
                absolutize(home.as_ref(), &entry.target),
            )
        });

        Ok(LinkPlan::new(links)?)
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            tools: vec![
                "git".into(),
                "zsh".into(),
                "starship".into(),
                "fzf".into(),
                Tool::package("ripgrep", ["rg"]),
                Tool::package("bat", ["bat", "batcat"]),
                "eza".into(),
                "zoxide".into(),
            ],
            installer: None,
            links: vec![
                LinkEntry::new("config/starship.toml", ".config/starship.toml"),
                LinkEntry::new("config/zsh", ".config/zsh"),
                LinkEntry::new("config/ghostty", ".config/ghostty"),
            ],
        }
    }
}

impl FromStr for Manifest {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut manifest: Manifest = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on link targets.
        manifest.links = manifest
            .links
            .into_iter()
            .map(LinkEntry::expanded)
            .collect::<Result<_>>()?;

        Ok(manifest)
    }
}

impl Display for Manifest {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// One link listed in the manifest.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct LinkEntry {
    /// Path of link source relative to repository root.
    pub source: PathBuf,

    /// Path where link should be placed.
    pub target: PathBuf,
}

impl LinkEntry {
    /// Construct new link entry.
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    fn expanded(self) -> Result<Self> {
        let target = shellexpand::full(self.target.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned();

        Ok(Self {
            source: self.source,
            target: target.into(),
        })
    }
}

/// What a single invocation does.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Install tools, link configuration, and validate.
    #[default]
    Apply,

    /// Report intended actions without mutating anything.
    DryRun,

    /// Restore most recent backup set.
    Rollback,
}

impl RunMode {
    /// Determine run mode from command-line flags.
    ///
    /// Rollback wins over dry run, because a dry-run rollback is still a
    /// rollback, just a previewed one.
    pub fn from_flags(dry_run: bool, rollback: bool) -> Self {
        match (dry_run, rollback) {
            (_, true) => Self::Rollback,
            (true, false) => Self::DryRun,
            (false, false) => Self::Apply,
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Apply => "apply",
            Self::DryRun => "dry-run",
            Self::Rollback => "rollback",
        };
        fmt.write_str(name)
    }
}

/// Immutable configuration of a single run.
///
/// All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Repository holding the bundled configuration.
    pub repo_root: PathBuf,

    /// Home directory that relative link targets are resolved against.
    pub home: PathBuf,

    /// Manifest listing links and tools.
    pub manifest: PathBuf,

    /// Root directory of backup ledger.
    pub backup_root: PathBuf,

    /// Append-only log file.
    pub log_file: PathBuf,

    /// What this run does.
    pub mode: RunMode,

    /// Only report actions, never perform them.
    pub dry_run: bool,

    /// Attempt tool installation.
    pub install_tools: bool,

    /// Answer confirmation prompts with yes.
    pub assume_yes: bool,
}

impl Config {
    /// Construct run configuration for `mode`.
    ///
    /// Tool installation is enabled for apply runs and dry runs, the dry-run
    /// flag follows from the mode, and the manifest is looked up at the
    /// top-level of the repository.
    pub fn new(
        repo_root: impl Into<PathBuf>,
        home: impl Into<PathBuf>,
        backup_root: impl Into<PathBuf>,
        log_file: impl Into<PathBuf>,
        mode: RunMode,
    ) -> Self {
        let repo_root: PathBuf = repo_root.into();
        Self {
            manifest: repo_root.join(MANIFEST_NAME),
            repo_root,
            home: home.into(),
            backup_root: backup_root.into(),
            log_file: log_file.into(),
            mode,
            dry_run: mode == RunMode::DryRun,
            install_tools: mode != RunMode::Rollback,
            assume_yes: false,
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Manifest cannot be read.
    #[error("failed to read manifest at {:?}", path.display())]
    ReadManifest {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Resolved links do not form a valid plan.
    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

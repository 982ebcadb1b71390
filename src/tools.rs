// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Developer tool installation.
//!
//! A thin check-then-install pass over the manifest's tool list. A tool counts
//! as installed when one of the commands its package provides is on `PATH`.
//! Missing tools are handed to the platform package manager one at a time.
//! Nothing else in dotstrap depends on which tools ended up installed.

use serde::{Deserialize, Serialize};
use std::{
    ffi::OsStr,
    fmt::{Display, Formatter, Result as FmtResult},
    process::Command,
};
use tracing::{info, instrument, warn};

/// Developer tool listed in the manifest.
///
/// Plain strings name a package whose command carries the same name. Packages
/// that install their commands under other names use a table instead:
///
/// ```toml
/// tools = [
///     "git",
///     { package = "ripgrep", commands = ["rg"] },
///     { package = "bat", commands = ["bat", "batcat"] },
/// ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Tool {
    /// Package providing a command of the same name.
    Named(String),

    /// Package providing any of the listed commands.
    Package {
        package: String,
        #[serde(default)]
        commands: Vec<String>,
    },
}

impl Tool {
    /// Construct tool whose package and command names differ.
    pub fn package(
        package: impl Into<String>,
        commands: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Package {
            package: package.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    /// Package name handed to the installer.
    pub fn package_name(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Package { package, .. } => package,
        }
    }

    /// Commands that count as the tool being installed.
    ///
    /// Falls back to the package name if no command is listed.
    pub fn commands(&self) -> Vec<&str> {
        match self {
            Self::Package { commands, .. } if !commands.is_empty() => {
                commands.iter().map(String::as_str).collect()
            }
            _ => vec![self.package_name()],
        }
    }

    /// Check if any command of this tool is on `PATH`.
    pub fn is_installed(&self) -> bool {
        self.commands().into_iter().any(|command| which::which(command).is_ok())
    }
}

impl From<&str> for Tool {
    fn from(name: &str) -> Self {
        Self::Named(name.into())
    }
}

impl From<String> for Tool {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl Display for Tool {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.package_name())
    }
}

/// Operating system family dotstrap can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
}

impl Platform {
    /// Detect current platform.
    ///
    /// # Errors
    ///
    /// - Return [`ToolError::UnsupportedPlatform`] for anything but macOS and
    ///   Linux.
    pub fn detect() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    fn from_os(os: &str) -> Result<Self> {
        match os {
            "macos" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(ToolError::UnsupportedPlatform(other.into())),
        }
    }

    /// Default command prefix to install a single package.
    pub fn default_installer(&self) -> Vec<String> {
        let command: &[&str] = match self {
            Self::MacOs => &["brew", "install"],
            Self::Linux => &["sudo", "apt-get", "install", "-y"],
        };
        command.iter().map(ToString::to_string).collect()
    }
}

impl Display for Platform {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::MacOs => fmt.write_str("macos"),
            Self::Linux => fmt.write_str("linux"),
        }
    }
}

/// Tool list together with the command used to install it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolbox {
    tools: Vec<Tool>,
    installer: Vec<String>,
    dry_run: bool,
}

impl Toolbox {
    /// Construct new toolbox.
    ///
    /// # Errors
    ///
    /// - Return [`ToolError::EmptyInstaller`] if installer command is empty.
    pub fn new(
        tools: impl IntoIterator<Item = impl Into<Tool>>,
        installer: impl IntoIterator<Item = impl Into<String>>,
        dry_run: bool,
    ) -> Result<Self> {
        let installer = installer.into_iter().map(Into::into).collect::<Vec<_>>();
        if installer.is_empty() {
            return Err(ToolError::EmptyInstaller);
        }

        Ok(Self {
            tools: tools.into_iter().map(Into::into).collect(),
            installer,
            dry_run,
        })
    }

    /// List tools with none of their commands on `PATH`.
    pub fn missing(&self) -> Vec<&Tool> {
        self.tools.iter().filter(|tool| !tool.is_installed()).collect()
    }

    /// Install every tool not found on `PATH`.
    ///
    /// Returns the packages that were installed, or would be in a dry run.
    ///
    /// # Errors
    ///
    /// - Return [`ToolError::Syscall`] if installer cannot be spawned or
    ///   exits unsuccessfully.
    #[instrument(skip(self), level = "debug")]
    pub fn install_missing(&self) -> Result<Vec<String>> {
        let missing = self.missing();
        if missing.is_empty() {
            info!("all {} tools already installed", self.tools.len());
            return Ok(Vec::new());
        }

        let Some((program, args)) = self.installer.split_first() else {
            return Err(ToolError::EmptyInstaller);
        };

        let mut installed = Vec::new();
        for tool in missing {
            let package = tool.package_name();
            if self.dry_run {
                info!("would install {package} with {:?}", self.installer.join(" "));
            } else {
                info!("install {package}");
                syscall_interactive(program, args.iter().map(String::as_str).chain([package]))?;
            }
            installed.push(package.to_string());
        }

        Ok(installed)
    }

    /// Report tools still missing as advisory warnings.
    pub fn report_missing(&self) -> usize {
        let missing = self.missing();
        for tool in &missing {
            warn!("tool {tool} not found on PATH, looked for {:?}", tool.commands());
        }
        missing.len()
    }
}

fn syscall_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<()> {
    let status = Command::new(cmd.as_ref())
        .args(args)
        .spawn()
        .map_err(ToolError::Syscall)?
        .wait()
        .map_err(ToolError::Syscall)?;
    if !status.success() {
        return Err(ToolError::Syscall(std::io::Error::other(format!(
            "command {:?} failed",
            cmd.as_ref()
        ))));
    }

    Ok(())
}

/// Tool installation error types.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Operating system cannot be provisioned.
    #[error("unsupported platform {0:?}")]
    UnsupportedPlatform(String),

    /// Installer command has no program to run.
    #[error("installer command is empty")]
    EmptyInstaller,

    /// Installer cannot be run or fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ToolError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case("macos", Some(Platform::MacOs); "macos")]
    #[test_case("linux", Some(Platform::Linux); "linux")]
    #[test_case("freebsd", None; "freebsd")]
    #[test_case("windows", None; "windows")]
    #[test]
    fn platform_from_os(os: &str, expect: Option<Platform>) {
        use pretty_assertions::assert_eq;

        assert_eq!(Platform::from_os(os).ok(), expect);
    }

    #[test]
    fn default_installers() {
        assert_eq!(Platform::MacOs.default_installer(), vec!["brew", "install"]);
        assert_eq!(
            Platform::Linux.default_installer(),
            vec!["sudo", "apt-get", "install", "-y"]
        );
    }

    #[test]
    fn empty_installer_rejected() {
        let result = Toolbox::new(["git"], Vec::<String>::new(), false);
        assert!(matches!(result, Err(ToolError::EmptyInstaller)));
    }

    #[cfg(unix)]
    #[test]
    fn missing_only_lists_absent_tools() -> anyhow::Result<()> {
        let toolbox = Toolbox::new(["sh", "dotstrap-no-such-tool"], ["true"], true)?;
        assert_eq!(toolbox.missing(), vec![&Tool::from("dotstrap-no-such-tool")]);
        assert_eq!(toolbox.report_missing(), 1);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn package_found_through_its_commands() -> anyhow::Result<()> {
        let renamed = Tool::package("dotstrap-no-such-package", ["sh"]);
        let fallback = Tool::package("dotstrap-no-such-package", ["dotstrap-no-such-tool", "sh"]);
        let absent = Tool::package("dotstrap-no-such-package", ["dotstrap-no-such-tool"]);
        assert!(renamed.is_installed());
        assert!(fallback.is_installed());
        assert!(!absent.is_installed());

        // Installed packages are never handed to the installer again.
        let toolbox = Toolbox::new([renamed, fallback, absent], ["false"], true)?;
        assert_eq!(toolbox.install_missing()?, vec!["dotstrap-no-such-package"]);

        let toolbox = Toolbox::new([Tool::package("sh-package", ["sh"])], ["false"], false)?;
        assert!(toolbox.install_missing()?.is_empty());

        Ok(())
    }

    #[test]
    fn tool_without_commands_uses_package_name() {
        let tool = Tool::package("git", Vec::<String>::new());
        assert_eq!(tool.commands(), vec!["git"]);
        assert_eq!(Tool::from("zsh").commands(), vec!["zsh"]);
        assert_eq!(Tool::package("ripgrep", ["rg"]).commands(), vec!["rg"]);
    }

    #[cfg(unix)]
    #[test]
    fn dry_run_install_runs_nothing() -> anyhow::Result<()> {
        let toolbox = Toolbox::new(["dotstrap-no-such-tool"], ["false"], true)?;
        assert_eq!(toolbox.install_missing()?, vec!["dotstrap-no-such-tool"]);

        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_installer_is_fatal() -> anyhow::Result<()> {
        let toolbox = Toolbox::new(["dotstrap-no-such-tool"], ["false"], false)?;
        assert!(matches!(toolbox.install_missing(), Err(ToolError::Syscall(_))));

        let toolbox = Toolbox::new(["dotstrap-no-such-tool"], ["true"], false)?;
        assert_eq!(toolbox.install_missing()?, vec!["dotstrap-no-such-tool"]);

        Ok(())
    }
}

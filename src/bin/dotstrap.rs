// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotstrap::{
    config::{Config, Manifest, RunMode},
    log,
    path::{absolutize, default_backup_root, default_log_file, home_dir},
    plan::LinkPlan,
    reconcile::Reconciler,
    rollback::{InteractiveConfirm, RollbackEngine, RollbackReport},
    tools::{Platform, Toolbox},
};

use anyhow::{bail, Context, Result};
use clap::{error::ErrorKind, Parser};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};

#[derive(Debug, Clone, Parser)]
#[command(about, override_usage = "dotstrap [options]", version)]
struct Cli {
    /// Report every intended action without changing anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Restore most recent backup set, then exit.
    #[arg(short, long, conflicts_with = "skip_tools")]
    pub rollback: bool,

    /// Do not install developer tools.
    #[arg(long)]
    pub skip_tools: bool,

    /// Answer rollback confirmation with yes.
    #[arg(short, long)]
    pub yes: bool,

    /// Repository holding the bundled configuration.
    #[arg(long, value_name = "path")]
    pub repo: Option<PathBuf>,

    /// Manifest listing links and tools.
    #[arg(long, value_name = "path")]
    pub manifest: Option<PathBuf>,

    /// Directory holding backup sets.
    #[arg(long, value_name = "path")]
    pub backup_root: Option<PathBuf>,

    /// Append-only log file.
    #[arg(long, value_name = "path")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    fn config(&self) -> Result<Config> {
        let cwd = std::env::current_dir().context("cannot determine current directory")?;
        let repo_root = match &self.repo {
            Some(path) => absolutize(&cwd, path),
            None => cwd.clone(),
        };
        let backup_root = match &self.backup_root {
            Some(path) => absolutize(&cwd, path),
            None => default_backup_root()?,
        };
        let log_file = match &self.log_file {
            Some(path) => absolutize(&cwd, path),
            None => default_log_file()?,
        };

        let mode = RunMode::from_flags(self.dry_run, self.rollback);
        let mut config = Config::new(repo_root, home_dir()?, backup_root, log_file, mode);
        if let Some(path) = &self.manifest {
            config.manifest = absolutize(&cwd, path);
        }
        config.dry_run = self.dry_run;
        config.install_tools = mode != RunMode::Rollback && !self.skip_tools;
        config.assume_yes = self.yes;

        Ok(config)
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // INVARIANT: Usage errors exit with 1, not clap's default of 2.
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = error.print();
            exit(code);
        }
    };

    let config = match cli.config() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("error: {error:?}");
            exit(1);
        }
    };

    if let Err(error) = log::init(&config.log_file) {
        eprintln!("error: {error:?}");
        exit(1);
    }

    // INVARIANT: Fatal errors of a dry run are logged inside its span too.
    let _dry_run = config.dry_run.then(log::dry_run_span).map(|span| span.entered());
    if let Err(error) = run(&config) {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run(config: &Config) -> Result<()> {
    info!("start {} run from {:?}", config.mode, config.repo_root.display());

    let manifest = Manifest::load_or_default(&config.manifest)?;
    let plan = manifest.link_plan(&config.repo_root, &config.home)?;

    match config.mode {
        RunMode::Rollback => run_rollback(config, &plan),
        RunMode::Apply | RunMode::DryRun => run_apply(config, &manifest, &plan),
    }
}

fn run_apply(config: &Config, manifest: &Manifest, plan: &LinkPlan) -> Result<()> {
    let toolbox = if config.install_tools {
        let platform = Platform::detect()?;
        info!("detected platform {platform}");
        let installer = manifest
            .installer
            .clone()
            .unwrap_or_else(|| platform.default_installer());
        let toolbox = Toolbox::new(manifest.tools.clone(), installer, config.dry_run)?;
        toolbox.install_missing()?;
        Some(toolbox)
    } else {
        info!("skip tool installation");
        None
    };

    let reconciler = Reconciler::new(config);
    let report = reconciler
        .apply(plan)
        .context("linking aborted, re-run dotstrap or restore with --rollback")?;

    if config.dry_run {
        info!("dry run done, {} links previewed", report.linked.len());
        return Ok(());
    }

    if let Some(set) = &report.backup_set {
        info!(
            "{} backups stored in {:?}",
            report.backups.len(),
            set.path().display()
        );
    }

    let issues = reconciler.validate(plan);
    if let Some(toolbox) = &toolbox {
        toolbox.report_missing();
    }
    if !issues.is_empty() {
        bail!(
            "validation failed, {} of {} links are not in place",
            issues.len(),
            plan.len()
        );
    }

    info!("all {} links in place", plan.len());
    Ok(())
}

fn run_rollback(config: &Config, plan: &LinkPlan) -> Result<()> {
    let confirm = InteractiveConfirm::new(config.assume_yes);
    match RollbackEngine::new(config).rollback(plan, &confirm)? {
        RollbackReport::Cancelled(set) => {
            info!("backup set {set} left untouched");
        }
        RollbackReport::Restored { set, restored, .. } if config.dry_run => {
            info!("{} entries of backup set {set} would be restored", restored.len());
        }
        RollbackReport::Restored { set, restored, .. } => {
            info!("restored {} entries from backup set {set}", restored.len());
        }
    }

    Ok(())
}

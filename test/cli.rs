// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Sandbox;

use anyhow::Result;
use dotstrap::fs::{is_symlink, points_to};
use pretty_assertions::assert_eq;
use sealed_test::prelude::*;
use std::{
    fs,
    process::{Command, Output, Stdio},
};

fn dotstrap(sandbox: &Sandbox, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_dotstrap"))
        .arg("--repo")
        .arg(sandbox.repo())
        .arg("--backup-root")
        .arg(sandbox.backups())
        .arg("--log-file")
        .arg("dotstrap.log")
        .args(args)
        .env("HOME", sandbox.home(""))
        .env_remove("RUST_LOG")
        .stdin(Stdio::null())
        .output()?;

    Ok(output)
}

#[sealed_test]
fn help_exits_zero() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = dotstrap(&sandbox, &["--help"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("--dry-run"));
    assert!(!std::path::Path::new("dotstrap.log").exists());

    Ok(())
}

#[sealed_test]
fn unknown_flag_exits_one() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = dotstrap(&sandbox, &["--frobnicate"])?;
    assert_eq!(output.status.code(), Some(1));

    Ok(())
}

#[sealed_test]
fn rollback_conflicts_with_skip_tools() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = dotstrap(&sandbox, &["--rollback", "--skip-tools"])?;
    assert_eq!(output.status.code(), Some(1));

    Ok(())
}

#[sealed_test]
fn rollback_without_backups_exits_one() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let output = dotstrap(&sandbox, &["--rollback", "--yes"])?;
    assert_eq!(output.status.code(), Some(1));

    let log = fs::read_to_string("dotstrap.log")?;
    assert!(log.contains("ERROR"));
    assert!(log.contains("no backup found"));

    Ok(())
}

#[sealed_test]
fn rollback_needs_confirmation_when_not_interactive() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let target = sandbox.user_file(".config/starship.toml", "foo=bar")?;
    assert_eq!(dotstrap(&sandbox, &["--skip-tools"])?.status.code(), Some(0));

    let output = dotstrap(&sandbox, &["--rollback"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(is_symlink(&target));

    Ok(())
}

#[sealed_test]
fn apply_then_rollback() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let target = sandbox.user_file(".config/starship.toml", "foo=bar")?;

    let output = dotstrap(&sandbox, &["--skip-tools"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(points_to(&target, sandbox.repo().join("config/starship.toml")));
    assert!(points_to(sandbox.home(".config/zsh"), sandbox.repo().join("config/zsh")));

    let output = dotstrap(&sandbox, &["--rollback", "--yes"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(!is_symlink(&target));
    assert_eq!(fs::read_to_string(&target)?, "foo=bar");
    assert!(!sandbox.home(".config/zsh").exists());

    let log = fs::read_to_string("dotstrap.log")?;
    assert!(log.contains("linked"));
    assert!(log.contains("restored"));

    Ok(())
}

#[sealed_test]
fn dry_run_previews_without_changes() -> Result<()> {
    let sandbox = Sandbox::new()?;
    sandbox.user_file(".config/starship.toml", "foo=bar")?;
    let before = sandbox.snapshot()?;

    let output = dotstrap(&sandbox, &["--dry-run", "--skip-tools"])?;
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(sandbox.snapshot()?, before);

    let log = fs::read_to_string("dotstrap.log")?;
    assert!(log.contains("would back up"));
    assert!(log
        .lines()
        .filter(|line| line.contains("would"))
        .all(|line| line.contains("dry_run")));

    Ok(())
}

#[sealed_test]
fn failed_dry_run_logs_error_in_span() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::remove_dir_all(sandbox.repo().join("config/ghostty"))?;

    let output = dotstrap(&sandbox, &["--dry-run", "--skip-tools"])?;
    assert_eq!(output.status.code(), Some(1));

    let log = fs::read_to_string("dotstrap.log")?;
    let errors = log.lines().filter(|line| line.contains("ERROR")).collect::<Vec<_>>();
    assert!(!errors.is_empty());
    assert!(errors.iter().all(|line| line.contains("dry_run")));

    Ok(())
}

#[sealed_test]
fn manifest_drives_link_plan() -> Result<()> {
    let sandbox = Sandbox::new()?;
    fs::write(
        sandbox.repo().join("dotstrap.toml"),
        "[[link]]\nsource = \"config/ghostty\"\ntarget = \".config/ghostty\"\n",
    )?;

    let output = dotstrap(&sandbox, &["--skip-tools"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(is_symlink(sandbox.home(".config/ghostty")));
    assert!(!sandbox.home(".config/starship.toml").exists());

    Ok(())
}

//! Thin wrappers over the `git` CLI

use crate::{
    error::OtoolsError,
    process::{CommandRunner, ExternalCommand},
};
use anyhow::Result;
use std::path::Path;

pub fn git(cwd: &Path) -> ExternalCommand {
    ExternalCommand::new("git").current_dir(cwd)
}

/// Branch checked out in `cwd`, `None` on a detached HEAD
pub fn current_branch(runner: &dyn CommandRunner, cwd: &Path) -> Result<Option<String>> {
    match runner.run(&git(cwd).args(["symbolic-ref", "--short", "HEAD"])) {
        Ok(out) => {
            let branch = out.trim();
            Ok((!branch.is_empty()).then(|| branch.to_string()))
        }
        Err(err) => match err.downcast_ref::<OtoolsError>() {
            Some(OtoolsError::CommandFailed { .. }) => Ok(None),
            _ => Err(err),
        },
    }
}

/// Parse `git config --get-regexp` output into `(key, value)` pairs
pub fn parse_config_entries(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| {
            let (key, value) = line.trim().split_once(char::is_whitespace)?;
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

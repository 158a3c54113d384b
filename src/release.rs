//! Release preparation: bumpversion, towncrier and the migration manifest

use crate::{
    error::OtoolsError,
    git,
    marabunta::MigrationFile,
    process::{CommandRunner, ExternalCommand},
    project::Project,
};
use anyhow::{Context, Result};
use clap::ValueEnum;
use regex::Regex;
use std::{fmt, fs, sync::OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReleaseType {
    Major,
    Minor,
    Patch,
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseType::Major => "major",
            ReleaseType::Minor => "minor",
            ReleaseType::Patch => "patch",
        })
    }
}

const END_TIPS: &str = "\
Please continue with the release by:
 * Checking the diff
 * Running:
\tgit add ... # pick the files
\tgit commit -m\"Release {version}\"
\tgit tag -a {version}  # optionally -s to sign the tag
\t# copy-paste the content of the release from HISTORY.rst in the annotation of the tag
\tgit push origin {branch} --tags";

pub fn end_tips(version: &str, branch: &str) -> String {
    END_TIPS
        .replace("{version}", version)
        .replace("{branch}", branch)
}

pub fn make_bumpversion_cmd(
    rel_type: ReleaseType,
    new_version: Option<&str>,
    dry_run: bool,
) -> ExternalCommand {
    let mut cmd = ExternalCommand::new("bumpversion");
    if let Some(version) = new_version {
        cmd = cmd.args(["--new-version", version]);
    }
    if dry_run {
        cmd = cmd.args(["--dry-run", "--list"]);
    }
    cmd.arg(rel_type.to_string())
}

pub fn make_towncrier_cmd(version: &str) -> ExternalCommand {
    ExternalCommand::new("towncrier")
        .args(["build", "--yes"])
        .arg(format!("--version={version}"))
}

fn section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]$").expect("section pattern is valid"))
}

fn entry_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^=:\s][^=:]*?)\s*[=:]\s*(.*)$").expect("entry pattern is valid")
    })
}

/// Look up `key` in the `[header]` section of INI-style content.
///
/// Lines before the first section header count as part of `header`, as the
/// header gets stripped from some tools' output (bumpversion's `--list`).
pub fn get_ini_cfg_key(content: &str, header: &str, key: &str) -> Result<String> {
    let mut current = header.to_string();
    for line in content.lines() {
        let line = line.trim_end();
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }
        if let Some(caps) = section_regex().captures(trimmed) {
            current = caps[1].trim().to_string();
            continue;
        }
        if current != header {
            continue;
        }
        if let Some(caps) = entry_regex().captures(trimmed) {
            if caps[1].trim().eq_ignore_ascii_case(key) {
                return Ok(caps[2].trim().to_string());
            }
        }
    }
    Err(OtoolsError::ParseError {
        source_cmd: format!("[{header}]"),
        reason: format!("no `{key}` key found"),
    }
    .into())
}

pub fn get_bumpversion_cfg_key(content: &str, key: &str) -> Result<String> {
    get_ini_cfg_key(content, "bumpversion", key)
}

/// What a `release bump` run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BumpOutcome {
    DryRun { new_version: String },
    Released { version: String, branch: Option<String> },
}

pub fn bump(
    runner: &dyn CommandRunner,
    project: &Project,
    rel_type: ReleaseType,
    new_version: Option<&str>,
    dry_run: bool,
) -> Result<BumpOutcome> {
    let cmd = make_bumpversion_cmd(rel_type, new_version, dry_run).current_dir(project.root());
    println!("Running: {cmd}");
    let output = runner.run(&cmd)?;
    if dry_run {
        let new_version = get_bumpversion_cfg_key(&output, "new_version")?;
        println!("New version: {new_version}");
        return Ok(BumpOutcome::DryRun { new_version });
    }

    let config = project.config()?;
    let version_file = project.build_path(&config.version_file_rel_path);
    let version = fs::read_to_string(&version_file)
        .with_context(|| format!("reading {}", version_file.display()))?
        .trim()
        .to_string();

    let cmd = make_towncrier_cmd(&version).current_dir(project.root());
    println!("Running: {cmd}");
    runner.run(&cmd)?;

    println!("Updating marabunta migration file");
    MigrationFile::new(project.build_path(&config.marabunta_mig_file_rel_path))
        .update(&version, crate::constants::DEFAULT_HOOK)?;

    let branch = git::current_branch(runner, project.root())?;
    if let Some(branch) = &branch {
        if !version.is_empty() {
            println!("{}", end_tips(&version, branch));
        }
    }
    Ok(BumpOutcome::Released { version, branch })
}

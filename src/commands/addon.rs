use crate::{
    error::OtoolsError,
    package::{Package, RequirementSource},
    project::Project,
    pypi::{PypiClient, PYPI_URL},
    ui,
};
use anyhow::Result;
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct RequirementArgs {
    /// Odoo module name, e.g. `sale_stock_available`
    pub name: String,
    /// Version to pin; the latest release on PyPI by default
    #[arg(long)]
    pub version: Option<String>,
    /// Install from a GitHub pull request instead of a release
    #[arg(long)]
    pub pr: Option<String>,
    /// Install the pull request's repository from the local checkout
    #[arg(long, requires = "pr")]
    pub editable: bool,
    /// Install from this branch of the company fork of the pull request's repository
    #[arg(long, requires = "pr", conflicts_with = "editable")]
    pub fork_branch: Option<String>,
}

impl RequirementArgs {
    pub fn source(&self) -> RequirementSource<'_> {
        match (self.pr.as_deref(), self.fork_branch.as_deref()) {
            (Some(pr), Some(branch)) => RequirementSource::ForkBranch { pr, branch },
            (Some(pr), None) if self.editable => RequirementSource::Editable(pr),
            (Some(pr), None) => RequirementSource::PullRequest(pr),
            (None, _) => RequirementSource::Release(self.version.as_deref()),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AddonCommands {
    /// Add an addon to requirements.txt
    #[command(disable_version_flag = true)]
    Add(RequirementArgs),
    /// Replace the requirement of an addon already in requirements.txt
    #[command(disable_version_flag = true)]
    Replace(RequirementArgs),
    /// Check a version against the addon's current requirement
    #[command(disable_version_flag = true)]
    Check { name: String, version: String },
}

impl AddonCommands {
    pub fn action(&self) -> &'static str {
        match self {
            AddonCommands::Add(_) => "add requirement",
            AddonCommands::Replace(_) => "replace requirement",
            AddonCommands::Check { .. } => "check requirement",
        }
    }
}

pub async fn run(cmd: AddonCommands, project: &Project) -> Result<()> {
    let client = PypiClient::new(PYPI_URL)?;
    match cmd {
        AddonCommands::Add(args) => {
            let pkg = Package::for_project(project, &args.name, &client).await?;
            if pkg.has_requirement()? {
                ui::ask_or_abort(&format!(
                    "{} is already required, replace its requirement?",
                    pkg.pypi_name
                ))?;
                let line = pkg.replace_requirement(args.source())?;
                println!("Replaced with: {line}");
                return Ok(());
            }
            let line = pkg.add_requirement(args.source())?;
            println!("Added: {line}");
        }
        AddonCommands::Replace(args) => {
            let pkg = Package::for_project(project, &args.name, &client).await?;
            if !pkg.has_requirement()? {
                if !ui::ask_confirmation(&format!("{} is not required yet, add it?", pkg.pypi_name))? {
                    return Err(OtoolsError::NotFound(format!("requirement for {}", pkg.pypi_name)).into());
                }
                let line = pkg.add_requirement(args.source())?;
                println!("Added: {line}");
                return Ok(());
            }
            let line = pkg.replace_requirement(args.source())?;
            println!("Replaced with: {line}");
        }
        AddonCommands::Check { name, version } => {
            let pkg = Package::for_project(project, &name, &client).await?;
            match pkg.requirement()? {
                Some(req) => println!("Current requirement: {}", req.line.trim()),
                None => println!("{} is not required yet", pkg.pypi_name),
            }
            if let Some(latest) = &pkg.latest_version {
                println!("Latest release: {latest}");
            }
            if pkg.has_pending_merge()? {
                println!("{} is installed from a pending merge", pkg.pypi_name);
            }
            if pkg.allowed_version(&version)? {
                println!("{version} is allowed");
            } else {
                println!("{version} is not allowed by the current requirement");
            }
        }
    }
    Ok(())
}

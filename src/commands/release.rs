use crate::{
    constants::{DEFAULT_HOOK, UPDATE_COMMAND},
    marabunta::MigrationFile,
    process::CommandRunner,
    project::Project,
    release::{bump, ReleaseType},
};
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum ReleaseCommands {
    /// Prepare a new release
    Bump {
        /// Version increment to use
        #[arg(long = "type", value_enum)]
        rel_type: ReleaseType,
        /// Explicit new version to create
        #[arg(long)]
        new_version: Option<String>,
        /// Only display the version number which would be generated
        #[arg(long)]
        dry_run: bool,
    },
    /// Record the module update step for a version in the migration file
    #[command(disable_version_flag = true)]
    UpdateMigration {
        version: String,
        #[arg(long, default_value = DEFAULT_HOOK)]
        hook: String,
    },
    /// List the modules upgraded by the migration file
    MigrationModules,
    /// List the versions whose hook already runs the module update
    VersionsWithHook {
        #[arg(long, default_value = DEFAULT_HOOK)]
        hook: String,
    },
}

impl ReleaseCommands {
    pub fn action(&self) -> &'static str {
        match self {
            ReleaseCommands::Bump { .. } => "bump release",
            ReleaseCommands::UpdateMigration { .. } => "update migration file",
            ReleaseCommands::MigrationModules => "list migration modules",
            ReleaseCommands::VersionsWithHook { .. } => "list versions",
        }
    }
}

pub async fn run(cmd: ReleaseCommands, project: &Project, runner: &dyn CommandRunner) -> Result<()> {
    let migration_file = || -> Result<MigrationFile> {
        let config = project.config()?;
        Ok(MigrationFile::new(
            project.build_path(&config.marabunta_mig_file_rel_path),
        ))
    };

    match cmd {
        ReleaseCommands::Bump {
            rel_type,
            new_version,
            dry_run,
        } => {
            bump(runner, project, rel_type, new_version.as_deref(), dry_run)?;
        }
        ReleaseCommands::UpdateMigration { version, hook } => {
            let file = migration_file()?;
            if file.update(&version, &hook)? {
                println!("Added `{UPDATE_COMMAND}` to {hook} operations of {version}");
            } else {
                println!("`{UPDATE_COMMAND}` already in {hook} operations of {version}");
            }
        }
        ReleaseCommands::MigrationModules => {
            for module in migration_file()?.migration_file_modules()? {
                println!("{module}");
            }
        }
        ReleaseCommands::VersionsWithHook { hook } => {
            for version in migration_file()?.versions_with_hook_command(&hook)? {
                println!("{version}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{commands::Commands, Cli};
    use clap::{error::ErrorKind, Parser};

    fn parse(args: &[&str]) -> Result<ReleaseCommands, clap::Error> {
        match Cli::try_parse_from(args)?.cmd {
            Some(Commands::Release { cmd }) => Ok(cmd),
            other => panic!("not a release command: {other:?}"),
        }
    }

    #[test]
    fn test_bump_requires_a_type() {
        let err = parse(&["otools", "release", "bump"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_bump_type_is_parsed() {
        match parse(&["otools", "release", "bump", "--type", "minor", "--dry-run"]).unwrap() {
            ReleaseCommands::Bump {
                rel_type,
                new_version,
                dry_run,
            } => {
                assert_eq!(rel_type, ReleaseType::Minor);
                assert_eq!(new_version, None);
                assert!(dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}

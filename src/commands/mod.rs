use crate::{process::SystemRunner, project::Project};
use anyhow::{Context, Result};
use clap::Subcommand;

pub mod addon;
pub mod completions;
pub mod db;
pub mod release;
pub mod secrets;
pub mod submodule;

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Local databases: list, dump, restore and share snapshots")]
    Db {
        #[command(subcommand)]
        cmd: db::DbCommands,
    },
    #[command(about = "Prepare releases and maintain the marabunta migration file")]
    Release {
        #[command(subcommand)]
        cmd: release::ReleaseCommands,
    },
    #[command(about = "Git submodules declared in .gitmodules")]
    Submodule {
        #[command(subcommand)]
        cmd: submodule::SubmoduleCommands,
    },
    #[command(about = "Addon requirements in requirements.txt")]
    Addon {
        #[command(subcommand)]
        cmd: addon::AddonCommands,
    },
    #[command(about = "Admin password generation and LastPass storage")]
    Secrets {
        #[command(subcommand)]
        cmd: secrets::SecretsCommands,
    },
    #[command(about = "Emit shell completion scripts (bash/zsh/fish)")]
    Completions { shell: String },
}

impl Commands {
    /// What the command does, as it reads in `Failed to <action>`
    pub fn action(&self) -> &'static str {
        match self {
            Commands::Db { cmd } => cmd.action(),
            Commands::Release { cmd } => cmd.action(),
            Commands::Submodule { cmd } => cmd.action(),
            Commands::Addon { cmd } => cmd.action(),
            Commands::Secrets { cmd } => cmd.action(),
            Commands::Completions { .. } => "generate completions",
        }
    }
}

pub async fn run(cmd: Commands) -> Result<()> {
    let action = cmd.action();
    dispatch(cmd)
        .await
        .with_context(|| format!("Failed to {action}"))
}

async fn dispatch(cmd: Commands) -> Result<()> {
    let runner = SystemRunner;
    match cmd {
        Commands::Db { cmd } => db::run(cmd, &Project::discover()?, &runner).await,
        Commands::Release { cmd } => release::run(cmd, &Project::discover()?, &runner).await,
        Commands::Submodule { cmd } => submodule::run(cmd, &Project::discover()?, &runner).await,
        Commands::Addon { cmd } => addon::run(cmd, &Project::discover()?).await,
        Commands::Secrets { cmd } => secrets::run(cmd, &Project::discover()?, &runner).await,
        Commands::Completions { shell } => completions::run(shell),
    }
}

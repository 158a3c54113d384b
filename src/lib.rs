//! # otools
//!
//! Developer-operations toolkit for Odoo projects built from the Camptocamp
//! cookiecutter template: database dumps and restores, release bumping,
//! submodules, addon requirements and admin password rotation.

use clap::Parser;

pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod db_container;
pub mod docker_compose;
pub mod dump_store;
pub mod error;
pub mod git;
pub mod github;
pub mod marabunta;
pub mod package;
pub mod path;
pub mod process;
pub mod project;
pub mod pypi;
pub mod release;
pub mod requirement;
pub mod secrets;
pub mod submodule;
pub mod ui;

/// Odoo project developer tools
///
/// Every command runs against the project enclosing the current directory,
/// found by looking for `.cookiecutter.context.yml` upwards.
#[derive(Parser, Debug)]
#[command(
    name = "otools",
    version,
    propagate_version = true,
    about = "Developer tools for cookiecutter-based Odoo projects",
    long_about = "Developer tools for cookiecutter-based Odoo projects.\n\nManages local databases through docker compose, prepares releases and their\nmarabunta migration steps, and edits submodules and addon requirements."
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Option<commands::Commands>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

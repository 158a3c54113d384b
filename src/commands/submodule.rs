use crate::{
    process::CommandRunner,
    project::Project,
    submodule::{addons_path_dockerfile, Submodules},
};
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum SubmoduleCommands {
    /// List submodule paths, formatted for the Dockerfile's ADDONS_PATH by default
    List {
        /// List the raw paths instead of the Dockerfile format
        #[arg(long)]
        no_dockerfile: bool,
    },
    /// Add every submodule declared in .gitmodules
    Init,
    /// Synchronize and update one submodule
    Update { path: String },
}

impl SubmoduleCommands {
    pub fn action(&self) -> &'static str {
        match self {
            SubmoduleCommands::List { .. } => "list submodules",
            SubmoduleCommands::Init => "init submodules",
            SubmoduleCommands::Update { .. } => "update submodule",
        }
    }
}

fn print_paths(submodules: &Submodules<'_>, dockerfile: bool) -> Result<()> {
    let paths = submodules.paths()?;
    if dockerfile {
        println!("{}", addons_path_dockerfile(&paths));
    } else {
        for path in paths {
            println!("{path}");
        }
    }
    Ok(())
}

pub async fn run(cmd: SubmoduleCommands, project: &Project, runner: &dyn CommandRunner) -> Result<()> {
    let submodules = Submodules::new(runner, project.root());
    match cmd {
        SubmoduleCommands::List { no_dockerfile } => print_paths(&submodules, !no_dockerfile)?,
        SubmoduleCommands::Init => {
            let branch = project.manifest()?.odoo_version(true)?;
            let added = submodules.init(&branch)?;
            println!("Submodules added: {}", added.len());
            println!();
            println!("You can now update odoo/Dockerfile with this addons-path:");
            println!();
            print_paths(&submodules, true)?;
        }
        SubmoduleCommands::Update { path } => {
            submodules.update(&path)?;
            println!("Submodule {path} updated");
        }
    }
    Ok(())
}

use crate::{
    constants::DEFAULT_DB_NAME,
    db::{render_versions_table, Database},
    dump_store::{DumpLocation, DumpStore},
    error::OtoolsError,
    path::{expand_user, make_dir},
    process::CommandRunner,
    project::Project,
    ui,
};
use anyhow::{Context, Result};
use clap::Subcommand;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// List all databases in the container
    List,
    /// Print a table of databases with their marabunta version and install date
    ListVersions,
    /// Restore a PostgreSQL dump to a new database
    RestoreDump {
        /// Dump file; pick one of the `*.pg` files of the current directory when omitted
        dump_path: Option<String>,
        /// Database to restore to; defaults to the dump's file name without extension
        #[arg(long)]
        db_name: Option<String>,
        /// Load the dump into this template database and create the database from it
        #[arg(long)]
        template: Option<String>,
    },
    /// Create a database as a copy of a template database
    CreateFromTemplate {
        template: String,
        #[arg(long, default_value = DEFAULT_DB_NAME)]
        db_name: String,
    },
    /// Download a dump from the remote store and restore it
    DownloadRestore {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        /// Environment (prod, int, labs.<lab-name>)
        #[arg(long, default_value = "int")]
        env: String,
        /// Dump to download; the latest one by default
        #[arg(long)]
        dump_name: Option<String>,
        #[arg(long, default_value = ".")]
        dumpdir: String,
        #[arg(long)]
        restore_db: Option<String>,
    },
    /// Create a PostgreSQL dump of a database
    Dump {
        #[arg(long, default_value = DEFAULT_DB_NAME)]
        db_name: String,
        #[arg(long, default_value = ".")]
        path: String,
    },
    /// Create a dump and share it on the remote store
    DumpAndShare {
        #[arg(long)]
        platform: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long, default_value = "int")]
        env: String,
        #[arg(long, default_value = DEFAULT_DB_NAME)]
        db_name: String,
        #[arg(long, default_value = "/tmp")]
        tmp_path: String,
        /// Keep the generated dump once uploaded
        #[arg(long)]
        keep_local_dump: bool,
    },
}

impl DbCommands {
    pub fn action(&self) -> &'static str {
        match self {
            DbCommands::List => "list databases",
            DbCommands::ListVersions => "list versions",
            DbCommands::RestoreDump { .. } => "restore dump",
            DbCommands::CreateFromTemplate { .. } => "create database from template",
            DbCommands::DownloadRestore { .. } => "download and restore",
            DbCommands::Dump { .. } => "create dump",
            DbCommands::DumpAndShare { .. } => "dump and share",
        }
    }
}

fn default_db_name(dump_path: &Path) -> Result<String> {
    dump_path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| OtoolsError::Config(format!("cannot name a database after {}", dump_path.display())).into())
}

/// `*.pg` files directly under `dir`, sorted by name
fn local_dumps(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dumps = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "pg") {
            dumps.push(path);
        }
    }
    dumps.sort();
    Ok(dumps)
}

fn pick_local_dump() -> Result<PathBuf> {
    let cwd = env::current_dir().context("reading the current directory")?;
    let mut dumps = local_dumps(&cwd)?;
    if dumps.is_empty() {
        return Err(OtoolsError::NotFound(format!("*.pg dumps in {}", cwd.display())).into());
    }
    let names: Vec<String> = dumps
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    let index = ui::select("Dump to restore", &names)?;
    Ok(dumps.swap_remove(index))
}

/// Restore `dump_path`, asking before any existing database is overwritten.
///
/// Returns the restored database, or `None` when the user kept the existing one.
fn restore(
    database: &Database<'_>,
    dump_path: &Path,
    db_name: Option<String>,
    template: Option<&str>,
) -> Result<Option<String>> {
    let db_name = match db_name {
        Some(name) => name,
        None => default_db_name(dump_path)?,
    };
    let confirm = &mut |message: &str| ui::ask_confirmation(message);
    let restored = match template {
        Some(template) => {
            database.restore_dump_via_template(&db_name, template, dump_path, confirm)?
        }
        None => database.restore_dump(&db_name, dump_path, confirm)?,
    };
    if !restored {
        println!("Database {db_name} left unchanged");
        return Ok(None);
    }
    println!("Dump successfully restored to {db_name}");
    Ok(Some(db_name))
}

fn print_run_hint(db_name: &str) {
    if db_name != DEFAULT_DB_NAME {
        println!("You can run Odoo on this DB:");
        println!("docker compose run --rm -e DB_NAME={db_name} -p 8069:8069 odoo odoo --workers=0");
    }
}

pub async fn run(cmd: DbCommands, project: &Project, runner: &dyn CommandRunner) -> Result<()> {
    let config = project.config()?;
    let database = Database::new(runner, config);

    match cmd {
        DbCommands::List => {
            let db_list = database.get_db_list()?;
            if db_list.is_empty() {
                println!("No databases found");
                return Ok(());
            }
            println!("Databases:");
            for db_name in db_list {
                println!("  {db_name}");
            }
        }
        DbCommands::ListVersions => {
            let versions = database.list_versions()?;
            if versions.is_empty() {
                println!("No databases found");
                return Ok(());
            }
            print!("{}", render_versions_table(&versions));
        }
        DbCommands::RestoreDump {
            dump_path,
            db_name,
            template,
        } => {
            let dump_path = match dump_path {
                Some(path) => expand_user(&path),
                None => pick_local_dump()?,
            };
            if let Some(db_name) = restore(&database, &dump_path, db_name, template.as_deref())? {
                print_run_hint(&db_name);
            }
        }
        DbCommands::CreateFromTemplate { template, db_name } => {
            let confirm = &mut |message: &str| ui::ask_confirmation(message);
            if database.create_from_template(&db_name, &template, confirm)? {
                print_run_hint(&db_name);
            } else {
                println!("Database {db_name} left unchanged");
            }
        }
        DbCommands::DownloadRestore {
            platform,
            customer,
            env,
            dump_name,
            dumpdir,
            restore_db,
        } => {
            let loc = DumpLocation::resolve(project, platform, customer, env)?;
            let store = DumpStore::new(runner, config.dump_tool.clone());

            let dump_name = match dump_name {
                Some(name) => name,
                None => store.list_dumps(&loc)?.pop().ok_or_else(|| {
                    OtoolsError::NotFound(format!(
                        "dumps for {} on {} {}",
                        loc.customer, loc.platform, loc.env
                    ))
                })?,
            };

            let dumpdir = expand_user(&dumpdir);
            make_dir(&dumpdir)?;
            // the store decrypts `<name>.pg.gpg` into `<name>.pg`
            let file_name = Path::new(&dump_name)
                .file_stem()
                .map(PathBuf::from)
                .ok_or_else(|| OtoolsError::Config(format!("invalid dump name {dump_name}")))?;
            let dump_path = dumpdir.join(&file_name);

            if dump_path.is_file() {
                println!("File {} already exists, skipping download.", file_name.display());
            } else {
                println!("Downloading dump: {dump_name}");
                println!("From: {} {} of {}", loc.platform, loc.env, loc.customer);
                println!("To: {}", dumpdir.display());
                store.download(&loc, &dump_name, &dumpdir)?;
            }
            restore(&database, &dump_path, restore_db, None)?;
        }
        DbCommands::Dump { db_name, path } => {
            let project_name = project.manifest()?.project_name()?;
            let path = database.dump(&db_name, &expand_user(&path), project_name)?;
            println!("Dump successfully generated at {}", path.display());
        }
        DbCommands::DumpAndShare {
            platform,
            customer,
            env,
            db_name,
            tmp_path,
            keep_local_dump,
        } => {
            let loc = DumpLocation::resolve(project, platform, customer, env)?;
            let project_name = project.manifest()?.project_name()?;
            let path = database.dump(&db_name, &expand_user(&tmp_path), project_name)?;
            println!("Dump successfully generated at {}", path.display());

            DumpStore::new(runner, config.dump_tool.clone()).upload(&loc, &path)?;
            println!(
                "Dump uploaded for {} on {} {}",
                loc.customer, loc.platform, loc.env
            );

            if !keep_local_dump {
                fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
                println!("Local dump file removed");
            }
        }
    }
    Ok(())
}

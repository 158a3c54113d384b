//! Database lifecycle in the project's compose stack
//!
//! Listing and dumping go through `psql`/`pg_dump` on the host against the
//! published port of the database service, wrapped in the readiness gate so the
//! container is only left running if it already was. Restores go through a
//! one-off Odoo container which ships the PostgreSQL client tools.

use crate::{
    config::ToolConfig,
    db_container::DbContainer,
    docker_compose::{self, RunOptions},
    error::OtoolsError,
    process::{CommandRunner, ExternalCommand},
};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

const DB_LIST_SQL: &str =
    "SELECT datname FROM pg_database WHERE NOT datistemplate AND datname <> 'postgres' ORDER BY datname";
const ALL_DB_NAMES_SQL: &str = "SELECT datname FROM pg_database";
const LATEST_VERSION_SQL: &str =
    "SELECT date_done, number FROM marabunta_version ORDER BY date_done DESC LIMIT 1";
const FIELD_SEPARATOR: &str = "|";
const UNKNOWN: &str = "unknown";

/// Latest migration applied on one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbVersion {
    pub db_name: String,
    pub version: String,
    pub date_done: Option<NaiveDate>,
}

pub struct Database<'r> {
    runner: &'r dyn CommandRunner,
    container: DbContainer<'r>,
    odoo_service: String,
    user: String,
    password: String,
}

impl<'r> Database<'r> {
    pub fn new(runner: &'r dyn CommandRunner, config: &ToolConfig) -> Self {
        Database {
            runner,
            container: DbContainer::new(runner, config.db_service.clone()),
            odoo_service: config.odoo_service.clone(),
            user: config.db_user.clone(),
            password: config.db_password.clone(),
        }
    }

    /// Override the readiness gate polling, mostly for tests
    pub fn with_gate_retry(mut self, retries: usize, delay: Duration) -> Self {
        self.container = self.container.with_retry(retries, delay);
        self
    }

    fn psql(&self, port: u16, db_name: &str, sql: &str) -> ExternalCommand {
        ExternalCommand::new("psql")
            .args(["-h", "localhost", "-p"])
            .arg(port.to_string())
            .args(["-U", self.user.as_str(), "-d", db_name])
            .args(["-At", "-F", FIELD_SEPARATOR, "-c", sql])
            .env("PGPASSWORD", self.password.as_str())
    }

    /// Run `sql` on `db_name` and split the unaligned output into rows of fields
    fn execute(&self, port: u16, db_name: &str, sql: &str) -> Result<Vec<Vec<String>>> {
        let output = self.runner.run(&self.psql(port, db_name, sql))?;
        Ok(output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split(FIELD_SEPARATOR).map(str::to_string).collect())
            .collect())
    }

    fn db_names(&self, port: u16) -> Result<Vec<String>> {
        Ok(self
            .execute(port, "postgres", DB_LIST_SQL)?
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }

    /// Non-template databases of the container, sorted by name
    pub fn get_db_list(&self) -> Result<Vec<String>> {
        self.container.with_up(|port| self.db_names(port))
    }

    /// Latest marabunta version of every database, most recently installed first.
    ///
    /// Databases without a `marabunta_version` table are reported as `unknown`.
    pub fn list_versions(&self) -> Result<Vec<DbVersion>> {
        let mut versions = self.container.with_up(|port| {
            let mut versions = Vec::new();
            for db_name in self.db_names(port)? {
                let version = match self.execute(port, &db_name, LATEST_VERSION_SQL) {
                    Ok(rows) => version_from_rows(&db_name, rows),
                    Err(err) => match err.downcast_ref::<OtoolsError>() {
                        Some(OtoolsError::CommandFailed { stderr, .. }) => {
                            tracing::debug!(db = %db_name, %stderr, "no marabunta version");
                            unknown_version(&db_name)
                        }
                        _ => return Err(err),
                    },
                };
                versions.push(version);
            }
            Ok(versions)
        })?;
        // `None` sorts first, so reversing puts unknown dates last
        versions.sort_by(|a, b| b.date_done.cmp(&a.date_done));
        Ok(versions)
    }

    /// Whether any database, templates included, is named `db_name`
    pub fn database_exists(&self, db_name: &str) -> Result<bool> {
        self.container.with_up(|port| {
            Ok(self
                .execute(port, "postgres", ALL_DB_NAMES_SQL)?
                .iter()
                .any(|row| row.first().map(String::as_str) == Some(db_name)))
        })
    }

    /// Run a PostgreSQL client tool in a one-off Odoo container
    fn run_client(&self, args: &[&str]) -> Result<String> {
        let rm = RunOptions {
            rm: true,
            ..Default::default()
        };
        self.runner.run(&docker_compose::run(&self.odoo_service, args, &rm))
    }

    fn drop_database(&self, db_name: &str) -> Result<()> {
        self.run_client(&["dropdb", db_name])?;
        println!("Database {db_name} dropped");
        Ok(())
    }

    /// Drop `db_name` if it exists and `confirm` agrees to overwrite it.
    ///
    /// Returns `false` when the existing database is kept.
    fn make_room(
        &self,
        label: &str,
        db_name: &str,
        confirm: &mut dyn FnMut(&str) -> Result<bool>,
    ) -> Result<bool> {
        if !self.database_exists(db_name)? {
            return Ok(true);
        }
        if !confirm(&format!("{label} {db_name} already exists. Overwrite?"))? {
            return Ok(false);
        }
        self.drop_database(db_name)?;
        Ok(true)
    }

    /// Create `db_name` and restore `dump_path` into it.
    ///
    /// An existing `db_name` is only dropped once `confirm` agrees; returns
    /// `false` when it is kept and nothing was restored.
    pub fn restore_dump(
        &self,
        db_name: &str,
        dump_path: &Path,
        confirm: &mut dyn FnMut(&str) -> Result<bool>,
    ) -> Result<bool> {
        ensure_dump(dump_path)?;
        if !self.make_room("Database", db_name, confirm)? {
            return Ok(false);
        }
        self.load(db_name, dump_path)?;
        Ok(true)
    }

    /// Create `db_name` as a copy of the `template` database
    pub fn create_from_template(
        &self,
        db_name: &str,
        template: &str,
        confirm: &mut dyn FnMut(&str) -> Result<bool>,
    ) -> Result<bool> {
        if !self.make_room("Database", db_name, confirm)? {
            return Ok(false);
        }
        self.run_client(&["createdb", "-O", self.user.as_str(), "-T", template, db_name])?;
        println!("Database {db_name} created from template {template}");
        Ok(true)
    }

    /// Restore `dump_path` into `template`, then create `db_name` from it.
    ///
    /// When `template` already exists and is kept, the dump is not loaded and
    /// `db_name` is copied from the existing template.
    pub fn restore_dump_via_template(
        &self,
        db_name: &str,
        template: &str,
        dump_path: &Path,
        confirm: &mut dyn FnMut(&str) -> Result<bool>,
    ) -> Result<bool> {
        ensure_dump(dump_path)?;
        if self.make_room("Template database", template, confirm)? {
            self.load(template, dump_path)?;
        } else {
            println!("Keeping template database {template}");
        }
        self.create_from_template(db_name, template, confirm)
    }

    fn load(&self, db_name: &str, dump_path: &Path) -> Result<()> {
        self.run_client(&["createdb", "-O", self.user.as_str(), db_name])?;
        println!("Restoring {} to {db_name}", dump_path.display());

        let piped = RunOptions {
            rm: true,
            no_tty: true,
            ..Default::default()
        };
        let restore = docker_compose::run(
            &self.odoo_service,
            &["pg_restore", "-O", "-d", db_name],
            &piped,
        )
        .stdin_file(dump_path);
        self.runner.run(&restore)?;
        Ok(())
    }

    /// Dump `db_name` in custom format into `dir` and return the file path
    pub fn dump(&self, db_name: &str, dir: &Path, project_name: &str) -> Result<PathBuf> {
        self.container.with_up(|port| {
            let file_name = dump_file_name(
                &current_username(),
                project_name,
                chrono::Local::now().naive_local(),
            );
            let path = dir.join(file_name);
            let cmd = ExternalCommand::new("pg_dump")
                .args(["-h", "localhost", "-p"])
                .arg(port.to_string())
                .args(["--format=c", "-U", self.user.as_str(), "--file"])
                .arg(path.display().to_string())
                .arg(db_name)
                .env("PGPASSWORD", self.password.as_str());
            self.runner.run(&cmd)?;
            Ok(path)
        })
    }
}

fn ensure_dump(dump_path: &Path) -> Result<()> {
    if dump_path.is_file() {
        Ok(())
    } else {
        Err(OtoolsError::NotFound(format!("dump {}", dump_path.display())).into())
    }
}

fn unknown_version(db_name: &str) -> DbVersion {
    DbVersion {
        db_name: db_name.to_string(),
        version: UNKNOWN.to_string(),
        date_done: None,
    }
}

fn version_from_rows(db_name: &str, rows: Vec<Vec<String>>) -> DbVersion {
    match rows.into_iter().next().as_deref() {
        Some([date_done, number, ..]) => DbVersion {
            db_name: db_name.to_string(),
            version: number.clone(),
            date_done: parse_date(date_done),
        },
        _ => unknown_version(db_name),
    }
}

/// Date part of a PostgreSQL timestamp such as `2024-03-01 10:12:44.123456`
fn parse_date(timestamp: &str) -> Option<NaiveDate> {
    timestamp
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

pub fn dump_file_name(username: &str, project_name: &str, at: NaiveDateTime) -> String {
    format!("{username}_{project_name}-{}.pg", at.format("%Y%m%d-%H%M%S"))
}

/// Login name from the environment, the same lookup order as most shells' `whoami` fallbacks
pub fn current_username() -> String {
    ["LOGNAME", "USER", "LNAME", "USERNAME"]
        .iter()
        .find_map(|var| env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "odoo".to_string())
}

/// Render the `db list-versions` table
pub fn render_versions_table(versions: &[DbVersion]) -> String {
    let size1 = versions.iter().map(|v| v.db_name.len()).max().unwrap_or(0) + 1;
    let size2 = versions.iter().map(|v| v.version.len()).max().unwrap_or(0) + 1;
    let size3 = 12;

    let header = format!(
        "{:<w1$}{:<w2$}{:<w3$}",
        "DB Name",
        "Version",
        "Install date",
        w1 = size1 + 1,
        w2 = size2 + 1,
        w3 = size3 + 1
    );
    let mut lines = vec![
        header.trim_end().to_string(),
        "=".repeat(4 + size1 + size2 + size3),
    ];
    for v in versions {
        let date = v
            .date_done
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| UNKNOWN.to_string());
        let row = format!(
            "{:<size1$} {:<size2$} {:<12}",
            v.db_name, v.version, date
        );
        lines.push(row.trim_end().to_string());
    }
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ScriptedRunner;
    use std::fs;
    use tempfile::TempDir;

    const PROBE: &str = "docker compose port db 5432";
    const START: &str = "docker compose up -d db";
    const STOP: &str = "docker compose stop db";

    fn db(runner: &ScriptedRunner) -> Database<'_> {
        Database::new(runner, &ToolConfig::default()).with_gate_retry(3, Duration::ZERO)
    }

    fn psql(db_name: &str, sql: &str) -> String {
        format!("psql -h localhost -p 15432 -U odoo -d {db_name} -At -F | -c {sql}")
    }

    /// Answer every overwrite question with `reply`, keeping the questions asked
    fn answer(reply: bool, asked: &mut Vec<String>) -> impl FnMut(&str) -> Result<bool> + '_ {
        move |question: &str| {
            asked.push(question.to_string());
            Ok(reply)
        }
    }

    fn dump_file(dir: &TempDir) -> PathBuf {
        let dump = dir.path().join("prod.pg");
        fs::write(&dump, b"PGDMP").unwrap();
        dump
    }

    fn pg_restore(db_name: &str, dump: &Path) -> String {
        format!(
            "docker compose run --rm -T odoo pg_restore -O -d {db_name} < {}",
            dump.display()
        )
    }

    #[test]
    fn test_get_db_list_starts_and_stops_container() {
        let runner = ScriptedRunner::new()
            .push_err("service not running")
            .push_ok("")
            .push_ok("0.0.0.0:15432\n")
            .push_ok("odoodb\nother\n");

        assert_eq!(db(&runner).get_db_list().unwrap(), vec!["odoodb", "other"]);
        assert_eq!(
            runner.calls(),
            vec![
                PROBE.to_string(),
                START.to_string(),
                PROBE.to_string(),
                psql("postgres", DB_LIST_SQL),
                STOP.to_string(),
            ]
        );
    }

    #[test]
    fn test_list_versions_sorted_with_unknowns_last() {
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("bare\nold\nrecent\n")
            .push_err("relation \"marabunta_version\" does not exist")
            .push_ok("2023-05-02 08:00:00.5|16.0.1.0.0\n")
            .push_ok("2024-01-10 17:30:00|16.0.2.0.0\n");

        let versions = db(&runner).list_versions().unwrap();
        let names: Vec<_> = versions.iter().map(|v| v.db_name.as_str()).collect();
        assert_eq!(names, vec!["recent", "old", "bare"]);
        assert_eq!(versions[0].version, "16.0.2.0.0");
        assert_eq!(
            versions[0].date_done,
            NaiveDate::from_ymd_opt(2024, 1, 10)
        );
        assert_eq!(versions[2], unknown_version("bare"));
        // already running: no stop
        assert!(!runner.calls().contains(&STOP.to_string()));
    }

    #[test]
    fn test_render_versions_table() {
        let table = render_versions_table(&[
            DbVersion {
                db_name: "odoodb".into(),
                version: "16.0.1.0.0".into(),
                date_done: NaiveDate::from_ymd_opt(2024, 1, 10),
            },
            unknown_version("x"),
        ]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "DB Name Version     Install date");
        assert_eq!(lines[1], "=".repeat(4 + 7 + 11 + 12));
        assert_eq!(lines[2], "odoodb  16.0.1.0.0  2024-01-10");
        assert_eq!(lines[3], "x       unknown     unknown");
    }

    #[test]
    fn test_restore_dump_commands() {
        let dir = TempDir::new().unwrap();
        let dump = dump_file(&dir);
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("postgres\ntemplate0\nodoodb\n");
        let mut asked = Vec::new();

        assert!(db(&runner)
            .restore_dump("prod", &dump, &mut answer(true, &mut asked))
            .unwrap());
        assert!(asked.is_empty());
        assert_eq!(
            runner.calls(),
            vec![
                PROBE.to_string(),
                psql("postgres", ALL_DB_NAMES_SQL),
                "docker compose run --rm odoo createdb -O odoo prod".to_string(),
                pg_restore("prod", &dump),
            ]
        );
    }

    #[test]
    fn test_restore_over_existing_db_drops_it_once_confirmed() {
        let dir = TempDir::new().unwrap();
        let dump = dump_file(&dir);
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("odoodb\nprod\n");
        let mut asked = Vec::new();

        assert!(db(&runner)
            .restore_dump("prod", &dump, &mut answer(true, &mut asked))
            .unwrap());
        assert_eq!(asked, vec!["Database prod already exists. Overwrite?"]);
        assert_eq!(
            runner.calls()[2..],
            [
                "docker compose run --rm odoo dropdb prod".to_string(),
                "docker compose run --rm odoo createdb -O odoo prod".to_string(),
                pg_restore("prod", &dump),
            ]
        );
    }

    #[test]
    fn test_restore_over_existing_db_declined() {
        let dir = TempDir::new().unwrap();
        let dump = dump_file(&dir);
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("prod\n");
        let mut asked = Vec::new();

        assert!(!db(&runner)
            .restore_dump("prod", &dump, &mut answer(false, &mut asked))
            .unwrap());
        assert_eq!(asked.len(), 1);
        assert_eq!(
            runner.calls(),
            vec![PROBE.to_string(), psql("postgres", ALL_DB_NAMES_SQL)]
        );
    }

    #[test]
    fn test_existing_db_name_must_match_exactly() {
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("prod_copy\nprod2\n");
        assert!(!db(&runner).database_exists("prod").unwrap());
    }

    #[test]
    fn test_restore_via_new_template() {
        let dir = TempDir::new().unwrap();
        let dump = dump_file(&dir);
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("odoodb\n")
            .push_ok("")
            .push_ok("")
            .push_ok("0.0.0.0:15432\n")
            .push_ok("odoodb\nprod_template\n");
        let mut asked = Vec::new();

        assert!(db(&runner)
            .restore_dump_via_template("prod", "prod_template", &dump, &mut answer(true, &mut asked))
            .unwrap());
        assert!(asked.is_empty());
        assert_eq!(
            runner.calls(),
            vec![
                PROBE.to_string(),
                psql("postgres", ALL_DB_NAMES_SQL),
                "docker compose run --rm odoo createdb -O odoo prod_template".to_string(),
                pg_restore("prod_template", &dump),
                PROBE.to_string(),
                psql("postgres", ALL_DB_NAMES_SQL),
                "docker compose run --rm odoo createdb -O odoo -T prod_template prod".to_string(),
            ]
        );
    }

    #[test]
    fn test_kept_template_is_copied_without_loading_the_dump() {
        let dir = TempDir::new().unwrap();
        let dump = dump_file(&dir);
        let runner = ScriptedRunner::new()
            .push_ok("0.0.0.0:15432\n")
            .push_ok("prod_template\n")
            .push_ok("0.0.0.0:15432\n")
            .push_ok("prod_template\n");
        let mut asked = Vec::new();

        assert!(db(&runner)
            .restore_dump_via_template("prod", "prod_template", &dump, &mut answer(false, &mut asked))
            .unwrap());
        assert_eq!(
            asked,
            vec!["Template database prod_template already exists. Overwrite?"]
        );
        let calls = runner.calls();
        assert!(!calls.iter().any(|c| c.contains("pg_restore")));
        assert_eq!(
            calls.last().unwrap(),
            "docker compose run --rm odoo createdb -O odoo -T prod_template prod"
        );
    }

    #[test]
    fn test_restore_missing_dump() {
        let runner = ScriptedRunner::new();
        let err = db(&runner)
            .restore_dump("prod", Path::new("/nonexistent/prod.pg"), &mut |_: &str| Ok(true))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtoolsError>(),
            Some(OtoolsError::NotFound(_))
        ));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_dump_runs_pg_dump_inside_gate() {
        let runner = ScriptedRunner::new()
            .push_err("not running")
            .push_ok("")
            .push_ok("127.0.0.1:15432");
        let path = db(&runner)
            .dump("odoodb", Path::new("/tmp"), "acme_odoo")
            .unwrap();

        let file_name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(file_name.contains("_acme_odoo-"));
        assert!(file_name.ends_with(".pg"));
        let calls = runner.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(
            calls[3],
            format!(
                "pg_dump -h localhost -p 15432 --format=c -U odoo --file {} odoodb",
                path.display()
            )
        );
        assert_eq!(calls[4], STOP);
    }

    #[test]
    fn test_dump_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 5, 9)
            .unwrap();
        assert_eq!(
            dump_file_name("jdoe", "acme_odoo", at),
            "jdoe_acme_odoo-20240229-130509.pg"
        );
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-01 10:12:44.123456"),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("yesterday, probably"), None);
    }
}

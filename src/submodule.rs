//! Git submodules declared in `.gitmodules`

use crate::{
    constants::GITMODULES_FILE,
    error::OtoolsError,
    git::{git, parse_config_entries},
    process::CommandRunner,
};
use anyhow::Result;
use std::path::Path;

const EXCLUDED_FROM_ADDONS_PATH: &[&str] = &["odoo/src"];
const EXTRA_ADDONS_PATHS: &[&str] = &["odoo/src/addons", "odoo/local-src"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    pub path: String,
    pub url: String,
}

pub struct Submodules<'r> {
    runner: &'r dyn CommandRunner,
    root: &'r Path,
}

impl<'r> Submodules<'r> {
    pub fn new(runner: &'r dyn CommandRunner, root: &'r Path) -> Self {
        Submodules { runner, root }
    }

    fn gitmodules(&self) -> Result<String> {
        let path = self.root.join(GITMODULES_FILE);
        if !path.is_file() {
            return Err(OtoolsError::NotFound(path.display().to_string()).into());
        }
        Ok(path.display().to_string())
    }

    /// Submodule paths in `.gitmodules` order
    pub fn paths(&self) -> Result<Vec<String>> {
        let gitmodules = self.gitmodules()?;
        let out = self.runner.run(
            &git(self.root).args(["config", "--file", gitmodules.as_str(), "--get-regexp", "path"]),
        )?;
        Ok(parse_config_entries(&out)
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    }

    pub fn list(&self) -> Result<Vec<Submodule>> {
        let gitmodules = self.gitmodules()?;
        let out = self.runner.run(&git(self.root).args([
            "config",
            "-f",
            gitmodules.as_str(),
            "--get-regexp",
            r"^submodule\..*\.path$",
        ]))?;
        let mut submodules = Vec::new();
        for (path_key, path) in parse_config_entries(&out) {
            let url_key = format!("{}.url", path_key.trim_end_matches(".path"));
            let url = self.runner.run(
                &git(self.root).args(["config", "-f", gitmodules.as_str(), "--get", url_key.as_str()]),
            )?;
            submodules.push(Submodule {
                path,
                url: url.trim().to_string(),
            });
        }
        Ok(submodules)
    }

    /// `git submodule add -b <branch>` every declared submodule, returning the ones added.
    ///
    /// Submodules git refuses to add, usually because they are registered already,
    /// are skipped.
    pub fn init(&self, branch: &str) -> Result<Vec<Submodule>> {
        let mut added = Vec::new();
        for submodule in self.list()? {
            let cmd = git(self.root).args([
                "submodule",
                "add",
                "-b",
                branch,
                submodule.url.as_str(),
                submodule.path.as_str(),
            ]);
            match self.runner.run(&cmd) {
                Ok(_) => added.push(submodule),
                Err(err) => tracing::info!(path = %submodule.path, error = %err, "submodule not added"),
            }
        }
        Ok(added)
    }

    pub fn update(&self, path: &str) -> Result<()> {
        self.runner
            .run(&git(self.root).args(["submodule", "sync", "--", path]))?;
        self.runner
            .run(&git(self.root).args(["submodule", "update", "--init", "--", path]))?;
        Ok(())
    }
}

/// Render submodule paths as the `ADDONS_PATH` line of the project Dockerfile
pub fn addons_path_dockerfile(paths: &[String]) -> String {
    let lines: Vec<String> = paths
        .iter()
        .map(String::as_str)
        .filter(|p| !EXCLUDED_FROM_ADDONS_PATH.contains(p))
        .chain(EXTRA_ADDONS_PATHS.iter().copied())
        .map(|p| format!("/opt/{p}"))
        .collect();
    format!("ENV ADDONS_PATH=\"{}\" \\\n", lines.join(", \\\n"))
}

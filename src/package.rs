use crate::{
    constants::REQUIREMENTS_FILE,
    project::Project,
    pypi::{odoo_name_to_pkg_name, PypiClient},
    requirement::{
        make_requirement_line, make_requirement_line_for_editable, make_requirement_line_for_pr,
        make_requirement_line_for_proj_fork, Requirement, RequirementsFile,
    },
};
use crate::github::parse_github_url;
use anyhow::Result;

/// First Odoo serie whose projects install addons without the `setup/` wrapper
const WOOL_MAJOR: u32 = 17;

/// Where the requirement line points the installer to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementSource<'a> {
    /// A release from the index; the latest one when no version is given
    Release(Option<&'a str>),
    PullRequest(&'a str),
    /// Local checkout of the pull request's repository
    Editable(&'a str),
    /// Branch of the company fork of the pull request's repository
    ForkBranch { pr: &'a str, branch: &'a str },
}

/// An addon as known by the index and by the project's requirements
pub struct Package {
    pub name: String,
    pub pypi_name: String,
    pub latest_version: Option<String>,
    pub use_wool: bool,
    dev_src: String,
    fork_upstream: String,
    requirements: RequirementsFile,
}

impl Package {
    pub fn new(
        name: &str,
        odoo_serie: Option<&str>,
        requirements: RequirementsFile,
        dev_src: impl Into<String>,
        fork_upstream: impl Into<String>,
    ) -> Self {
        let use_wool = odoo_serie
            .and_then(|s| s.split('.').next())
            .and_then(|major| major.parse::<u32>().ok())
            .is_some_and(|major| major >= WOOL_MAJOR);
        Package {
            name: name.to_string(),
            pypi_name: odoo_name_to_pkg_name(name, odoo_serie),
            latest_version: None,
            use_wool,
            dev_src: dev_src.into(),
            fork_upstream: fork_upstream.into(),
            requirements,
        }
    }

    /// Resolve `name` against the project's serie and look up its latest release
    pub async fn for_project(project: &Project, name: &str, client: &PypiClient) -> Result<Self> {
        let serie = project.manifest()?.odoo_version(true)?;
        let config = project.config()?;
        let mut package = Package::new(
            name,
            Some(&serie),
            RequirementsFile::new(project.build_path(REQUIREMENTS_FILE)),
            config.ext_src_rel_path.clone(),
            config.company_git_remote.clone(),
        );
        package.latest_version = client.latest_version(&package.pypi_name).await;
        tracing::debug!(
            package = %package.pypi_name,
            latest = ?package.latest_version,
            "resolved package"
        );
        Ok(package)
    }

    pub fn requirement(&self) -> Result<Option<Requirement>> {
        self.requirements.find(&self.pypi_name)
    }

    pub fn has_requirement(&self) -> Result<bool> {
        Ok(self.requirement()?.is_some())
    }

    /// No pin at all allows any version
    pub fn allowed_version(&self, version: &str) -> Result<bool> {
        Ok(self
            .requirement()?
            .map_or(true, |req| req.allowed_version(version)))
    }

    pub fn is_editable(&self) -> Result<bool> {
        Ok(self.requirement()?.is_some_and(|req| req.editable))
    }

    /// Required from a pull request or from a local checkout
    pub fn has_pending_merge(&self) -> Result<bool> {
        Ok(self
            .requirement()?
            .is_some_and(|req| req.is_pull_request() || req.editable))
    }

    fn requirement_line(&self, source: RequirementSource<'_>) -> Result<String> {
        match source {
            RequirementSource::Release(version) => Ok(make_requirement_line(
                &self.pypi_name,
                version.or(self.latest_version.as_deref()),
            )),
            RequirementSource::PullRequest(pr) => {
                make_requirement_line_for_pr(&self.pypi_name, pr, self.use_wool)
            }
            RequirementSource::Editable(pr) => {
                make_requirement_line_for_editable(&self.pypi_name, pr, &self.dev_src, self.use_wool)
            }
            RequirementSource::ForkBranch { pr, branch } => {
                let repo = parse_github_url(pr)?.repo_name;
                Ok(make_requirement_line_for_proj_fork(
                    &self.pypi_name,
                    &repo,
                    branch,
                    &self.fork_upstream,
                    self.use_wool,
                ))
            }
        }
    }

    pub fn add_requirement(&self, source: RequirementSource<'_>) -> Result<String> {
        let line = self.requirement_line(source)?;
        self.requirements.add(&line)?;
        Ok(line)
    }

    pub fn replace_requirement(&self, source: RequirementSource<'_>) -> Result<String> {
        let line = self.requirement_line(source)?;
        self.requirements.replace(&self.pypi_name, &line)?;
        Ok(line)
    }

    /// Returns the line now present in the requirements file
    pub fn add_or_replace_requirement(&self, source: RequirementSource<'_>) -> Result<String> {
        if self.has_requirement()? {
            self.replace_requirement(source)
        } else {
            self.add_requirement(source)
        }
    }
}

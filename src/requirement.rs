//! Reading and editing `requirements.txt`
//!
//! Only the forms the project templates produce are understood: pinned
//! requirements (`name == 1.0`), direct references (`name @ git+https://...`)
//! and editable local checkouts (`-e odoo/external-src/repo/setup/module`).
//! Other lines are carried through edits untouched.

use crate::{error::OtoolsError, github::parse_github_url, pypi::pkg_name_to_odoo_name};
use anyhow::{Context, Result};
use std::{
    cmp::Ordering,
    fmt, fs,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecOp {
    Eq,
    Le,
    Ge,
    Lt,
    Gt,
}

impl SpecOp {
    // two-char operators first so `<=` is not read as `<`
    const ALL: [(&'static str, SpecOp); 5] = [
        ("==", SpecOp::Eq),
        ("<=", SpecOp::Le),
        (">=", SpecOp::Ge),
        ("<", SpecOp::Lt),
        (">", SpecOp::Gt),
    ];

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            SpecOp::Eq => ordering == Ordering::Equal,
            SpecOp::Le => ordering != Ordering::Greater,
            SpecOp::Ge => ordering != Ordering::Less,
            SpecOp::Lt => ordering == Ordering::Less,
            SpecOp::Gt => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for SpecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = SpecOp::ALL
            .iter()
            .find(|(_, op)| op == self)
            .map_or("", |(s, _)| *s);
        f.write_str(symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub line: String,
    pub name: String,
    pub specs: Vec<(SpecOp, String)>,
    pub editable: bool,
    pub url: Option<String>,
}

impl Requirement {
    /// Parse one requirements line; `None` for blanks, comments and pip options
    pub fn parse(line: &str) -> Option<Requirement> {
        let content = line.split_once(" #").map_or(line, |(c, _)| c).trim();
        if content.is_empty() || content.starts_with('#') {
            return None;
        }

        if let Some(path) = content.strip_prefix("-e").map(str::trim) {
            let name = path
                .split("#egg=")
                .nth(1)
                .or_else(|| path.trim_end_matches('/').rsplit('/').next())
                .unwrap_or(path);
            return Some(Requirement {
                line: line.trim_end().to_string(),
                name: name.to_string(),
                specs: Vec::new(),
                editable: true,
                url: Some(path.to_string()),
            });
        }
        if content.starts_with('-') {
            return None;
        }

        if let Some((name, url)) = content.split_once(" @ ") {
            return Some(Requirement {
                line: line.trim_end().to_string(),
                name: name.trim().to_string(),
                specs: Vec::new(),
                editable: false,
                url: Some(url.trim().to_string()),
            });
        }

        let content = content.split(';').next().unwrap_or(content);
        let name_end = content
            .find(|c: char| "=<>!~ [".contains(c))
            .unwrap_or(content.len());
        let name = content[..name_end].trim();
        if name.is_empty() {
            return None;
        }
        let specs = content[name_end..]
            .split(',')
            .filter_map(|spec| {
                let spec = spec.trim();
                SpecOp::ALL.iter().find_map(|(symbol, op)| {
                    spec.strip_prefix(symbol)
                        .map(|v| (*op, v.trim().to_string()))
                })
            })
            .collect();
        Some(Requirement {
            line: line.trim_end().to_string(),
            name: name.to_string(),
            specs,
            editable: false,
            url: None,
        })
    }

    /// Whether this line is about `pkg_name` or the Odoo module it packages
    pub fn names(&self, pkg_name: &str) -> bool {
        self.name == pkg_name || self.name == pkg_name_to_odoo_name(pkg_name)
    }

    pub fn is_pull_request(&self) -> bool {
        self.line.contains("refs/pull")
    }

    /// Every version specifier is satisfied by `version`
    pub fn allowed_version(&self, version: &str) -> bool {
        self.specs
            .iter()
            .all(|(op, pinned)| op.holds(compare_versions(version, pinned)))
    }
}

/// Compare dotted versions component-wise, numerically where both sides are numbers
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let (l, r) = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => (l.unwrap_or("0"), r.unwrap_or("0")),
        };
        let ord = match (l.parse::<u64>(), r.parse::<u64>()) {
            (Ok(l), Ok(r)) => l.cmp(&r),
            _ => l.cmp(r),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
}

/// Where a module sits inside its repository
pub fn installation_subdirectory(mod_name: &str, use_wool: bool) -> String {
    if use_wool {
        mod_name.to_string()
    } else {
        format!("setup/{mod_name}")
    }
}

pub fn make_requirement_line(pkg_name: &str, version: Option<&str>) -> String {
    match version {
        Some(v) => format!("{pkg_name} == {v}"),
        None => pkg_name.to_string(),
    }
}

/// Direct reference to the head of a pull request
pub fn make_requirement_line_for_pr(pkg_name: &str, pr: &str, use_wool: bool) -> Result<String> {
    let parts = parse_github_url(pr)?;
    let mod_name = pkg_name_to_odoo_name(pkg_name);
    Ok(format!(
        "{pkg_name} @ git+https://github.com/{}/{}@refs/{}/{}/head#subdirectory={}",
        parts.upstream,
        parts.repo_name,
        parts.entity_type,
        parts.entity_id,
        installation_subdirectory(&mod_name, use_wool)
    ))
}

/// Direct reference to a branch of the project's fork of `repo_name`
pub fn make_requirement_line_for_proj_fork(
    pkg_name: &str,
    repo_name: &str,
    branch: &str,
    upstream: &str,
    use_wool: bool,
) -> String {
    let mod_name = pkg_name_to_odoo_name(pkg_name);
    format!(
        "{pkg_name} @ git+https://github.com/{upstream}/{repo_name}@{branch}#subdirectory={}",
        installation_subdirectory(&mod_name, use_wool)
    )
}

/// Editable install from the local checkout of the pull request's repository
pub fn make_requirement_line_for_editable(
    pkg_name: &str,
    pr: &str,
    dev_src: &str,
    use_wool: bool,
) -> Result<String> {
    let parts = parse_github_url(pr)?;
    let mod_name = pkg_name_to_odoo_name(pkg_name);
    Ok(format!(
        "-e {dev_src}/{}/{}",
        parts.repo_name,
        installation_subdirectory(&mod_name, use_wool)
    ))
}

pub struct RequirementsFile {
    path: PathBuf,
}

impl RequirementsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        RequirementsFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        if !self.path.exists() {
            return Ok(String::new());
        }
        fs::read_to_string(&self.path).with_context(|| format!("reading {}", self.path.display()))
    }

    fn write(&self, content: &str) -> Result<()> {
        fs::write(&self.path, content).with_context(|| format!("writing {}", self.path.display()))
    }

    pub fn requirements(&self) -> Result<Vec<Requirement>> {
        Ok(self.read()?.lines().filter_map(Requirement::parse).collect())
    }

    /// First requirement naming `pkg_name` or its Odoo module
    pub fn find(&self, pkg_name: &str) -> Result<Option<Requirement>> {
        Ok(self.requirements()?.into_iter().find(|r| r.names(pkg_name)))
    }

    /// Append `line`, separated by a newline from any existing content
    pub fn add(&self, line: &str) -> Result<()> {
        let mut content = self.read()?;
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(line);
        content.push('\n');
        self.write(&content)
    }

    /// Replace every line naming `pkg_name` with `line`, returning how many were replaced
    pub fn replace(&self, pkg_name: &str, line: &str) -> Result<usize> {
        if !self.path.exists() {
            return Err(OtoolsError::NotFound(self.path.display().to_string()).into());
        }
        let content = self.read()?;
        let mut replaced = 0;
        let mut out: Vec<&str> = Vec::new();
        for current in content.lines() {
            match Requirement::parse(current) {
                Some(req) if req.names(pkg_name) => {
                    out.push(line);
                    replaced += 1;
                }
                _ => out.push(current),
            }
        }
        let mut new_content = out.join("\n");
        if content.ends_with('\n') {
            new_content.push('\n');
        }
        self.write(&new_content)?;
        Ok(replaced)
    }
}

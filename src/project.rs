//! The project being operated on
//!
//! A [`Project`] is created once by the CLI entry point and handed to every
//! command. The cookiecutter manifest and the tool configuration are read on
//! first use and kept for the rest of the invocation.

use crate::{
    config::{load_tool_config, ToolConfig},
    constants::PROJECT_MANIFEST,
    error::OtoolsError,
    path::find_root,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::{
    cell::OnceCell,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

/// Keys of `.cookiecutter.context.yml` the toolkit relies on
#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProjectManifest {
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub project_name: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub project_id: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub odoo_version: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub customer_shortname: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Accept `odoo_version: 16.0` as well as `odoo_version: "16.0"`
fn scalar_as_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_yaml::Value::String(s)) => Some(s),
        Some(serde_yaml::Value::Number(n)) => Some(n.to_string()),
        Some(serde_yaml::Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

impl ProjectManifest {
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn require<'a>(&self, key: &str, value: &'a Option<String>) -> Result<&'a str> {
        value.as_deref().ok_or_else(|| {
            OtoolsError::Config(format!("`{key}` is missing from {PROJECT_MANIFEST}")).into()
        })
    }

    pub fn project_name(&self) -> Result<&str> {
        self.require("project_name", &self.project_name)
    }

    /// Odoo version, or only its `major.minor` serie
    pub fn odoo_version(&self, serie_only: bool) -> Result<String> {
        let version = self.require("odoo_version", &self.odoo_version)?;
        if serie_only {
            Ok(version.split('.').take(2).collect::<Vec<_>>().join("."))
        } else {
            Ok(version.to_string())
        }
    }
}

pub struct Project {
    root: PathBuf,
    manifest: OnceCell<ProjectManifest>,
    config: OnceCell<ToolConfig>,
}

impl Project {
    /// Locate the project enclosing the current working directory
    pub fn discover() -> Result<Self> {
        let cwd = std::env::current_dir().context("reading current directory")?;
        let root = find_root(&cwd, PROJECT_MANIFEST)?;
        tracing::debug!(root = %root.display(), "found project root");
        Ok(Self::at(root))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Project {
            root: root.into(),
            manifest: OnceCell::new(),
            config: OnceCell::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` relative to the project root, absolute paths are returned as is
    pub fn build_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn manifest(&self) -> Result<&ProjectManifest> {
        if let Some(manifest) = self.manifest.get() {
            return Ok(manifest);
        }
        let path = self.root.join(PROJECT_MANIFEST);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let manifest = ProjectManifest::parse(&text)
            .with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded project manifest");
        Ok(self.manifest.get_or_init(|| manifest))
    }

    pub fn config(&self) -> Result<&ToolConfig> {
        if let Some(config) = self.config.get() {
            return Ok(config);
        }
        let config = load_tool_config(&self.root)?;
        Ok(self.config.get_or_init(|| config))
    }
}

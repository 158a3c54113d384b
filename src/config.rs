//! Tool configuration for otools
//!
//! Each project may carry an `.otools.yaml` file next to its
//! `.cookiecutter.context.yml` to override where the toolkit looks for things
//! and which external tools it drives. Every key is optional.
//!
//! ## Environment Variable Expansion
//!
//! The file supports environment variable expansion before it is parsed:
//! - `${VAR}` - Simple substitution
//! - `${VAR:-default}` - Use default if VAR is unset or empty
//! - `${VAR-default}` - Use default if VAR is unset
//! - `${VAR:+alt}` - Use alt if VAR is set and non-empty
//! - `${VAR+alt}` - Use alt if VAR is set
//!
//! # Example
//!
//! ```yaml
//! marabuntaMigFileRelPath: odoo/migration.yml
//! versionFileRelPath: odoo/VERSION
//! companyGitRemote: ${GIT_REMOTE:-camptocamp}
//! dumpTool: celebrimbor_cli
//! ```

use crate::{constants::OTOOLS_CONFIG, error::OtoolsError};
use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use std::{env, fs, path::Path, sync::OnceLock};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolConfig {
    /// Marabunta migration manifest, relative to the project root
    pub marabunta_mig_file_rel_path: String,
    /// File holding the current project version, written by bumpversion
    pub version_file_rel_path: String,
    /// Where external addon repositories are checked out
    pub ext_src_rel_path: String,
    /// GitHub organisation hosting the project's forks
    pub company_git_remote: String,
    /// Compose service running PostgreSQL
    pub db_service: String,
    /// Compose service running Odoo
    pub odoo_service: String,
    pub db_user: String,
    pub db_password: String,
    /// CLI used to list, fetch and share database dumps
    pub dump_tool: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            marabunta_mig_file_rel_path: "odoo/migration.yml".into(),
            version_file_rel_path: "odoo/VERSION".into(),
            ext_src_rel_path: "odoo/external-src".into(),
            company_git_remote: "camptocamp".into(),
            db_service: "db".into(),
            odoo_service: "odoo".into(),
            db_user: "odoo".into(),
            db_password: "odoo".into(),
            dump_tool: "celebrimbor_cli".into(),
        }
    }
}

/// Load `.otools.yaml` from the project root, falling back to defaults when absent
pub fn load_tool_config(root: &Path) -> anyhow::Result<ToolConfig> {
    let path = root.join(OTOOLS_CONFIG);
    if !path.exists() {
        return Ok(ToolConfig::default());
    }
    let data = preprocess_config(&path)?;
    if data.trim().is_empty() {
        return Ok(ToolConfig::default());
    }
    let cfg: ToolConfig = serde_yaml::from_str(&data)
        .map_err(|e| OtoolsError::Config(format!("{}: {e}", path.display())))?;
    Ok(cfg)
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?:(:?[-+])([^}]*))?\}")
            .expect("placeholder pattern is valid")
    })
}

pub fn expand_env_placeholders(input: &str) -> String {
    placeholder_regex()
        .replace_all(input, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let op = caps.get(2).map_or("", |m| m.as_str());
            let val = caps.get(3).map_or("", |m| m.as_str());
            let var = env::var(var_name).ok();

            match (var.as_deref(), op) {
                (Some(v), _) if op.is_empty() => v.to_string(), // ${VAR}
                (Some(v), ":-") if !v.is_empty() => v.to_string(), // ${VAR:-default}
                (Some(_), ":-") | (None, ":-") => val.to_string(),
                (Some(v), "-") => v.to_string(), // ${VAR-default}
                (None, "-") => val.to_string(),
                (Some(v), ":+") if !v.is_empty() => val.to_string(), // ${VAR:+alt}
                (Some(_), "+") => val.to_string(),                   // ${VAR+alt}
                _ => String::new(),
            }
        })
        .to_string()
}

pub fn preprocess_config(path: &Path) -> anyhow::Result<String> {
    let raw_data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(expand_env_placeholders(&raw_data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_expand_env_placeholders() {
        env::set_var("OTOOLS_TEST_SET", "value");
        env::set_var("OTOOLS_TEST_EMPTY", "");
        env::remove_var("OTOOLS_TEST_UNSET");

        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_SET}"), "value");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_UNSET}"), "");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_EMPTY:-dflt}"), "dflt");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_UNSET:-dflt}"), "dflt");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_EMPTY-dflt}"), "");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_UNSET-dflt}"), "dflt");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_SET:+alt}"), "alt");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_EMPTY:+alt}"), "");
        assert_eq!(expand_env_placeholders("${OTOOLS_TEST_EMPTY+alt}"), "alt");
        assert_eq!(
            expand_env_placeholders("remote: ${OTOOLS_TEST_SET}/x"),
            "remote: value/x"
        );
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        assert_eq!(load_tool_config(dir.path()).unwrap(), ToolConfig::default());
    }

    #[test]
    fn test_partial_config_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        env::set_var("OTOOLS_TEST_REMOTE", "acme");
        fs::write(
            dir.path().join(OTOOLS_CONFIG),
            "companyGitRemote: ${OTOOLS_TEST_REMOTE}\ndbService: postgres\n",
        )
        .unwrap();

        let cfg = load_tool_config(dir.path()).unwrap();
        assert_eq!(cfg.company_git_remote, "acme");
        assert_eq!(cfg.db_service, "postgres");
        assert_eq!(cfg.marabunta_mig_file_rel_path, "odoo/migration.yml");
    }

    #[test]
    fn test_invalid_config_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(OTOOLS_CONFIG), "dbService: [1, 2\n").unwrap();
        let err = load_tool_config(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtoolsError>(),
            Some(OtoolsError::Config(_))
        ));
    }
}

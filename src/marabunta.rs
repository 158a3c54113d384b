//! Editing the marabunta migration manifest
//!
//! The manifest records, per released version, the commands to run during an
//! upgrade:
//!
//! ```yaml
//! migration:
//!   options:
//!     install_command: odoo
//!   versions:
//!     - version: setup
//!       addons:
//!         upgrade:
//!           - base
//!     - version: 14.0.1.0.0
//!       operations:
//!         post:
//!           - click-odoo-update
//! ```
//!
//! The file is authored by hand, so edits go through `nondestructive` and leave
//! comments, quoting and indentation of untouched parts exactly as they were.
//! Lookups run on a `serde_yaml` view of the same text.

use crate::{constants::UPDATE_COMMAND, error::OtoolsError};
use anyhow::{Context, Result};
use nondestructive::yaml;
use serde::Deserialize;
use serde_yaml::Value;
use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

/// A migration manifest on disk
pub struct MigrationFile {
    path: PathBuf,
}

impl MigrationFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MigrationFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<MigrationDocument> {
        if !self.path.exists() {
            return Err(OtoolsError::NotFound(self.path.display().to_string()).into());
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        MigrationDocument::parse(&text, &self.path.display().to_string())
    }

    /// Record the update command for `version` under `hook`, writing the file only
    /// when something changed. Returns whether the file was rewritten.
    pub fn update(&self, version: &str, hook: &str) -> Result<bool> {
        let mut doc = self.load()?;
        if !doc.update(version, hook)? {
            tracing::debug!(version, hook, "update command already recorded");
            return Ok(false);
        }
        fs::write(&self.path, doc.to_string())
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(true)
    }

    pub fn versions_with_hook_command(&self, hook: &str) -> Result<BTreeSet<String>> {
        Ok(self.load()?.versions_with_hook_command(hook))
    }

    pub fn migration_file_modules(&self) -> Result<BTreeSet<String>> {
        Ok(self.load()?.migration_file_modules())
    }
}

/// What an update has to do to a version record
enum Plan {
    /// `empty_flow` is set when the sequence is empty and may be written `[]`
    AppendRecord { empty_flow: bool },
    Extend { index: usize, has_operations: bool, has_hook: bool },
}

/// Parsed manifest: an editable document plus a read-only view of its values
pub struct MigrationDocument {
    origin: String,
    doc: yaml::Document,
    data: Value,
    /// Version scalars as written, by record index
    version_texts: Vec<Option<String>>,
}

/// Typed view of the records that reads `version` as text, so `1.10` stays `1.10`
#[derive(Deserialize)]
struct RawManifest {
    migration: RawMigration,
}

#[derive(Deserialize)]
struct RawMigration {
    #[serde(default)]
    versions: Vec<RawRecord>,
}

#[derive(Deserialize)]
struct RawRecord {
    #[serde(default)]
    version: Option<String>,
}

fn version_texts(text: &str) -> Vec<Option<String>> {
    serde_yaml::from_str::<RawManifest>(text)
        .map(|raw| raw.migration.versions.into_iter().map(|r| r.version).collect())
        .unwrap_or_default()
}


impl MigrationDocument {
    /// Parse manifest text. `origin` only names the source in error messages.
    pub fn parse(text: &str, origin: &str) -> Result<Self> {
        let malformed = |reason: String| OtoolsError::MalformedDocument {
            path: origin.to_string(),
            reason,
        };
        let data: Value = serde_yaml::from_str(text).map_err(|e| malformed(e.to_string()))?;
        let doc = yaml::from_slice(text.as_bytes()).map_err(|e| malformed(e.to_string()))?;
        let parsed = MigrationDocument {
            origin: origin.to_string(),
            doc,
            data,
            version_texts: version_texts(text),
        };
        parsed.versions()?;
        Ok(parsed)
    }

    /// The `migration.versions` sequence; anything else is a malformed document
    fn versions(&self) -> Result<&Vec<Value>> {
        let malformed = |reason: &str| OtoolsError::MalformedDocument {
            path: self.origin.clone(),
            reason: reason.to_string(),
        };
        let root = self
            .data
            .as_mapping()
            .ok_or_else(|| malformed("root is not a mapping"))?;
        let migration = root
            .get("migration")
            .and_then(Value::as_mapping)
            .ok_or_else(|| malformed("`migration` is not a mapping"))?;
        let versions = migration
            .get("versions")
            .and_then(Value::as_sequence)
            .ok_or_else(|| malformed("`migration.versions` is not a sequence"))?;
        Ok(versions)
    }

    /// Version of the `index`-th record as written in the file
    fn version_at(&self, index: usize, record: &Value) -> Option<String> {
        self.version_texts
            .get(index)
            .cloned()
            .flatten()
            .or_else(|| record_version(record))
    }

    fn position(&self, version: &str) -> Result<Option<usize>> {
        Ok(self
            .versions()?
            .iter()
            .enumerate()
            .position(|(i, r)| self.version_at(i, r).as_deref() == Some(version)))
    }

    /// Version strings of all records, in file order
    pub fn version_names(&self) -> Result<Vec<String>> {
        Ok(self
            .versions()?
            .iter()
            .enumerate()
            .filter_map(|(i, r)| self.version_at(i, r))
            .collect())
    }

    /// Ensure `operations[hook]` of `version` contains the update command exactly once.
    ///
    /// A missing version record is appended at the end of the sequence. Returns
    /// `false` when the command was already there and nothing changed.
    pub fn update(&mut self, version: &str, hook: &str) -> Result<bool> {
        let plan = match self.position(version)? {
            None => Plan::AppendRecord {
                empty_flow: self.versions()?.is_empty(),
            },
            Some(index) => {
                let record = &self.versions()?[index];
                let operations = record.get("operations").filter(|o| o.is_mapping());
                let commands = operations
                    .and_then(|o| o.get(hook))
                    .and_then(Value::as_sequence);
                if commands.is_some_and(|c| contains_command(c, UPDATE_COMMAND)) {
                    return Ok(false);
                }
                Plan::Extend {
                    index,
                    has_operations: record.get("operations").is_some(),
                    has_hook: operations.and_then(|o| o.get(hook)).is_some(),
                }
            }
        };

        self.apply(plan, version, hook)?;
        let text = self.doc.to_string();
        self.data = serde_yaml::from_str(&text).map_err(|e| OtoolsError::MalformedDocument {
            path: self.origin.clone(),
            reason: format!("edit produced invalid YAML: {e}"),
        })?;
        self.version_texts = version_texts(&text);
        Ok(true)
    }

    fn apply(&mut self, plan: Plan, version: &str, hook: &str) -> Result<()> {
        let origin = self.origin.clone();
        let lost = move |what: &str| OtoolsError::MalformedDocument {
            path: origin.clone(),
            reason: format!("cannot edit {what}"),
        };

        let mut versions = self
            .doc
            .as_mut()
            .into_mapping_mut()
            .and_then(|m| m.get_into_mut("migration"))
            .and_then(|v| v.into_mapping_mut())
            .and_then(|m| m.get_into_mut("versions"))
            .ok_or_else(|| lost("migration.versions"))?;
        let mut versions = match plan {
            Plan::AppendRecord { empty_flow: true } => {
                // block records cannot go inside `[]`
                versions.set_null(yaml::Null::Empty);
                versions.make_sequence()
            }
            _ => versions
                .into_sequence_mut()
                .ok_or_else(|| lost("migration.versions"))?,
        };

        match plan {
            Plan::AppendRecord { .. } => {
                let mut record = versions.push(yaml::Separator::Auto).make_mapping();
                record.insert_str("version", version);
                let mut operations = record
                    .insert("operations", yaml::Separator::Auto)
                    .make_mapping();
                let mut commands = operations
                    .insert(hook, yaml::Separator::Auto)
                    .make_sequence();
                commands.push_string(UPDATE_COMMAND);
            }
            Plan::Extend {
                index,
                has_operations,
                has_hook,
            } => {
                let mut record = versions
                    .get_into_mut(index)
                    .and_then(|v| v.into_mapping_mut())
                    .ok_or_else(|| lost("version record"))?;
                let operations = if has_operations {
                    record
                        .get_into_mut("operations")
                        .ok_or_else(|| lost("operations"))?
                } else {
                    record.insert("operations", yaml::Separator::Auto)
                };
                let mut operations = operations.make_mapping();
                let commands = if has_hook {
                    operations
                        .get_into_mut(hook)
                        .ok_or_else(|| lost("hook commands"))?
                } else {
                    operations.insert(hook, yaml::Separator::Auto)
                };
                commands.make_sequence().push_string(UPDATE_COMMAND);
            }
        }
        Ok(())
    }

    /// Versions whose `operations[hook]` already runs the update command
    pub fn versions_with_hook_command(&self, hook: &str) -> BTreeSet<String> {
        let Ok(versions) = self.versions() else {
            return BTreeSet::new();
        };
        versions
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                record
                    .get("operations")
                    .and_then(|o| o.get(hook))
                    .and_then(Value::as_sequence)
                    .is_some_and(|c| contains_command(c, UPDATE_COMMAND))
            })
            .filter_map(|(i, record)| self.version_at(i, record))
            .collect()
    }

    /// Union of the `addons.upgrade` lists of every version
    pub fn migration_file_modules(&self) -> BTreeSet<String> {
        let Ok(versions) = self.versions() else {
            return BTreeSet::new();
        };
        versions
            .iter()
            .filter_map(|record| record.get("addons")?.get("upgrade")?.as_sequence())
            .flatten()
            .filter_map(|m| m.as_str().map(str::to_string))
            .collect()
    }
}

impl std::fmt::Display for MigrationDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.doc)
    }
}

/// Version of a record from its parsed value, for records the typed view could not read
fn record_version(record: &Value) -> Option<String> {
    match record.get("version")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn contains_command(commands: &[Value], command: &str) -> bool {
    commands.iter().any(|c| c.as_str() == Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"# Migration steps
migration:
  options:
    install_command: odoo
  versions:
    - version: setup
      addons:
        upgrade:
          - base
          - sale
    - version: "1.0"
      operations:
        post:
          - x
"#;

    fn doc(text: &str) -> MigrationDocument {
        MigrationDocument::parse(text, "migration.yml").unwrap()
    }

    fn hook_commands(doc: &MigrationDocument, version: &str, hook: &str) -> Vec<String> {
        let data: Value = serde_yaml::from_str(&doc.to_string()).unwrap();
        data["migration"]["versions"]
            .as_sequence()
            .unwrap()
            .iter()
            .find(|r| record_version(r).as_deref() == Some(version))
            .and_then(|r| r["operations"][hook].as_sequence())
            .map(|c| {
                c.iter()
                    .map(|v| v.as_str().unwrap().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_appends_to_existing_hook() {
        let mut d = doc(MANIFEST);
        assert!(d.update("1.0", "post").unwrap());
        assert_eq!(hook_commands(&d, "1.0", "post"), vec!["x", UPDATE_COMMAND]);
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut d = doc(MANIFEST);
        assert!(d.update("1.0", "post").unwrap());
        let once = d.to_string();
        assert!(!d.update("1.0", "post").unwrap());
        assert_eq!(d.to_string(), once);
        assert_eq!(hook_commands(&d, "1.0", "post"), vec!["x", UPDATE_COMMAND]);
    }

    #[test]
    fn test_new_version_is_appended_last() {
        let mut d = doc(MANIFEST);
        assert!(d.update("2.0", "post").unwrap());
        assert_eq!(d.version_names().unwrap(), vec!["setup", "1.0", "2.0"]);
        assert_eq!(hook_commands(&d, "2.0", "post"), vec![UPDATE_COMMAND]);
        // the record that was already there is untouched
        assert_eq!(hook_commands(&d, "1.0", "post"), vec!["x"]);
    }

    #[test]
    fn test_other_hook_gets_its_own_sequence() {
        let mut d = doc(MANIFEST);
        assert!(d.update("1.0", "pre").unwrap());
        assert_eq!(hook_commands(&d, "1.0", "pre"), vec![UPDATE_COMMAND]);
        assert_eq!(hook_commands(&d, "1.0", "post"), vec!["x"]);
    }

    #[test]
    fn test_missing_operations_is_created() {
        let mut d = doc(MANIFEST);
        assert!(d.update("setup", "post").unwrap());
        assert_eq!(hook_commands(&d, "setup", "post"), vec![UPDATE_COMMAND]);
        assert_eq!(
            d.migration_file_modules().into_iter().collect::<Vec<_>>(),
            vec!["base", "sale"]
        );
    }

    #[test]
    fn test_first_matching_record_wins() {
        let text = r#"migration:
  versions:
    - version: "3.0"
      operations:
        post:
          - a
    - version: "3.0"
      operations:
        post:
          - b
"#;
        let mut d = doc(text);
        d.update("3.0", "post").unwrap();
        let data: Value = serde_yaml::from_str(&d.to_string()).unwrap();
        let versions = data["migration"]["versions"].as_sequence().unwrap();
        assert_eq!(versions[0]["operations"]["post"].as_sequence().unwrap().len(), 2);
        assert_eq!(versions[1]["operations"]["post"].as_sequence().unwrap().len(), 1);
    }

    #[test]
    fn test_unquoted_numeric_version_matches() {
        let text = "migration:\n  versions:\n    - version: 1.5\n";
        let mut d = doc(text);
        d.update("1.5", "post").unwrap();
        assert_eq!(d.version_names().unwrap(), vec!["1.5"]);
    }

    #[test]
    fn test_numeric_version_keeps_trailing_zero() {
        let text = "migration:\n  versions:\n    - version: 1.10\n      operations:\n        post:\n          - x\n";
        let mut d = doc(text);
        assert!(d.update("1.10", "pre").unwrap());
        assert_eq!(d.version_names().unwrap(), vec!["1.10"]);
        assert!(!d.to_string().contains("'1.10'"));
        assert!(!d.update("1.10", "pre").unwrap());

        assert!(d.update("1.1", "post").unwrap());
        assert_eq!(d.version_names().unwrap(), vec!["1.10", "1.1"]);
    }

    #[test]
    fn test_empty_flow_versions_takes_a_record() {
        let mut d = doc("# upgrades\nmigration:\n  versions: []\n");
        assert!(d.update("1.0", "post").unwrap());
        assert_eq!(d.version_names().unwrap(), vec!["1.0"]);
        assert_eq!(hook_commands(&d, "1.0", "post"), vec![UPDATE_COMMAND]);
        assert!(d.to_string().starts_with("# upgrades\nmigration:\n"));
        assert!(!d.to_string().contains("[]"));
        assert!(!d.update("1.0", "post").unwrap());
    }

    #[test]
    fn test_malformed_shapes_are_rejected() {
        for text in [
            "- just\n- a list\n",
            "other: 1\n",
            "migration: 3\n",
            "migration:\n  versions: nope\n",
        ] {
            let err = MigrationDocument::parse(text, "m.yml").err().unwrap();
            assert!(
                matches!(
                    err.downcast_ref::<OtoolsError>(),
                    Some(OtoolsError::MalformedDocument { .. })
                ),
                "{text:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_versions_with_hook_command() {
        let mut d = doc(MANIFEST);
        assert!(d.versions_with_hook_command("post").is_empty());
        d.update("1.0", "post").unwrap();
        d.update("2.0", "post").unwrap();
        d.update("3.0", "pre").unwrap();
        assert_eq!(
            d.versions_with_hook_command("post").into_iter().collect::<Vec<_>>(),
            vec!["1.0", "2.0"]
        );
        assert_eq!(
            d.versions_with_hook_command("pre").into_iter().collect::<Vec<_>>(),
            vec!["3.0"]
        );
    }
}

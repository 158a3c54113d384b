//! Sharing database dumps through the remote blob store CLI

use crate::{error::OtoolsError, process::CommandRunner, process::ExternalCommand, project::Project};
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Where a dump lives in the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpLocation {
    pub platform: String,
    pub customer: String,
    pub env: String,
}

impl DumpLocation {
    /// Fill the platform and customer the user did not give from the project manifest.
    ///
    /// The platform defaults to the manifest's `country`, the customer to its
    /// `project_name` without the trailing `_odoo`-style segment, dash separated.
    pub fn resolve(
        project: &Project,
        platform: Option<String>,
        customer: Option<String>,
        env: String,
    ) -> Result<Self> {
        let manifest = project.manifest()?;
        let platform = match platform.or_else(|| manifest.country.clone()) {
            Some(p) if !p.is_empty() => p,
            _ => return Err(OtoolsError::Config("Please specify the platform".into()).into()),
        };
        let customer = match customer {
            Some(c) => c,
            None => customer_from_project_name(manifest.project_name()?),
        };
        Ok(DumpLocation {
            platform,
            customer,
            env,
        })
    }
}

pub fn customer_from_project_name(project_name: &str) -> String {
    let parts: Vec<&str> = project_name.split('_').collect();
    parts[..parts.len().saturating_sub(1)].join("-")
}

#[derive(Deserialize)]
struct ListedDump {
    name: String,
}

pub struct DumpStore<'r> {
    runner: &'r dyn CommandRunner,
    tool: String,
}

impl<'r> DumpStore<'r> {
    pub fn new(runner: &'r dyn CommandRunner, tool: impl Into<String>) -> Self {
        DumpStore {
            runner,
            tool: tool.into(),
        }
    }

    fn command(&self, loc: &DumpLocation, action: &str) -> ExternalCommand {
        ExternalCommand::new(&self.tool)
            .args([
                "-p",
                loc.platform.as_str(),
                action,
                "-c",
                loc.customer.as_str(),
                "-e",
                loc.env.as_str(),
            ])
    }

    /// Names of the dumps available for `loc`, oldest first as listed by the store
    pub fn list_dumps(&self, loc: &DumpLocation) -> Result<Vec<String>> {
        let cmd = self.command(loc, "list").arg("-r");
        let output = self.runner.run(&cmd)?;
        parse_dump_list(&output, &cmd.to_string())
    }

    /// Download `dump_name` into `into`
    pub fn download(&self, loc: &DumpLocation, dump_name: &str, into: &Path) -> Result<()> {
        let cmd = self
            .command(loc, "download")
            .args(["--name", dump_name])
            .current_dir(into);
        self.runner.run(&cmd)?;
        Ok(())
    }

    pub fn upload(&self, loc: &DumpLocation, dump_path: &Path) -> Result<()> {
        let cmd = self
            .command(loc, "dump")
            .args(["-i".to_string(), dump_path.display().to_string()]);
        self.runner.run(&cmd)?;
        Ok(())
    }
}

/// Parse the store's listing: a JSON array of objects with a string `name`
pub fn parse_dump_list(output: &str, source_cmd: &str) -> Result<Vec<String>> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    let dumps: Vec<ListedDump> =
        serde_json::from_str(trimmed).map_err(|e| OtoolsError::ParseError {
            source_cmd: source_cmd.to_string(),
            reason: e.to_string(),
        })?;
    Ok(dumps.into_iter().map(|d| d.name).collect())
}

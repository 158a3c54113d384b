//! Running external tools
//!
//! Every interaction with docker compose, git, psql, bumpversion and friends goes
//! through the [`CommandRunner`] trait so commands can be exercised without the
//! tools being installed. [`SystemRunner`] is the real implementation; unit tests
//! use `ScriptedRunner`, which replays canned results while recording what was
//! asked of it.

use crate::error::OtoolsError;
use anyhow::{Context, Result};
#[cfg(test)]
use std::{cell::RefCell, collections::VecDeque};
use std::{
    env, fmt,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

/// A program invocation with its arguments and optional stdin source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub stdin_file: Option<PathBuf>,
    pub stdin_data: Option<String>,
    pub envs: Vec<(String, String)>,
    pub current_dir: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        ExternalCommand {
            program: program.into(),
            args: Vec::new(),
            stdin_file: None,
            stdin_data: None,
            envs: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed the content of `path` to the program's stdin
    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn stdin_data(mut self, data: impl Into<String>) -> Self {
        self.stdin_data = Some(data.into());
        self
    }

    /// Extra environment for the child; not part of the displayed command line
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(path) = &self.stdin_file {
            write!(f, " < {}", path.display())?;
        }
        Ok(())
    }
}

pub trait CommandRunner {
    /// Run the command to completion and return its captured stdout.
    ///
    /// A non-zero exit status is reported as [`OtoolsError::CommandFailed`].
    fn run(&self, cmd: &ExternalCommand) -> Result<String>;
}

/// Runs commands on the host with `std::process::Command`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<String> {
        tracing::debug!(command = %cmd, "running external command");

        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(cmd.envs.iter().map(|(k, v)| (k, v)))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.current_dir {
            command.current_dir(dir);
        }

        if let Some(path) = &cmd.stdin_file {
            let file = File::open(path)
                .with_context(|| format!("opening {} for `{}`", path.display(), cmd.program))?;
            command.stdin(Stdio::from(file));
        } else if cmd.stdin_data.is_some() {
            command.stdin(Stdio::piped());
        } else {
            command.stdin(Stdio::null());
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("spawning `{cmd}`"))?;
        if let (Some(data), Some(mut stdin)) = (&cmd.stdin_data, child.stdin.take()) {
            stdin.write_all(data.as_bytes())?;
        }
        let output = child
            .wait_with_output()
            .with_context(|| format!("waiting for `{cmd}`"))?;

        if !output.status.success() {
            return Err(OtoolsError::CommandFailed {
                cmd: cmd.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Replays queued results in order and records every command line it receives.
///
/// Once the queue is drained every further command succeeds with empty output.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    responses: RefCell<VecDeque<std::result::Result<String, String>>>,
    calls: RefCell<Vec<String>>,
}

#[cfg(test)]
impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(self, stdout: impl Into<String>) -> Self {
        self.responses.borrow_mut().push_back(Ok(stdout.into()));
        self
    }

    pub fn push_err(self, stderr: impl Into<String>) -> Self {
        self.responses.borrow_mut().push_back(Err(stderr.into()));
        self
    }

    /// Command lines received so far, rendered with `Display`
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

#[cfg(test)]
impl CommandRunner for ScriptedRunner {
    fn run(&self, cmd: &ExternalCommand) -> Result<String> {
        self.calls.borrow_mut().push(cmd.to_string());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(stderr)) => Err(OtoolsError::CommandFailed {
                cmd: cmd.to_string(),
                status: "exit status: 1".into(),
                stderr,
            }
            .into()),
            None => Ok(String::new()),
        }
    }
}

/// Whether `name` resolves to a file in one of the `PATH` directories
pub fn has_executable(name: &str) -> bool {
    let Some(paths) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&paths).any(|dir| is_file(&dir.join(name)))
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_joins_arguments() {
        let cmd = ExternalCommand::new("docker")
            .args(["compose", "port", "db", "5432"]);
        assert_eq!(cmd.to_string(), "docker compose port db 5432");

        let cmd = ExternalCommand::new("pg_restore")
            .args(["-d", "mydb"])
            .stdin_file("/tmp/x.pg");
        assert_eq!(cmd.to_string(), "pg_restore -d mydb < /tmp/x.pg");
    }

    #[test]
    fn test_scripted_runner_replays_in_order() {
        let runner = ScriptedRunner::new().push_err("boom").push_ok("out");
        let cmd = ExternalCommand::new("true");

        let err = runner.run(&cmd).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtoolsError>(),
            Some(OtoolsError::CommandFailed { .. })
        ));
        assert_eq!(runner.run(&cmd).unwrap(), "out");
        assert_eq!(runner.run(&cmd).unwrap(), "");
        assert_eq!(runner.calls(), vec!["true", "true", "true"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_stdout_and_failure() {
        let out = SystemRunner
            .run(&ExternalCommand::new("sh").args(["-c", "echo hello"]))
            .unwrap();
        assert_eq!(out.trim(), "hello");

        let out = SystemRunner
            .run(&ExternalCommand::new("cat").stdin_data("piped"))
            .unwrap();
        assert_eq!(out, "piped");

        let err = SystemRunner
            .run(&ExternalCommand::new("sh").args(["-c", "echo nope >&2; exit 3"]))
            .unwrap_err();
        match err.downcast_ref::<OtoolsError>() {
            Some(OtoolsError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "nope"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_has_executable() {
        assert!(has_executable("sh"));
        assert!(!has_executable("definitely-not-a-real-binary-name"));
    }
}

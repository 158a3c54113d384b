//! Keeping the database container up for the duration of an operation
//!
//! [`DbContainer::ensure_up`] probes the compose service by asking for its
//! published port. When the probe fails the service is started and polled until it
//! answers. The returned [`DbContainerGuard`] stops the service again when dropped,
//! but only if this process was the one that started it; a database the user was
//! already running is left alone.

use crate::{
    constants::DB_INTERNAL_PORT,
    docker_compose,
    error::OtoolsError,
    process::CommandRunner,
};
use anyhow::Result;
use std::{thread, time::Duration};

/// Probes issued after the start command before giving up
pub const DEFAULT_START_RETRIES: usize = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(300);

pub struct DbContainer<'r> {
    runner: &'r dyn CommandRunner,
    service: String,
    internal_port: u16,
    retries: usize,
    retry_delay: Duration,
}

impl<'r> DbContainer<'r> {
    pub fn new(runner: &'r dyn CommandRunner, service: impl Into<String>) -> Self {
        DbContainer {
            runner,
            service: service.into(),
            internal_port: DB_INTERNAL_PORT,
            retries: DEFAULT_START_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry(mut self, retries: usize, retry_delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn probe(&self) -> Result<String> {
        self.runner
            .run(&docker_compose::port(&self.service, self.internal_port))
    }

    /// Published host port of the service, which must already be running
    pub fn get_port(&self) -> Result<u16> {
        let output = self.probe()?;
        parse_published_port(&output, &self.service)
    }

    /// Make sure the service answers, starting it if needed.
    ///
    /// Fails with [`OtoolsError::ResourceUnavailable`] when the service still does
    /// not answer after the retry budget; nothing is stopped in that case.
    pub fn ensure_up(&self) -> Result<DbContainerGuard<'_, 'r>> {
        if let Ok(output) = self.probe() {
            tracing::debug!(service = %self.service, "database container already running");
            let port = parse_published_port(&output, &self.service)?;
            return Ok(DbContainerGuard {
                container: self,
                was_already_running: true,
                port,
            });
        }

        tracing::info!(service = %self.service, "starting database container");
        self.runner.run(&docker_compose::up_detached(&self.service))?;

        let mut last_error = String::from("no probe attempted");
        for attempt in 1..=self.retries {
            thread::sleep(self.retry_delay);
            match self.probe() {
                Ok(output) => {
                    // from here on the guard owns the stop, even if the port is garbage
                    let mut guard = DbContainerGuard {
                        container: self,
                        was_already_running: false,
                        port: 0,
                    };
                    guard.port = parse_published_port(&output, &self.service)?;
                    return Ok(guard);
                }
                Err(err) => {
                    println!(
                        "Waiting for {} to be up ({}/{})...",
                        self.service, attempt, self.retries
                    );
                    tracing::warn!(service = %self.service, attempt, error = %err, "database probe failed");
                    last_error = err.to_string();
                }
            }
        }

        Err(OtoolsError::ResourceUnavailable {
            resource: self.service.clone(),
            attempts: self.retries + 1,
            last_error,
        }
        .into())
    }

    /// Run `body` with the published port while the service is guaranteed up.
    ///
    /// The service is restored to its previous state afterwards, whether `body`
    /// succeeds or fails.
    pub fn with_up<T>(&self, body: impl FnOnce(u16) -> Result<T>) -> Result<T> {
        let guard = self.ensure_up()?;
        body(guard.port())
    }
}

/// Scope during which the database service is up
pub struct DbContainerGuard<'c, 'r> {
    container: &'c DbContainer<'r>,
    was_already_running: bool,
    port: u16,
}

impl DbContainerGuard<'_, '_> {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn was_already_running(&self) -> bool {
        self.was_already_running
    }
}

impl Drop for DbContainerGuard<'_, '_> {
    fn drop(&mut self) {
        if self.was_already_running {
            return;
        }
        let service = &self.container.service;
        tracing::info!(service = %service, "stopping database container");
        if let Err(err) = self
            .container
            .runner
            .run(&docker_compose::stop(service))
        {
            tracing::warn!(service = %service, error = %err, "failed to stop database container");
        }
    }
}

/// Extract the port from `docker compose port` output such as `0.0.0.0:5432`
pub fn parse_published_port(output: &str, service: &str) -> Result<u16> {
    let parse_error = |reason: &str| OtoolsError::ParseError {
        source_cmd: format!("docker compose port {service}"),
        reason: format!("{reason}: {:?}", output.trim()),
    };

    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| parse_error("empty output"))?;
    let (host, port) = line
        .rsplit_once(':')
        .ok_or_else(|| parse_error("expected <host>:<port>"))?;
    if host.is_empty() {
        return Err(parse_error("expected <host>:<port>").into());
    }
    port.parse::<u16>()
        .map_err(|_| parse_error("port is not a number").into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ScriptedRunner;
    use std::cell::Cell;

    const PROBE: &str = "docker compose port db 5432";
    const START: &str = "docker compose up -d db";
    const STOP: &str = "docker compose stop db";

    fn gate(runner: &ScriptedRunner) -> DbContainer<'_> {
        DbContainer::new(runner, "db").with_retry(3, Duration::ZERO)
    }

    #[test]
    fn test_already_running_is_left_alone() {
        let runner = ScriptedRunner::new().push_ok("0.0.0.0:5432\n");
        let runs = Cell::new(0);

        let port = gate(&runner)
            .with_up(|port| {
                runs.set(runs.get() + 1);
                Ok(port)
            })
            .unwrap();

        assert_eq!(port, 5432);
        assert_eq!(runs.get(), 1);
        assert_eq!(runner.calls(), vec![PROBE]);
    }

    #[test]
    fn test_started_then_stopped() {
        let runner = ScriptedRunner::new()
            .push_err("service \"db\" is not running")
            .push_ok("")
            .push_ok("0.0.0.0:5433");

        let port = gate(&runner)
            .with_up(|port| {
                assert_eq!(runner.calls(), vec![PROBE, START, PROBE]);
                Ok(port)
            })
            .unwrap();

        assert_eq!(port, 5433);
        assert_eq!(runner.calls(), vec![PROBE, START, PROBE, STOP]);
    }

    #[test]
    fn test_stop_runs_when_body_fails() {
        let runner = ScriptedRunner::new()
            .push_err("not running")
            .push_ok("")
            .push_ok("127.0.0.1:5434");

        let err = gate(&runner)
            .with_up(|_| -> Result<()> { anyhow::bail!("pg_dump exploded") })
            .unwrap_err();

        assert_eq!(err.to_string(), "pg_dump exploded");
        assert_eq!(runner.calls(), vec![PROBE, START, PROBE, STOP]);
    }

    #[test]
    fn test_polls_until_ready() {
        let runner = ScriptedRunner::new()
            .push_err("not running")
            .push_ok("")
            .push_err("starting")
            .push_err("starting")
            .push_ok("0.0.0.0:5432");

        gate(&runner).with_up(|_| Ok(())).unwrap();

        assert_eq!(
            runner.calls(),
            vec![PROBE, START, PROBE, PROBE, PROBE, STOP]
        );
    }

    #[test]
    fn test_exhausted_retries() {
        let runner = ScriptedRunner::new()
            .push_err("not running")
            .push_ok("")
            .push_err("down")
            .push_err("down")
            .push_err("still down");
        let runs = Cell::new(0);

        let err = gate(&runner)
            .with_up(|_| {
                runs.set(runs.get() + 1);
                Ok(())
            })
            .unwrap_err();

        assert_eq!(runs.get(), 0);
        match err.downcast_ref::<OtoolsError>() {
            Some(OtoolsError::ResourceUnavailable {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(*attempts, 4);
                assert!(last_error.contains("still down"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(runner.calls(), vec![PROBE, START, PROBE, PROBE, PROBE]);
    }

    #[test]
    fn test_guard_reports_state() {
        let runner = ScriptedRunner::new().push_ok("0.0.0.0:15432");
        let container = gate(&runner);
        let guard = container.ensure_up().unwrap();
        assert!(guard.was_already_running());
        assert_eq!(guard.port(), 15432);
    }

    #[test]
    fn test_get_port() {
        let runner = ScriptedRunner::new().push_ok("127.0.0.1:5434");
        assert_eq!(gate(&runner).get_port().unwrap(), 5434);
    }

    #[test]
    fn test_parse_published_port() {
        assert_eq!(parse_published_port("0.0.0.0:5432\n", "db").unwrap(), 5432);
        assert_eq!(parse_published_port("[::]:5433", "db").unwrap(), 5433);

        for bad in ["", "5432", ":5432", "localhost:abc", "\n\n"] {
            let err = parse_published_port(bad, "db").unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<OtoolsError>(),
                    Some(OtoolsError::ParseError { .. })
                ),
                "{bad:?} should not parse"
            );
        }
    }
}

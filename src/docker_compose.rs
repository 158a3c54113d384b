//! Builders for `docker compose` invocations

use crate::process::ExternalCommand;

fn compose() -> ExternalCommand {
    ExternalCommand::new("docker").arg("compose")
}

/// `docker compose port <service> <port>`: prints the published `<host>:<port>`
pub fn port(service: &str, internal_port: u16) -> ExternalCommand {
    compose()
        .args(["port", service])
        .arg(internal_port.to_string())
}

/// `docker compose up -d <service>`
pub fn up_detached(service: &str) -> ExternalCommand {
    compose().args(["up", "-d", service])
}

pub fn stop(service: &str) -> ExternalCommand {
    compose().args(["stop", service])
}

/// Options for a one-off `docker compose run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions<'a> {
    pub rm: bool,
    /// Disable pseudo-tty allocation, required when stdin is redirected
    pub no_tty: bool,
    pub user: Option<&'a str>,
    pub name: Option<&'a str>,
    pub override_file: Option<&'a str>,
}

/// `docker compose [-f override] run [--rm] [-T] [-u user] [--name name] <service> <command...>`
pub fn run(service: &str, command: &[&str], opts: &RunOptions<'_>) -> ExternalCommand {
    let mut cmd = compose();
    if let Some(file) = opts.override_file {
        cmd = cmd.args(["-f", file]);
    }
    cmd = cmd.arg("run");
    if opts.rm {
        cmd = cmd.arg("--rm");
    }
    if opts.no_tty {
        cmd = cmd.arg("-T");
    }
    if let Some(user) = opts.user {
        cmd = cmd.args(["-u", user]);
    }
    if let Some(name) = opts.name {
        cmd = cmd.args(["--name", name]);
    }
    cmd.arg(service).args(command.iter().copied())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_commands() {
        assert_eq!(port("db", 5432).to_string(), "docker compose port db 5432");
        assert_eq!(up_detached("db").to_string(), "docker compose up -d db");
        assert_eq!(stop("db").to_string(), "docker compose stop db");
    }

    #[test]
    fn test_run_with_options() {
        let opts = RunOptions {
            rm: true,
            no_tty: false,
            user: Some("odoo"),
            name: Some("shell"),
            override_file: Some("docker-compose.override.yml"),
        };
        assert_eq!(
            run("odoo", &["createdb", "-O", "odoo", "x"], &opts).to_string(),
            "docker compose -f docker-compose.override.yml run --rm -u odoo --name shell odoo createdb -O odoo x"
        );
        assert_eq!(
            run("odoo", &["odoo", "shell"], &RunOptions::default()).to_string(),
            "docker compose run odoo odoo shell"
        );

        let opts = RunOptions {
            rm: true,
            no_tty: true,
            ..Default::default()
        };
        assert_eq!(
            run("odoo", &["pg_restore", "-O", "-d", "x"], &opts).to_string(),
            "docker compose run --rm -T odoo pg_restore -O -d x"
        );
    }
}

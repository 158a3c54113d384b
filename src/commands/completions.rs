use crate::Cli;
use anyhow::{anyhow, Result};
use clap::CommandFactory;
use clap_complete::{
    generate,
    shells::{Bash, Fish, Zsh},
};
use std::io;

pub fn run(shell: String) -> Result<()> {
    let mut cmd = Cli::command();
    match shell.as_str() {
        "bash" => generate(Bash, &mut cmd, "otools", &mut io::stdout()),
        "zsh" => generate(Zsh, &mut cmd, "otools", &mut io::stdout()),
        "fish" => generate(Fish, &mut cmd, "otools", &mut io::stdout()),
        other => {
            return Err(anyhow!(
                "unsupported shell '{}', choose: bash, zsh, fish",
                other
            ))
        }
    }
    Ok(())
}

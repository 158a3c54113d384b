use crate::{
    constants::ADMIN_SONG_FILE,
    process::CommandRunner,
    project::Project,
    secrets::{
        admin_entries, change_admin_pwd, encrypt_password, format_lastpass_entry, gen_password,
        LastPass, DEFAULT_PASSWORD_LEN,
    },
    ui,
};
use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum SecretsCommands {
    /// Generate an admin password and write its hash in the install song
    GenAdminPwd,
    /// Same as gen-admin-pwd, then store the password in LastPass
    SendAdminPwd,
}

impl SecretsCommands {
    pub fn action(&self) -> &'static str {
        match self {
            SecretsCommands::GenAdminPwd => "generate admin password",
            SecretsCommands::SendAdminPwd => "send admin password",
        }
    }
}

/// Generate, hash and install a new admin password; returns it in clear
fn rotate_admin_pwd(project: &Project) -> Result<String> {
    let pwd = gen_password(DEFAULT_PASSWORD_LEN);
    println!("\nAdmin password:\n{pwd}\n");
    let hash = encrypt_password(&pwd);
    println!("Encrypted admin password :\n{hash}\n");
    if !change_admin_pwd(&project.build_path(ADMIN_SONG_FILE), &hash)? {
        tracing::warn!(file = ADMIN_SONG_FILE, "no admin password placeholder found");
    }
    Ok(pwd)
}

fn send_to_lastpass(project: &Project, runner: &dyn CommandRunner, pwd: &str) -> Result<()> {
    let manifest = project.manifest()?;
    let project_name = manifest.project_name()?;
    let shortname = match &manifest.customer_shortname {
        Some(name) if !name.is_empty() => name.clone(),
        _ => ui::ask_question("Customer short name", None)?,
    };
    let country = manifest.require("country", &manifest.country)?;
    let lastpass = LastPass::new(runner);

    for entry in admin_entries(&shortname, country, chrono::Local::now().date_naive()) {
        for line in format_lastpass_entry(project_name, &entry, pwd, true).lines() {
            println!("   {line}");
        }
        if let Err(err) = lastpass.put_lp_pwd(project_name, &entry, pwd) {
            println!(
                "\n   ** ERROR during the storing in LastPass, please create the entry manually. **\n{err:#}"
            );
            return Ok(());
        }
        println!("\n   ** This entry has been automatically created in LastPass for you. **");
        println!("\n  -------------------------------\n");
    }
    Ok(())
}

pub async fn run(cmd: SecretsCommands, project: &Project, runner: &dyn CommandRunner) -> Result<()> {
    match cmd {
        SecretsCommands::GenAdminPwd => {
            rotate_admin_pwd(project)?;
        }
        SecretsCommands::SendAdminPwd => {
            let pwd = rotate_admin_pwd(project)?;
            send_to_lastpass(project, runner, &pwd)?;
        }
    }
    Ok(())
}

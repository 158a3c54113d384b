//! Admin password rotation
//!
//! A fresh password is generated, its passlib-compatible `pbkdf2_sha512` hash
//! is written into the install song, and the clear password is stored in
//! LastPass through the `lpass` CLI.

use crate::{
    constants::ADMIN_PASSWORD_PLACEHOLDER,
    error::OtoolsError,
    process::{has_executable, CommandRunner, ExternalCommand},
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rand::{seq::SliceRandom, RngCore};
use sha2::Sha512;
use std::{fs, path::Path};

pub const SHARED_FOLDER_PREFIX: &str = "Shared-C2C-Odoo-External/";
pub const DEFAULT_PASSWORD_LEN: usize = 40;
pub const PBKDF2_ROUNDS: u32 = 25_000;
const SALT_LEN: usize = 16;
const CHECKSUM_LEN: usize = 64;
const ASCII_LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

pub fn gen_password(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .filter_map(|_| ASCII_LETTERS.choose(&mut rng).map(|&b| b as char))
        .collect()
}

/// passlib's "adapted base64": no padding and `.` in place of `+`
fn ab64_encode(data: &[u8]) -> String {
    base64::encode_config(data, base64::STANDARD_NO_PAD).replace('+', ".")
}

fn ab64_decode(data: &str) -> Option<Vec<u8>> {
    base64::decode_config(data.replace('.', "+"), base64::STANDARD_NO_PAD).ok()
}

pub fn encrypt_password_with_salt(password: &str, salt: &[u8], rounds: u32) -> String {
    let mut checksum = [0u8; CHECKSUM_LEN];
    pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), salt, rounds, &mut checksum);
    format!(
        "$pbkdf2-sha512${rounds}${}${}",
        ab64_encode(salt),
        ab64_encode(&checksum)
    )
}

/// Hash `password` the way Odoo's passlib context stores `password_crypt`
pub fn encrypt_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    encrypt_password_with_salt(password, &salt, PBKDF2_ROUNDS)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let parts: Vec<&str> = hash.split('$').collect();
    let ["", "pbkdf2-sha512", rounds, salt, _checksum] = parts.as_slice() else {
        return false;
    };
    match (rounds.parse::<u32>(), ab64_decode(salt)) {
        (Ok(rounds), Some(salt)) => encrypt_password_with_salt(password, &salt, rounds) == hash,
        _ => false,
    }
}

/// Put `hash` in place of the placeholder in the install song.
///
/// Returns `false`, leaving the file untouched, when there is no placeholder.
pub fn change_admin_pwd(song_file: &Path, hash: &str) -> Result<bool> {
    if !song_file.is_file() {
        return Err(OtoolsError::NotFound(song_file.display().to_string()).into());
    }
    let content = fs::read_to_string(song_file)
        .with_context(|| format!("reading {}", song_file.display()))?;
    if !content.contains(ADMIN_PASSWORD_PLACEHOLDER) {
        return Ok(false);
    }
    fs::write(song_file, content.replace(ADMIN_PASSWORD_PLACEHOLDER, hash))
        .with_context(|| format!("writing {}", song_file.display()))?;
    Ok(true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastpassEntry {
    pub location: String,
    pub name: String,
    pub username: String,
    pub comment: String,
}

impl LastpassEntry {
    pub fn new(env: &str, shortname: &str, username: &str, location: &str, comment: &str) -> Self {
        LastpassEntry {
            location: location.to_string(),
            name: format!("[odoo-{env}] {shortname}"),
            username: username.to_string(),
            comment: comment.to_string(),
        }
    }
}

fn project_folder(project: &str) -> String {
    format!("{SHARED_FOLDER_PREFIX}{project}/")
}

/// Entry text in the exact layout `lpass add --non-interactive` reads
pub fn format_lastpass_entry(project: &str, entry: &LastpassEntry, password: &str, for_cli: bool) -> String {
    let folder = project_folder(project);
    let body = format!(
        "URL: {}\nUsername: {}\nPassword: {password}\nNotes:\n{}\n",
        entry.location, entry.username, entry.comment
    );
    if for_cli {
        format!("Name: {folder}{}\n{body}", entry.name)
    } else {
        format!("Folder: {folder}\nName: {}\n{body}", entry.name)
    }
}

/// Production and integration entries for a project's admin account
pub fn admin_entries(shortname: &str, country: &str, today: NaiveDate) -> Vec<LastpassEntry> {
    let comment = format!("Created automatically on {}", today.format("%d.%m.%Y"));
    [("prod", shortname.to_string()), ("integration", format!("integration.{shortname}"))]
        .iter()
        .map(|(env, host)| {
            let location = format!("https://{host}.odoo.camptocamp.{country}");
            LastpassEntry::new(env, shortname, "admin", &location, &comment)
        })
        .collect()
}

pub struct LastPass<'r> {
    runner: &'r dyn CommandRunner,
}

impl<'r> LastPass<'r> {
    pub fn new(runner: &'r dyn CommandRunner) -> Self {
        LastPass { runner }
    }

    pub fn add_command(project: &str, entry: &LastpassEntry, password: &str) -> ExternalCommand {
        ExternalCommand::new("lpass")
            .args(["add", "--non-interactive", "--sync=now"])
            .arg(format!("{}{}", project_folder(project), entry.name))
            .stdin_data(format_lastpass_entry(project, entry, password, true))
    }

    /// Store `password` in the project's shared folder
    pub fn put_lp_pwd(&self, project: &str, entry: &LastpassEntry, password: &str) -> Result<()> {
        if !has_executable("lpass") {
            return Err(OtoolsError::Aborted(
                "LastPass CLI is not available, please create the entry manually".into(),
            )
            .into());
        }
        self.put_with(project, entry, password)
    }

    fn put_with(&self, project: &str, entry: &LastpassEntry, password: &str) -> Result<()> {
        self.runner
            .run(&Self::add_command(project, entry, password))?;
        Ok(())
    }
}

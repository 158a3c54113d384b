//! File names and fixed values used across the toolkit

/// Marker file identifying the project root
pub const PROJECT_MANIFEST: &str = ".cookiecutter.context.yml";

/// Optional per-project tool configuration, next to the manifest
pub const OTOOLS_CONFIG: &str = ".otools.yaml";

/// Command recorded in the migration manifest to upgrade installed addons
pub const UPDATE_COMMAND: &str = "click-odoo-update";

/// Hook used when none is given
pub const DEFAULT_HOOK: &str = "post";

/// Port the database listens on inside its container
pub const DB_INTERNAL_PORT: u16 = 5432;

pub const DEFAULT_DB_NAME: &str = "odoodb";

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

pub const GITMODULES_FILE: &str = ".gitmodules";

pub const ADMIN_PASSWORD_PLACEHOLDER: &str = "__GENERATED_ADMIN_PASSWORD__";

pub const ADMIN_SONG_FILE: &str = "odoo/songs/install/pre.py";

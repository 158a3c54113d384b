//! Path helpers: project root discovery and `~` expansion

use crate::error::OtoolsError;
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Walk from `start` up through its parents until a directory containing `marker` is found
pub fn find_root(start: &Path, marker: &str) -> Result<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(marker).exists())
        .map(Path::to_path_buf)
        .ok_or_else(|| {
            OtoolsError::ProjectRootNotFound {
                marker: marker.to_string(),
                start: start.display().to_string(),
            }
            .into()
        })
}

/// Replace a leading `~` with the user's home directory
pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Create `dir` (and parents) unless it already exists as a directory
pub fn make_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).with_context(|| {
        format!(
            "Directory does not exist and could not be created: {}",
            dir.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_find_root_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".marker"), "").unwrap();
        let nested = dir.path().join("odoo/local-src/module");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_root(&nested, ".marker").unwrap(), dir.path());
        assert_eq!(find_root(dir.path(), ".marker").unwrap(), dir.path());
    }

    #[test]
    fn test_find_root_missing_marker() {
        let dir = TempDir::new().unwrap();
        let err = find_root(dir.path(), ".no-such-marker-anywhere").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OtoolsError>(),
            Some(OtoolsError::ProjectRootNotFound { .. })
        ));
    }

    #[test]
    fn test_expand_user() {
        assert_eq!(expand_user("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_user("relative/~"), PathBuf::from("relative/~"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_user("~/dumps"), home.join("dumps"));
            assert_eq!(expand_user("~"), home);
        }
    }

    #[test]
    fn test_make_dir_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b");
        make_dir(&target).unwrap();
        make_dir(&target).unwrap();
        assert!(target.is_dir());
    }
}

//! Error types shared across otools
//!
//! Most functions return `anyhow::Result` and attach context as they go. The
//! variants of [`OtoolsError`] are raised where a caller (or a test) needs to tell
//! failure kinds apart, e.g. `err.downcast_ref::<OtoolsError>()`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OtoolsError {
    /// An expected local file or directory is missing
    #[error("{0} not found")]
    NotFound(String),

    /// A persisted document does not have the expected top-level shape
    #[error("malformed document {path}: {reason}")]
    MalformedDocument { path: String, reason: String },

    /// An external service did not become reachable within the retry budget
    #[error("{resource} is not available after {attempts} attempts: {last_error}")]
    ResourceUnavailable {
        resource: String,
        attempts: usize,
        last_error: String,
    },

    /// Output of an external tool did not match the expected shape
    #[error("cannot parse output of `{source_cmd}`: {reason}")]
    ParseError { source_cmd: String, reason: String },

    #[error("command `{cmd}` failed ({status}): {stderr}")]
    CommandFailed {
        cmd: String,
        status: String,
        stderr: String,
    },

    #[error("could not find a '{marker}' file in {start} or any parent directories")]
    ProjectRootNotFound { marker: String, start: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Aborted(String),
}

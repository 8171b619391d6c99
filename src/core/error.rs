//! Error kinds for loading and converging a run list.
//!
//! Load errors are fatal and surface before anything executes. Probe and
//! execution errors are recovered inside the engine and end up in the
//! run report.

use std::path::PathBuf;
use thiserror::Error;

/// Failure while building a run list from recipes and roles.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("duplicate resource identifier '{identifier}' (first declared in {first}, again in {second})")]
    DuplicateIdentifier {
        identifier: String,
        first: String,
        second: String,
    },

    #[error("resource '{source_id}' notifies unknown resource '{target}'")]
    UnknownNotificationTarget { source_id: String, target: String },

    #[error("resource '{0}' notifies itself")]
    SelfNotification(String),

    #[error("recipe '{cookbook}::{recipe}' not found at {path}")]
    RecipeNotFound {
        cookbook: String,
        recipe: String,
        path: PathBuf,
    },

    #[error("role '{name}' not found at {path}")]
    RoleNotFound { name: String, path: PathBuf },

    #[error("role cycle detected: {0}")]
    RoleCycle(String),

    #[error("malformed run list item '{0}' (expected recipe[cookbook], recipe[cookbook::recipe] or role[name])")]
    MalformedRunListItem(String),

    #[error("resource '{identifier}': {message}")]
    Template { identifier: String, message: String },

    #[error("resource '{identifier}': cookbook file {path} does not exist")]
    MissingCookbookFile { identifier: String, path: PathBuf },

    #[error("resource '{identifier}': invalid guard: {message}")]
    InvalidGuard { identifier: String, message: String },

    #[error("invalid host name '{0}' (must be a single path component)")]
    InvalidHost(String),
}

/// A guard predicate could not be evaluated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("probe failed: {message}")]
pub struct ProbeError {
    pub message: String,
}

impl ProbeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A resource action failed on the host.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

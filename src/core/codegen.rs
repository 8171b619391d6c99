//! Script generation: dispatch to resource handlers and build probe scripts.

use super::attributes::Attributes;
use super::error::ExecutionError;
use super::types::{Predicate, ResourceKind};
use crate::resources::{self, shell_quote};

/// Generate the apply script for a resource kind.
pub fn apply_script(kind: ResourceKind, attrs: &Attributes) -> Result<String, ExecutionError> {
    let script = match kind {
        ResourceKind::Execute => resources::execute::apply_script(attrs),
        ResourceKind::Package => resources::package::apply_script(attrs),
        ResourceKind::CookbookFile => resources::file::apply_script(attrs),
    };
    script.map_err(ExecutionError::new)
}

/// Generate the script answering a guard predicate.
///
/// Exit 0 means the predicate holds and exit 1 means it does not. For
/// `command_succeeds` the command's own status is the answer. A missing
/// file contains nothing; an unreadable one exits 2 from grep.
pub fn probe_script(predicate: &Predicate) -> String {
    match predicate {
        Predicate::FileExists(path) => format!("test -e {}", shell_quote(path)),
        Predicate::CommandSucceeds(command) => command.clone(),
        Predicate::FileContains { path, needle } => format!(
            "test -e {path} || exit 1\ngrep -qF -- {} {path}",
            shell_quote(needle),
            path = shell_quote(path)
        ),
    }
}

//! Execute resource handler: run a shell command.

use super::{heredoc_delimiter, required, shell_quote};
use crate::core::attributes::Attributes;

/// Generate shell to run `command`.
///
/// The command body travels in a quoted heredoc so it reaches the inner
/// bash verbatim. `cwd` and `environment.*` apply inside that shell, and
/// `user`/`group` switch identity through non-interactive sudo.
pub fn apply_script(attrs: &Attributes) -> Result<String, String> {
    let command = required(attrs, "command", "execute")?;

    let mut body = Vec::new();
    if let Some(cwd) = attrs.get("cwd").filter(|c| !c.is_empty()) {
        body.push(format!("cd {} || exit 1", shell_quote(cwd)));
    }
    for (key, value) in attrs.with_prefix("environment") {
        body.push(format!("export {}={}", env_name(key)?, shell_quote(value)));
    }
    body.push(command.to_string());
    let body = body.join("\n");

    let mut runner = String::new();
    let user = attrs.get("user").filter(|u| !u.is_empty());
    let group = attrs.get("group").filter(|g| !g.is_empty());
    if user.is_some() || group.is_some() {
        runner.push_str("sudo -n");
        if let Some(u) = user {
            runner.push_str(&format!(" -u {}", shell_quote(u)));
        }
        if let Some(g) = group {
            runner.push_str(&format!(" -g {}", shell_quote(g)));
        }
        runner.push_str(" -- ");
    }
    runner.push_str("bash");

    let delim = heredoc_delimiter(&body);
    Ok(format!(
        "set -uo pipefail\n{} <<'{}'\n{}\n{}",
        runner, delim, body, delim
    ))
}

/// Environment keys become shell identifiers, so only `[A-Za-z_][A-Za-z0-9_]*`.
fn env_name(key: &str) -> Result<&str, String> {
    let mut chars = key.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(key)
    } else {
        Err(format!("invalid environment variable name: {}", key))
    }
}

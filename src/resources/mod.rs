//! Resource handlers: generate bash for each resource kind.
//!
//! Every handler produces an apply script from resolved attributes. Values
//! are interpolated single-quoted, so attribute content never reaches the
//! shell as syntax.

pub mod execute;
pub mod file;
pub mod package;

use crate::core::attributes::Attributes;

/// Quote a value for bash: `'...'` with embedded quotes as `'\''`.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Look up an attribute the handler cannot work without.
pub(crate) fn required<'a>(attrs: &'a Attributes, key: &str, kind: &str) -> Result<&'a str, String> {
    attrs
        .get(key)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| format!("{} requires '{}'", kind, key))
}

/// Heredoc delimiter that does not occur as a line of `body`.
pub(crate) fn heredoc_delimiter(body: &str) -> String {
    let mut delim = "TEND_EOF".to_string();
    let mut n = 0;
    while body.lines().any(|line| line == delim) {
        n += 1;
        delim = format!("TEND_EOF_{}", n);
    }
    delim
}

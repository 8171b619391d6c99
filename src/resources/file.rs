//! Cookbook file resource handler.

use super::{required, shell_quote};
use crate::core::attributes::Attributes;

/// Generate shell to deploy `source_path` to `path`.
///
/// The copy only happens when content differs. Ownership and mode are
/// applied on every run so drifted permissions are corrected.
pub fn apply_script(attrs: &Attributes) -> Result<String, String> {
    let path = required(attrs, "path", "cookbook_file")?;
    let source = required(attrs, "source_path", "cookbook_file")?;
    let dest = shell_quote(path);
    let src = shell_quote(source);

    let mut lines = vec![
        "set -euo pipefail".to_string(),
        format!("if ! cmp -s {} {}; then", src, dest),
        format!("  mkdir -p \"$(dirname {})\"", dest),
        format!("  cp {} {}", src, dest),
        "fi".to_string(),
    ];

    let owner = attrs.get("owner").filter(|o| !o.is_empty());
    let group = attrs.get("group").filter(|g| !g.is_empty());
    match (owner, group) {
        (Some(o), Some(g)) => lines.push(format!("chown {} {}", shell_quote(&format!("{}:{}", o, g)), dest)),
        (Some(o), None) => lines.push(format!("chown {} {}", shell_quote(o), dest)),
        (None, Some(g)) => lines.push(format!("chgrp {} {}", shell_quote(g), dest)),
        (None, None) => {}
    }
    if let Some(mode) = attrs.get("mode").filter(|m| !m.is_empty()) {
        lines.push(format!("chmod {} {}", shell_quote(mode), dest));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::exec_local;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_cookbook_file() {
        let script = apply_script(&attrs(&[
            ("path", "/tmp/virtualenv"),
            ("source_path", "/repo/cookbooks/python/files/virtualenv"),
            ("owner", "vagrant"),
            ("group", "vagrant"),
            ("mode", "0755"),
        ]))
        .unwrap();
        assert!(script.contains(
            "if ! cmp -s '/repo/cookbooks/python/files/virtualenv' '/tmp/virtualenv'; then"
        ));
        assert!(script.contains("cp '/repo/cookbooks/python/files/virtualenv' '/tmp/virtualenv'"));
        assert!(script.contains("chown 'vagrant:vagrant' '/tmp/virtualenv'"));
        assert!(script.contains("chmod '0755' '/tmp/virtualenv'"));
    }

    #[test]
    fn test_apply_group_only() {
        let script = apply_script(&attrs(&[
            ("path", "/etc/profile.d/venv.sh"),
            ("source_path", "/repo/files/venv.sh"),
            ("group", "staff"),
        ]))
        .unwrap();
        assert!(script.contains("chgrp 'staff' '/etc/profile.d/venv.sh'"));
        assert!(!script.contains("chown"));
    }

    #[test]
    fn test_apply_requires_source_path() {
        let err = apply_script(&attrs(&[("path", "/tmp/x")])).unwrap_err();
        assert!(err.contains("source_path"));
    }

    #[test]
    fn test_generated_script_copies_once() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("SOAPpy.patch");
        let dest = dir.path().join("build/SOAPpy/SOAPpy.patch");
        std::fs::write(&src, "--- a/Client.py\n+++ b/Client.py\n").unwrap();
        let (dest_str, src_str) = (
            dest.to_string_lossy().to_string(),
            src.to_string_lossy().to_string(),
        );
        let script = apply_script(&attrs(&[
            ("path", dest_str.as_str()),
            ("source_path", src_str.as_str()),
            ("mode", "0640"),
        ]))
        .unwrap();

        let out = exec_local(&script).unwrap();
        assert!(out.success(), "stderr: {}", out.stderr);
        assert_eq!(
            std::fs::read_to_string(&dest).unwrap(),
            "--- a/Client.py\n+++ b/Client.py\n"
        );

        let out = exec_local(&script).unwrap();
        assert!(out.success());
    }
}

//! Package resource handler (apt).

use super::{required, shell_quote};
use crate::core::attributes::Attributes;

/// Generate shell to install `package_name`, optionally pinned to `version`.
///
/// Installed packages are left alone. The script ends with a postcondition
/// check so a silently failed install still exits non-zero.
pub fn apply_script(attrs: &Attributes) -> Result<String, String> {
    let name = required(attrs, "package_name", "package")?;
    let pkg = shell_quote(name);

    let (installed, target) = match attrs.get("version").filter(|v| !v.is_empty()) {
        Some(version) => (
            format!(
                "[ \"$(dpkg-query -W -f='${{Version}}' {} 2>/dev/null)\" = {} ]",
                pkg,
                shell_quote(version)
            ),
            shell_quote(&format!("{}={}", name, version)),
        ),
        None => (format!("dpkg -s {} >/dev/null 2>&1", pkg), pkg.clone()),
    };

    Ok(format!(
        "set -euo pipefail\n\
         if ! {installed}; then\n\
         \x20 DEBIAN_FRONTEND=noninteractive apt-get install -y -qq {target}\n\
         fi\n\
         {installed}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_apply_package() {
        let script = apply_script(&attrs(&[("package_name", "python-dev")])).unwrap();
        assert!(script.starts_with("set -euo pipefail"));
        assert!(script.contains("if ! dpkg -s 'python-dev' >/dev/null 2>&1; then"));
        assert!(script.contains("apt-get install -y -qq 'python-dev'"));
        assert!(script.ends_with("dpkg -s 'python-dev' >/dev/null 2>&1"));
    }

    #[test]
    fn test_apply_package_pinned() {
        let script = apply_script(&attrs(&[
            ("package_name", "libxml2-dev"),
            ("version", "2.9.14"),
        ]))
        .unwrap();
        assert!(script.contains("apt-get install -y -qq 'libxml2-dev=2.9.14'"));
        assert!(script.contains("dpkg-query -W -f='${Version}' 'libxml2-dev'"));
        assert!(script.contains("= '2.9.14' ]"));
    }

    #[test]
    fn test_apply_package_missing_name() {
        let err = apply_script(&Attributes::default()).unwrap_err();
        assert!(err.contains("package_name"));
    }

    #[test]
    fn test_package_name_is_quoted() {
        let script = apply_script(&attrs(&[("package_name", "x'; reboot; '")])).unwrap();
        assert!(script.contains("'x'\\''; reboot; '\\'''"));
    }
}

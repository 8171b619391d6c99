//! Node config parsing and run-list validation.
//!
//! Validates structural constraints on resolved resources:
//! - Identifiers are unique
//! - Notification targets exist and are not the notifier itself
//! - Guard predicates have non-empty fields

use super::error::LoadError;
use super::types::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Parse a `tend.yaml` file from disk.
pub fn parse_node_config_file(path: &Path) -> Result<NodeConfig, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_node_config(&content).map_err(|message| LoadError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse a `tend.yaml` from a string.
pub fn parse_node_config(yaml: &str) -> Result<NodeConfig, String> {
    let config: NodeConfig =
        serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))?;
    validate_host(&config.host).map_err(|e| e.to_string())?;
    Ok(config)
}

/// A host name names a directory under the state dir, so it must be a
/// single, ordinary path component.
pub fn validate_host(host: &str) -> Result<(), LoadError> {
    let invalid = host.is_empty()
        || host == "."
        || host == ".."
        || host.contains(['/', '\\', '\0']);
    if invalid {
        return Err(LoadError::InvalidHost(host.to_string()));
    }
    Ok(())
}

/// Validate a resolved resource sequence. Returns every violation found
/// (empty = valid), in run-list order.
pub fn validate(resources: &[Resource]) -> Vec<LoadError> {
    let mut errors = Vec::new();
    let mut first_seen: HashMap<&str, &str> = HashMap::new();

    for r in resources {
        match first_seen.get(r.identifier.as_str()) {
            Some(first) => errors.push(LoadError::DuplicateIdentifier {
                identifier: r.identifier.clone(),
                first: first.to_string(),
                second: r.origin.clone(),
            }),
            None => {
                first_seen.insert(&r.identifier, &r.origin);
            }
        }
    }

    for r in resources {
        for n in &r.notifies {
            if n.target == r.identifier {
                errors.push(LoadError::SelfNotification(r.identifier.clone()));
            } else if !first_seen.contains_key(n.target.as_str()) {
                errors.push(LoadError::UnknownNotificationTarget {
                    source_id: r.identifier.clone(),
                    target: n.target.clone(),
                });
            }
        }

        if let Some(ref guard) = r.guard {
            if let Some(message) = guard_problem(guard.predicate()) {
                errors.push(LoadError::InvalidGuard {
                    identifier: r.identifier.clone(),
                    message,
                });
            }
        }
    }

    errors
}

fn guard_problem(predicate: &Predicate) -> Option<String> {
    match predicate {
        Predicate::FileExists(path) if path.trim().is_empty() => {
            Some("file_exists needs a path".to_string())
        }
        Predicate::CommandSucceeds(cmd) if cmd.trim().is_empty() => {
            Some("command_succeeds needs a command".to_string())
        }
        Predicate::FileContains { path, .. } if path.trim().is_empty() => {
            Some("file_contains needs a path".to_string())
        }
        Predicate::FileContains { needle, .. } if needle.is_empty() => {
            Some("file_contains needs a needle".to_string())
        }
        _ => None,
    }
}

/// Deferred resources that nothing notifies. They can never run.
pub fn unnotified_deferred(resources: &[Resource]) -> Vec<&str> {
    let targets: HashSet<&str> = resources
        .iter()
        .flat_map(|r| r.notifies.iter().map(|n| n.target.as_str()))
        .collect();
    resources
        .iter()
        .filter(|r| r.action == Action::Deferred && !targets.contains(r.identifier.as_str()))
        .map(|r| r.identifier.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(id: &str) -> Resource {
        Resource::new(ResourceKind::Package, id)
    }

    #[test]
    fn test_valid_run_list() {
        let resources = vec![
            pkg("a").notifying("b", Timing::Immediate),
            pkg("b").deferred(),
        ];
        let errors = validate(&resources);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn test_duplicate_identifier() {
        let mut first = Resource::new(ResourceKind::Execute, "install-soappy");
        first.origin = "python::soappy".to_string();
        let mut second = first.clone();
        second.origin = "python::extras".to_string();
        let errors = validate(&[first, second]);
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            LoadError::DuplicateIdentifier {
                identifier,
                first,
                second,
            } => {
                assert_eq!(identifier, "install-soappy");
                assert_eq!(first, "python::soappy");
                assert_eq!(second, "python::extras");
            }
            other => panic!("expected DuplicateIdentifier, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_notification_target() {
        let errors = validate(&[pkg("a").notifying("ghost", Timing::Delayed)]);
        assert!(matches!(
            errors[0],
            LoadError::UnknownNotificationTarget { .. }
        ));
    }

    #[test]
    fn test_self_notification() {
        let errors = validate(&[pkg("a").notifying("a", Timing::Immediate)]);
        assert!(matches!(errors[0], LoadError::SelfNotification(_)));
    }

    #[test]
    fn test_notification_target_declared_later_is_valid() {
        let resources = vec![pkg("a").notifying("z", Timing::Delayed), pkg("z")];
        assert!(validate(&resources).is_empty());
    }

    #[test]
    fn test_empty_guard_fields() {
        let resources = vec![
            pkg("a").with_guard(Guard::NotIf(Predicate::CommandSucceeds("  ".to_string()))),
            pkg("b").with_guard(Guard::OnlyIf(Predicate::FileContains {
                path: "/etc/profile".to_string(),
                needle: String::new(),
            })),
            pkg("c").with_guard(Guard::OnlyIf(Predicate::FileExists("/bin/sh".to_string()))),
        ];
        let errors = validate(&resources);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, LoadError::InvalidGuard { .. })));
    }

    #[test]
    fn test_collects_all_errors() {
        let resources = vec![
            pkg("a").notifying("x", Timing::Delayed),
            pkg("a").notifying("y", Timing::Immediate),
        ];
        assert_eq!(validate(&resources).len(), 3);
    }

    #[test]
    fn test_unnotified_deferred() {
        let resources = vec![
            pkg("a").notifying("b", Timing::Delayed),
            pkg("b").deferred(),
            pkg("c").deferred(),
        ];
        assert_eq!(unnotified_deferred(&resources), vec!["c"]);
    }

    #[test]
    fn test_parse_node_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tend.yaml");
        std::fs::write(
            &path,
            r#"
host: archiver-01
run_list:
  - role[archiver]
policy:
  failure: stop_on_first
  journal: false
"#,
        )
        .unwrap();
        let config = parse_node_config_file(&path).unwrap();
        assert_eq!(config.host, "archiver-01");
        assert_eq!(config.run_list, vec!["role[archiver]"]);
        assert_eq!(config.policy.failure, FailurePolicy::StopOnFirst);
        assert!(!config.policy.journal);
        assert!(config.policy.save_report);
    }

    #[test]
    fn test_validate_host() {
        assert!(validate_host("archiver-01").is_ok());
        assert!(validate_host("web.example.com").is_ok());
        for bad in ["", ".", "..", "../x", "/etc", "a/b", "a\\b"] {
            assert!(
                matches!(validate_host(bad), Err(LoadError::InvalidHost(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_node_config_rejects_escaping_host() {
        let err = parse_node_config("host: ../outside\nrun_list: ['recipe[x]']").unwrap_err();
        assert!(err.contains("invalid host name '../outside'"), "{}", err);
        assert!(parse_node_config("host: /tmp/abs").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tend.yaml");
        std::fs::write(&path, "host: ..\n").unwrap();
        let err = parse_node_config_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
    }

    #[test]
    fn test_parse_node_config_invalid() {
        assert!(parse_node_config("run_list: {{").is_err());
        let dir = tempfile::tempdir().unwrap();
        let err = parse_node_config_file(&dir.path().join("missing.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}

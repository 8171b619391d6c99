//! BLAKE3 digests. Returned as `"blake3:{hex}"`.

use crate::core::runlist::RunList;

/// Hash a string.
pub fn hash_string(s: &str) -> String {
    format!("blake3:{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Digest of everything that determines what a converge does: each
/// resource's kind, identifier, action, guard, resolved attributes and
/// notifications, in run-list order.
///
/// Two runs with the same digest applied the same run list.
pub fn run_list_digest(list: &RunList) -> String {
    let mut hasher = blake3::Hasher::new();
    for r in list.resources() {
        field(&mut hasher, &r.kind.to_string());
        field(&mut hasher, &r.identifier);
        field(&mut hasher, &r.action.to_string());
        if let Some(ref guard) = r.guard {
            field(&mut hasher, &guard.to_string());
        }
        for (key, value) in r.attributes.iter() {
            field(&mut hasher, key);
            field(&mut hasher, value);
        }
        for n in &r.notifies {
            field(&mut hasher, &format!("{}->{}", n.timing, n.target));
        }
        hasher.update(b"\x1e");
    }
    format!("blake3:{}", hasher.finalize().to_hex())
}

// Length-prefixed so adjacent fields cannot run together.
fn field(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Resource, ResourceKind, Timing};

    fn list(resources: Vec<Resource>) -> RunList {
        RunList::build(resources).unwrap()
    }

    #[test]
    fn test_hash_string() {
        let h = hash_string("hello");
        assert!(h.starts_with("blake3:"));
        assert_eq!(h.len(), 7 + 64);
        assert_eq!(h, hash_string("hello"));
        assert_ne!(h, hash_string("hello!"));
    }

    #[test]
    fn test_digest_stable() {
        let make = || {
            list(vec![
                Resource::new(ResourceKind::Package, "curl").with_attribute("package_name", "curl"),
                Resource::new(ResourceKind::Execute, "reload").deferred(),
            ])
        };
        assert_eq!(run_list_digest(&make()), run_list_digest(&make()));
    }

    #[test]
    fn test_digest_sensitive_to_order_and_content() {
        let a = Resource::new(ResourceKind::Package, "curl");
        let b = Resource::new(ResourceKind::Package, "git");
        let base = run_list_digest(&list(vec![a.clone(), b.clone()]));
        assert_ne!(base, run_list_digest(&list(vec![b.clone(), a.clone()])));
        assert_ne!(
            base,
            run_list_digest(&list(vec![a.with_attribute("version", "8.0"), b.clone()]))
        );
        assert_ne!(
            base,
            run_list_digest(&list(vec![
                Resource::new(ResourceKind::Package, "curl").notifying("git", Timing::Delayed),
                b
            ]))
        );
    }

    #[test]
    fn test_digest_field_boundaries() {
        let ab = list(vec![Resource::new(ResourceKind::Execute, "ab").with_attribute("c", "d")]);
        let a = list(vec![Resource::new(ResourceKind::Execute, "a").with_attribute("bc", "d")]);
        assert_ne!(run_list_digest(&ab), run_list_digest(&a));
    }
}
